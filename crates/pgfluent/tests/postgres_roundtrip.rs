use chrono::{DateTime, FixedOffset, TimeZone};
use pgfluent::{
    As, Assoc, BindMap, ConflictUpdate, ConnectConfig, Db, FromRow, OrmError, OrmResult,
    PgConnection, Row, Tuple, Value, named_params, params,
};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, PartialEq)]
struct Event {
    id: i64,
    name: String,
    at: DateTime<FixedOffset>,
}

impl FromRow for Event {
    fn from_row(row: &Row) -> OrmResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            at: row.try_get("at")?,
        })
    }
}

async fn connect(test: &str) -> OrmResult<Option<(Db<PgConnection>, String)>> {
    let config = match ConnectConfig::from_env() {
        Ok(config) => config,
        Err(_) => {
            eprintln!("DATABASE_URL is not set; skipping {test}");
            return Ok(None);
        }
    };
    let db = Db::connect_with(&config.application_name("pgfluent-tests")).await?;
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before UNIX_EPOCH")
        .as_nanos();
    let table = format!("pgfluent_{test}_{}_{nanos}", std::process::id());
    db.prepare_query(format!(
        "create temp table {table} (id bigint primary key, name text not null, at timestamptz)"
    ))
    .await?
    .execute()
    .await?;
    Ok(Some((db, table)))
}

#[tokio::test]
async fn insert_upsert_and_fetch() -> OrmResult<()> {
    let Some((db, table)) = connect("upsert").await? else {
        return Ok(());
    };
    let at = FixedOffset::east_opt(2 * 3600)
        .expect("valid offset")
        .with_ymd_and_hms(2024, 5, 17, 9, 30, 0)
        .single()
        .expect("unambiguous timestamp");

    db.insert_into(table.as_str(), ["id", "name", "at"])?
        .append([
            ("id", Value::Int(1)),
            ("name", Value::from("it's one")),
            ("at", Value::Timestamp(at)),
        ])?
        .append([("id", Value::Int(2)), ("name", Value::from("two"))])?
        .execute()
        .await?;

    let renamed = db
        .insert_into(table.as_str(), ["id", "name"])?
        .bind_values()
        .append([("id", Value::Int(2)), ("name", Value::from("deux"))])?
        .on_conflict(["id"], ConflictUpdate::AllExcept)?
        .returning(["name"])
        .await?
        .map_to::<Tuple>()
        .fetch_column::<String>(0)
        .await?;
    assert_eq!(renamed, ["deux"]);

    let event = db
        .prepare_query(format!("select id, name, at from {table} where id = :id"))
        .await?
        .with_params(named_params! { "id" => 1 })?
        .map_to::<As<Event>>()
        .single()
        .await?;
    assert_eq!(event.name, "it's one");
    assert_eq!(event.at, at);

    let rows = db
        .prepare_query(format!("select * from {table} where at is null and id > ?"))
        .await?
        .with_params(params![0])?
        .map_to::<Assoc>()
        .fetch_all()
        .await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&Value::from("deux")));
    Ok(())
}

#[tokio::test]
async fn temporal_parameters_bind_as_iso_text() -> OrmResult<()> {
    let Some((db, table)) = connect("temporal").await? else {
        return Ok(());
    };
    let at = FixedOffset::west_opt(5 * 3600)
        .expect("valid offset")
        .with_ymd_and_hms(2023, 12, 31, 23, 59, 59)
        .single()
        .expect("unambiguous timestamp");

    db.prepare_query(format!("insert into {table} (id, name, at) values (?, ?, ?)"))
        .await?
        .with_params(params![7, "late", Value::Timestamp(at)])?
        .execute()
        .await?;

    let mut stored: Option<DateTime<FixedOffset>> = None;
    let mut name = String::new();
    db.prepare_query(format!("select name, at from {table} where at = ?"))
        .await?
        .with_params(params![Value::Timestamp(at)])?
        .bind_fields(
            BindMap::by_name()
                .slot("name", &mut name)?
                .slot("at", &mut stored)?,
        )?
        .single()
        .await?;
    assert_eq!(name, "late");
    assert_eq!(stored, Some(at));
    Ok(())
}

#[tokio::test]
async fn abandoned_transaction_is_rolled_back() -> OrmResult<()> {
    let Some((mut db, table)) = connect("rollback").await? else {
        return Ok(());
    };

    {
        let tx = db.begin_transaction().await?;
        tx.prepare_query(format!("insert into {table} (id, name) values (1, 'ghost')"))
            .await?
            .execute()
            .await?;
    }
    assert!(db.connection().rollback_pending());

    let found = db
        .prepare_query(format!("select 1 from {table}"))
        .await?
        .exists()
        .await?;
    assert!(!found);
    assert!(!db.connection().rollback_pending());

    let mut tx = db.begin_transaction().await?;
    tx.prepare_query(format!("insert into {table} (id, name) values (2, 'kept')"))
        .await?
        .execute()
        .await?;
    tx.commit().await?;
    drop(tx);

    let names: Vec<String> = db
        .prepare_query(format!("select name from {table}"))
        .await?
        .map_to::<Tuple>()
        .fetch_column(0)
        .await?;
    assert_eq!(names, ["kept"]);
    Ok(())
}

#[tokio::test]
async fn raw_client_runs_after_the_deferred_rollback() -> OrmResult<()> {
    let Some((mut db, table)) = connect("raw_client").await? else {
        return Ok(());
    };

    {
        let tx = db.begin_transaction().await?;
        tx.prepare_query(format!("insert into {table} (id, name) values (1, 'ghost')"))
            .await?
            .execute()
            .await?;
    }
    assert!(db.connection().rollback_pending());

    let client = db.connection().client().await?;
    let row = client
        .query_one(
            &format!("select count(*) as n, now() = statement_timestamp() as fresh from {table}"),
            &[],
        )
        .await
        .map_err(|e| OrmError::execution("query_one", e))?;
    assert_eq!(row.get::<_, i64>("n"), 0);
    assert!(row.get::<_, bool>("fresh"));
    assert!(!db.connection().rollback_pending());
    Ok(())
}
