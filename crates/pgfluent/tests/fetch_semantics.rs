use futures_util::TryStreamExt;
use pgfluent::memory::{Event, MemoryConnection, ResultSet};
use pgfluent::{
    As, Assoc, BindMap, Db, FetchMode, FromRow, Object, OrmResult, Row, RowCount, Tuple, Value,
    named_params, params,
};

fn orders() -> ResultSet {
    ResultSet::new(["id", "status"])
        .row([Value::Int(1), Value::from("open")])
        .row([Value::Int(2), Value::from("paid")])
}

#[derive(Debug, PartialEq)]
struct Order {
    id: i64,
    status: String,
}

impl FromRow for Order {
    fn from_row(row: &Row) -> OrmResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            status: row.try_get("status")?,
        })
    }
}

#[tokio::test]
async fn fetch_all_in_every_shape() -> OrmResult<()> {
    let conn = MemoryConnection::new();
    for _ in 0..4 {
        conn.push_result(orders());
    }
    let db = Db::new(conn.clone());

    let rows = db
        .prepare_query("select id, status from orders")
        .await?
        .map_to::<Assoc>()
        .fetch_all()
        .await?;
    assert_eq!(rows[1].get("status"), Some(&Value::from("paid")));

    let tuples = db
        .prepare_query("select id, status from orders")
        .await?
        .map_to::<Tuple>()
        .fetch_all()
        .await?;
    assert_eq!(tuples[0], [Value::Int(1), Value::from("open")]);

    let objects = db
        .prepare_query("select id, status from orders")
        .await?
        .map_to::<Object>()
        .fetch_all()
        .await?;
    assert_eq!(objects[0]["id"], serde_json::json!(1));
    assert_eq!(objects[1]["status"], serde_json::json!("paid"));

    let typed = db
        .prepare_query("select id, status from orders")
        .await?
        .map_to::<As<Order>>()
        .fetch_all()
        .await?;
    assert_eq!(
        typed,
        [
            Order {
                id: 1,
                status: "open".into()
            },
            Order {
                id: 2,
                status: "paid".into()
            }
        ]
    );

    let modes: Vec<FetchMode> = conn
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::FetchMode(mode) => Some(mode),
            _ => None,
        })
        .collect();
    assert_eq!(
        modes,
        [FetchMode::Assoc, FetchMode::Num, FetchMode::Obj, FetchMode::Class]
    );
    Ok(())
}

#[tokio::test]
async fn single_requires_exactly_one_row() -> OrmResult<()> {
    let conn = MemoryConnection::new();
    let db = Db::new(conn.clone());
    let mut query = db
        .prepare_query("select id from orders where id = ?")
        .await?
        .with_params(params![1])?
        .map_to::<Tuple>();

    conn.push_result(ResultSet::new(["id"]).row([1]));
    assert_eq!(query.single().await?, [Value::Int(1)]);

    conn.push_result(ResultSet::new(["id"]));
    let err = query.single().await.unwrap_err();
    assert!(matches!(
        err,
        pgfluent::OrmError::Cardinality {
            found: RowCount::None,
            ..
        }
    ));

    conn.push_result(ResultSet::new(["id"]).row([1]).row([2]));
    let err = query.single().await.unwrap_err();
    assert!(matches!(
        err,
        pgfluent::OrmError::Cardinality {
            found: RowCount::Multiple,
            ..
        }
    ));

    // Parameters are rebound before every execution.
    let binds = conn
        .bound()
        .into_iter()
        .filter(|(_, value, _)| *value == Value::Int(1))
        .count();
    assert_eq!(binds, 3);
    Ok(())
}

#[tokio::test]
async fn single_or_none_distinguishes_absent_from_ambiguous() -> OrmResult<()> {
    let conn = MemoryConnection::new();
    let db = Db::new(conn.clone());
    let mut query = db
        .prepare_query("select id, status from orders where status = :status")
        .await?
        .with_params(named_params! { "status" => "void" })?
        .map_to::<As<Order>>();

    conn.push_result(ResultSet::new(["id", "status"]));
    assert_eq!(query.single_or_none().await?, None);

    conn.push_result(orders());
    assert!(query.single_or_none().await.unwrap_err().is_cardinality());
    Ok(())
}

#[tokio::test]
async fn iterate_is_lazy_and_single_pass() -> OrmResult<()> {
    let conn = MemoryConnection::new();
    conn.push_result(orders());
    let db = Db::new(conn.clone());
    let mut query = db
        .prepare_query("select id, status from orders")
        .await?
        .map_to::<As<Order>>();

    let stream = query.iterate().await?;
    let mut stream = std::pin::pin!(stream);
    let first = stream.try_next().await?;
    assert_eq!(first.map(|o| o.id), Some(1));
    let second = stream.try_next().await?;
    assert_eq!(second.map(|o| o.status), Some("paid".to_string()));
    assert!(stream.try_next().await?.is_none());
    assert_eq!(conn.executed_sql().len(), 1);
    Ok(())
}

#[tokio::test]
async fn column_projection() -> OrmResult<()> {
    let conn = MemoryConnection::new();
    conn.push_result(orders());
    let db = Db::new(conn.clone());

    let statuses: Vec<String> = db
        .prepare_query("select id, status from orders")
        .await?
        .map_to::<Tuple>()
        .fetch_column(1)
        .await?;
    assert_eq!(statuses, ["open", "paid"]);
    assert!(conn.events().contains(&Event::FetchMode(FetchMode::Column(1))));
    Ok(())
}

#[tokio::test]
async fn bound_fields_by_name_and_position() -> OrmResult<()> {
    let conn = MemoryConnection::new();
    let db = Db::new(conn.clone());

    let mut id = 0_i64;
    let mut status = String::new();
    conn.push_result(ResultSet::new(["id", "status"]).row([Value::Int(9), Value::from("open")]));
    db.prepare_query("select id, status from orders where id = 9")
        .await?
        .bind_fields(
            BindMap::by_name()
                .slot("id", &mut id)?
                .slot("status", &mut status)?,
        )?
        .single()
        .await?;
    assert_eq!((id, status.as_str()), (9, "open"));

    let mut second: Option<String> = Some("unchanged".into());
    conn.push_result(ResultSet::new(["id", "status"]));
    let found = db
        .prepare_query("select id, status from orders where false")
        .await?
        .bind_fields(BindMap::new().slot(1_usize, &mut second)?)?
        .single_or_none()
        .await?;
    assert!(!found);
    assert_eq!(second.as_deref(), Some("unchanged"));
    Ok(())
}

#[tokio::test]
async fn bound_fields_rejects_empty_map() -> OrmResult<()> {
    let db = Db::new(MemoryConnection::new());
    let err = db
        .prepare_query("select 1")
        .await?
        .bind_fields(BindMap::by_name())
        .unwrap_err();
    assert!(err.is_usage());
    Ok(())
}
