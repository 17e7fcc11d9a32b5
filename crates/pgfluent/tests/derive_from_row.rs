#![cfg(feature = "derive")]

use pgfluent::memory::{MemoryConnection, ResultSet};
use pgfluent::{As, Db, FromRow, OrmError, OrmResult, Value};

#[derive(Debug, FromRow, PartialEq)]
struct Invoice {
    id: i64,
    #[orm(column = "total_due")]
    total: f64,
    note: Option<String>,
}

#[derive(Debug, FromRow, PartialEq)]
struct Pair(i64, String);

fn invoices() -> ResultSet {
    ResultSet::new(["id", "total_due", "note"])
        .row([Value::Int(1), Value::Float(9.5), Value::Null])
        .row([Value::Int(2), Value::Int(3), Value::from("rush")])
}

#[tokio::test]
async fn named_fields_follow_column_attribute() -> OrmResult<()> {
    let conn = MemoryConnection::new();
    conn.push_result(invoices());
    let db = Db::new(conn);

    let rows = db
        .prepare_query("select id, total_due, note from invoices")
        .await?
        .map_to::<As<Invoice>>()
        .fetch_all()
        .await?;
    assert_eq!(
        rows,
        [
            Invoice {
                id: 1,
                total: 9.5,
                note: None
            },
            Invoice {
                id: 2,
                total: 3.0,
                note: Some("rush".into())
            }
        ]
    );
    Ok(())
}

#[tokio::test]
async fn tuple_structs_read_by_position() -> OrmResult<()> {
    let conn = MemoryConnection::new();
    conn.push_result(ResultSet::new(["a", "b"]).row([Value::Int(4), Value::from("four")]));
    let db = Db::new(conn);

    let pair = db
        .prepare_query("select a, b from t")
        .await?
        .map_to::<As<Pair>>()
        .single()
        .await?;
    assert_eq!(pair, Pair(4, "four".into()));
    Ok(())
}

#[tokio::test]
async fn missing_column_is_a_decode_error() -> OrmResult<()> {
    let conn = MemoryConnection::new();
    conn.push_result(ResultSet::new(["id"]).row([1]));
    let db = Db::new(conn);

    let err = db
        .prepare_query("select id from invoices")
        .await?
        .map_to::<As<Invoice>>()
        .single()
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Decode { ref column, .. } if column == "total_due"));
    Ok(())
}
