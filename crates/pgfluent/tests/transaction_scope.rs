use pgfluent::memory::{Event, MemoryConnection};
use pgfluent::{Db, OrmError, OrmResult, TransactionState, params};

async fn debit(db: &Db<MemoryConnection>, amount: i64) -> OrmResult<()> {
    db.prepare_query("update accounts set balance = balance - ? where id = 1")
        .await?
        .with_params(params![amount])?
        .execute()
        .await
}

async fn transfer_or_fail(db: &mut Db<MemoryConnection>, fail: bool) -> OrmResult<()> {
    let mut tx = db.begin_transaction().await?;
    debit(&tx, 10).await?;
    if fail {
        return Err(OrmError::invalid_argument("insufficient funds"));
    }
    tx.commit().await
}

#[tokio::test]
async fn early_return_rolls_back() {
    let conn = MemoryConnection::new();
    let mut db = Db::new(conn.clone());

    let err = transfer_or_fail(&mut db, true).await.unwrap_err();
    assert!(err.is_invalid_argument());
    assert!(!conn.in_transaction());
    assert_eq!(conn.events().last(), Some(&Event::Rollback));

    // The connection is usable for a fresh scope afterwards.
    transfer_or_fail(&mut db, false).await.unwrap();
    assert_eq!(conn.events().last(), Some(&Event::Commit));
}

#[tokio::test]
async fn execution_failure_inside_scope_rolls_back() {
    let conn = MemoryConnection::new();
    let mut db = Db::new(conn.clone());
    conn.fail_next_execute("deadlock detected");

    let err = transfer_or_fail(&mut db, false).await.unwrap_err();
    assert!(err.is_execution());
    assert!(err.to_string().contains("deadlock detected"));
    assert!(!conn.in_transaction());
}

#[tokio::test]
async fn state_transitions() {
    let mut db = Db::new(MemoryConnection::new());
    let mut tx = db.begin_transaction().await.unwrap();
    assert_eq!(tx.state(), TransactionState::Active);
    tx.commit().await.unwrap();
    assert_eq!(tx.state(), TransactionState::Committed);
    assert!(tx.rollback().await.unwrap_err().is_usage());
    assert_eq!(tx.state(), TransactionState::Committed);
}

#[tokio::test]
async fn macro_returns_body_value() {
    let conn = MemoryConnection::new();
    let mut db = Db::new(conn.clone());

    let result: OrmResult<i64> = async {
        pgfluent::transaction!(&mut db, tx, {
            debit(&tx, 5).await?;
            Ok(5)
        })
    }
    .await;
    assert_eq!(result.unwrap(), 5);
    assert_eq!(
        conn.events()
            .into_iter()
            .filter(|e| matches!(e, Event::Begin | Event::Commit | Event::Rollback))
            .collect::<Vec<_>>(),
        [Event::Begin, Event::Commit]
    );
}
