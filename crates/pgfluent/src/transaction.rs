//! Transaction scope with rollback on abandonment.
//!
//! A [`Transaction`] begins when it is created and ends when it is committed,
//! rolled back, closed, or dropped. Dropping an active scope rolls it back, so
//! an early `?` return never leaves the connection inside an open transaction.
//!
//! For the common commit-on-success shape, use the [`transaction!`] macro.
//!
//! # Example
//!
//! ```ignore
//! use pgfluent::{Db, OrmResult, params};
//!
//! # async fn demo(db: &mut Db<pgfluent::PgConnection>) -> OrmResult<()> {
//! let mut tx = db.begin_transaction().await?;
//! tx.prepare_query("update accounts set balance = balance - ? where id = ?")
//!     .await?
//!     .with_params(params![100_i64, 1_i64])?
//!     .execute()
//!     .await?;
//! tx.commit().await?;
//! # Ok(()) }
//! ```

use crate::connection::Connection;
use crate::db::Db;
use crate::error::{OrmError, OrmResult};
use std::ops::Deref;

/// Runs the given block inside a transaction scope.
///
/// - Begins a transaction via `$db.begin_transaction().await`.
/// - Commits on `Ok(_)`.
/// - Rolls back on `Err(_)`, returning the block's error.
///
/// The block must evaluate to `pgfluent::OrmResult<T>`.
///
/// ```ignore
/// let id: i64 = pgfluent::transaction!(&mut db, tx, {
///     let id = tx
///         .insert_into("orders", ["customer_id"])?
///         .append([("customer_id", 7_i64)])?
///         .returning(["id"])
///         .await?
///         .map_to::<pgfluent::Tuple>()
///         .fetch_column::<i64>(0)
///         .await?;
///     Ok(id[0])
/// })?;
/// ```
#[macro_export]
macro_rules! transaction {
    ($db:expr, $tx:ident, $body:block) => {{
        let mut $tx = ($db).begin_transaction().await?;
        let __pgfluent_tx_result: $crate::OrmResult<_> = async { $body }.await;
        match __pgfluent_tx_result {
            Ok(value) => $tx.commit().await.map(|()| value),
            Err(error) => {
                if let Err(rollback_err) = $tx.rollback().await {
                    $crate::__private::tracing::warn!(
                        target: "pgfluent.sql",
                        error = %rollback_err,
                        "rollback after failed transaction body also failed"
                    );
                }
                Err(error)
            }
        }
    }};
}

/// Lifecycle of a [`Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    /// Terminal.
    Committed,
    /// Terminal.
    RolledBack,
}

/// An open transaction on a [`Db`].
///
/// The scope borrows the `Db` mutably, so no second scope can be opened on
/// the same connection until this one is gone. Queries run through it via
/// `Deref<Target = Db<C>>`.
#[must_use = "a transaction rolls back when dropped"]
pub struct Transaction<'c, C: Connection> {
    db: &'c mut Db<C>,
    state: TransactionState,
}

impl<'c, C: Connection> Transaction<'c, C> {
    pub(crate) async fn begin(db: &'c mut Db<C>) -> OrmResult<Self> {
        db.connection()
            .begin()
            .await
            .map_err(|e| e.within("Db::begin_transaction"))?;
        tracing::debug!(target: "pgfluent.sql", "transaction started");
        Ok(Self {
            db,
            state: TransactionState::Active,
        })
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Commit. A second commit is a no-op; committing after a rollback is
    /// a usage error. A failed commit leaves the scope active.
    pub async fn commit(&mut self) -> OrmResult<()> {
        match self.state {
            TransactionState::Committed => Ok(()),
            TransactionState::RolledBack => Err(OrmError::usage("commit after rollback")),
            TransactionState::Active => {
                self.db
                    .connection()
                    .commit()
                    .await
                    .map_err(|e| e.within("Transaction::commit"))?;
                self.state = TransactionState::Committed;
                tracing::debug!(target: "pgfluent.sql", "transaction committed");
                Ok(())
            }
        }
    }

    /// Roll back. A second rollback is a no-op; rolling back after a commit
    /// is a usage error.
    pub async fn rollback(&mut self) -> OrmResult<()> {
        match self.state {
            TransactionState::RolledBack => Ok(()),
            TransactionState::Committed => Err(OrmError::usage("rollback after commit")),
            TransactionState::Active => {
                self.db
                    .connection()
                    .rollback()
                    .await
                    .map_err(|e| e.within("Transaction::rollback"))?;
                self.state = TransactionState::RolledBack;
                tracing::debug!(target: "pgfluent.sql", "transaction rolled back");
                Ok(())
            }
        }
    }

    /// End the scope, rolling back if it is still active.
    pub async fn close(mut self) -> OrmResult<()> {
        if self.is_active() {
            self.rollback().await?;
        }
        Ok(())
    }
}

impl<C: Connection> Deref for Transaction<'_, C> {
    type Target = Db<C>;

    fn deref(&self) -> &Db<C> {
        self.db
    }
}

impl<C: Connection> Drop for Transaction<'_, C> {
    fn drop(&mut self) {
        if self.state == TransactionState::Active {
            tracing::warn!(
                target: "pgfluent.sql",
                "transaction dropped without commit or rollback; rolling back"
            );
            self.db.connection().rollback_on_drop();
            self.state = TransactionState::RolledBack;
        }
    }
}

impl<C: Connection> std::fmt::Debug for Transaction<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
