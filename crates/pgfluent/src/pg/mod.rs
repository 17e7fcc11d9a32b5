//! tokio-postgres backend.
//!
//! SQL text is written with `?` or `:name` placeholders and rewritten to
//! `$n` at prepare time. Parameters are coerced to the types the server
//! infers for each placeholder.

mod placeholders;
mod types;

use crate::config::ConnectConfig;
use crate::connection::{BindType, Connection, ParamKey, Statement};
use crate::db::Db;
use crate::error::{OrmError, OrmResult};
use crate::query::{LOG_SQL_MAX, truncate_sql};
use crate::row::Row;
use crate::value::Value;
use futures_util::TryStreamExt;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, RowStream};

enum ClientHandle {
    Owned(Client),
    #[cfg(feature = "pool")]
    Pooled(deadpool_postgres::Object),
    /// Handed off during teardown.
    Detached,
}

struct Shared {
    client: ClientHandle,
    /// Set by [`Connection::rollback_on_drop`]; the next operation issues
    /// `ROLLBACK` before anything else.
    rollback_pending: AtomicBool,
}

impl Shared {
    fn client(&self) -> OrmResult<&Client> {
        match &self.client {
            ClientHandle::Owned(client) => Ok(client),
            #[cfg(feature = "pool")]
            ClientHandle::Pooled(object) => Ok(object),
            ClientHandle::Detached => Err(OrmError::Connection(
                "connection has been released".to_string(),
            )),
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if !*self.rollback_pending.get_mut() {
            return;
        }
        // An owned client closes its socket here and the server aborts the
        // transaction. A pooled one would go back to the pool still inside it.
        #[cfg(feature = "pool")]
        if let ClientHandle::Pooled(object) =
            std::mem::replace(&mut self.client, ClientHandle::Detached)
        {
            release_pooled(object);
        }
    }
}

#[cfg(feature = "pool")]
fn release_pooled(object: deadpool_postgres::Object) {
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(async move {
                if let Err(e) = object.batch_execute("ROLLBACK").await {
                    tracing::warn!(
                        target: "pgfluent.sql",
                        error = %e,
                        "deferred rollback failed; discarding pooled connection"
                    );
                    drop(deadpool_postgres::Object::take(object));
                }
            });
        }
        Err(_) => {
            tracing::warn!(
                target: "pgfluent.sql",
                "no runtime for deferred rollback; discarding pooled connection"
            );
            drop(deadpool_postgres::Object::take(object));
        }
    }
}

/// A Postgres connection, owned or checked out of a pool.
///
/// Clones share the underlying client.
#[derive(Clone)]
pub struct PgConnection {
    shared: Arc<Shared>,
}

impl PgConnection {
    /// Wrap a connected client. The caller keeps driving its connection task.
    pub fn new(client: Client) -> Self {
        Self::from_handle(ClientHandle::Owned(client))
    }

    #[cfg(feature = "pool")]
    pub(crate) fn from_pooled(object: deadpool_postgres::Object) -> Self {
        Self::from_handle(ClientHandle::Pooled(object))
    }

    fn from_handle(client: ClientHandle) -> Self {
        Self {
            shared: Arc::new(Shared {
                client,
                rollback_pending: AtomicBool::new(false),
            }),
        }
    }

    /// Connect with `NoTls` and drive the connection on the current Tokio
    /// runtime.
    pub async fn connect(database_url: &str) -> OrmResult<Self> {
        Self::connect_with(&ConnectConfig::new(database_url)).await
    }

    pub async fn connect_with(config: &ConnectConfig) -> OrmResult<Self> {
        let pg_config = config.to_pg_config()?;
        let (client, connection) = pg_config
            .connect(NoTls)
            .await
            .map_err(|e| OrmError::Connection(e.to_string()))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(target: "pgfluent.sql", error = %e, "connection error");
            }
        });
        Ok(Self::new(client))
    }

    /// The raw driver client, for anything this crate does not cover.
    ///
    /// A rollback left pending by a dropped transaction scope is issued
    /// first, so statements sent through the client never run inside the
    /// abandoned transaction.
    pub async fn client(&self) -> OrmResult<&Client> {
        self.settle().await?;
        self.shared.client()
    }

    /// Whether an abandoned transaction is waiting to be rolled back.
    pub fn rollback_pending(&self) -> bool {
        self.shared.rollback_pending.load(Ordering::Acquire)
    }

    /// Issue a rollback requested by a dropped transaction scope.
    async fn settle(&self) -> OrmResult<()> {
        if self.shared.rollback_pending.swap(false, Ordering::AcqRel) {
            tracing::debug!(target: "pgfluent.sql", "issuing deferred rollback");
            self.shared
                .client()?
                .batch_execute("ROLLBACK")
                .await
                .map_err(|e| OrmError::execution("rollback", e))?;
        }
        Ok(())
    }

    async fn simple(&self, command: &'static str, operation: &'static str) -> OrmResult<()> {
        self.client()
            .await?
            .batch_execute(command)
            .await
            .map_err(|e| OrmError::execution(operation, e))
    }
}

impl fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.shared.client {
            ClientHandle::Owned(_) => "owned",
            #[cfg(feature = "pool")]
            ClientHandle::Pooled(_) => "pooled",
            ClientHandle::Detached => "detached",
        };
        f.debug_struct("PgConnection")
            .field("client", &kind)
            .field("rollback_pending", &self.rollback_pending())
            .finish()
    }
}

impl Connection for PgConnection {
    type Statement = PgStatement;

    async fn prepare(&self, sql: &str) -> OrmResult<PgStatement> {
        let translated = placeholders::translate(sql)?;
        let statement = self
            .client()
            .await?
            .prepare(&translated.sql)
            .await
            .map_err(|e| OrmError::execution("prepare", e))?;
        tracing::trace!(
            target: "pgfluent.sql",
            sql = %truncate_sql(&translated.sql, LOG_SQL_MAX),
            params = statement.params().len(),
            "prepared"
        );
        let columns = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let values = vec![None; statement.params().len()];
        Ok(PgStatement {
            conn: self.clone(),
            statement,
            columns,
            slots: translated.slots,
            values,
            cursor: None,
        })
    }

    async fn begin(&self) -> OrmResult<()> {
        self.simple("BEGIN", "begin").await
    }

    async fn commit(&self) -> OrmResult<()> {
        self.simple("COMMIT", "commit").await
    }

    async fn rollback(&self) -> OrmResult<()> {
        self.simple("ROLLBACK", "rollback").await
    }

    fn rollback_on_drop(&self) {
        self.shared.rollback_pending.store(true, Ordering::Release);
    }
}

/// A server-side prepared statement with its bound values and open cursor.
pub struct PgStatement {
    conn: PgConnection,
    statement: tokio_postgres::Statement,
    columns: Arc<[String]>,
    slots: Vec<ParamKey>,
    values: Vec<Option<Value>>,
    cursor: Option<Pin<Box<RowStream>>>,
}

impl PgStatement {
    /// Index into `values` for a bind key.
    fn slot_for(&self, key: &ParamKey) -> OrmResult<usize> {
        let found = if self.slots.is_empty() {
            match key {
                ParamKey::Position(p) if (1..=self.values.len()).contains(p) => Some(p - 1),
                _ => None,
            }
        } else {
            self.slots.iter().position(|slot| slot == key)
        };
        found.ok_or_else(|| {
            OrmError::invalid_argument(format!("statement has no parameter {key}"))
        })
    }

    fn decode(&self, row: &tokio_postgres::Row) -> OrmResult<Row> {
        let values = (0..row.len())
            .map(|idx| {
                row.try_get::<_, Value>(idx).map_err(|e| {
                    let column = self.columns.get(idx).map_or("?", String::as_str);
                    OrmError::decode(column, e.to_string())
                })
            })
            .collect::<OrmResult<Vec<_>>>()?;
        Ok(Row::new(Arc::clone(&self.columns), values))
    }
}

impl Statement for PgStatement {
    fn bind_value(&mut self, key: ParamKey, value: Value, ty: BindType) -> OrmResult<()> {
        let idx = self.slot_for(&key)?;
        tracing::trace!(target: "pgfluent.sql", %key, ?ty, kind = value.type_name(), "bind");
        self.values[idx] = Some(value);
        Ok(())
    }

    async fn execute(&mut self) -> OrmResult<()> {
        self.cursor = None;
        let client = self.conn.client().await?;
        let params = self
            .values
            .iter()
            .enumerate()
            .map(|(idx, value)| {
                value
                    .as_ref()
                    .map(|v| v as &(dyn ToSql + Sync))
                    .ok_or_else(|| {
                        OrmError::invalid_argument(format!("parameter ${} is not bound", idx + 1))
                    })
            })
            .collect::<OrmResult<Vec<_>>>()?;
        let stream = client
            .query_raw(&self.statement, params.iter().copied())
            .await
            .map_err(|e| OrmError::execution("execute", e))?;
        self.cursor = Some(Box::pin(stream));
        Ok(())
    }

    async fn fetch(&mut self) -> OrmResult<Option<Row>> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };
        match cursor
            .try_next()
            .await
            .map_err(|e| OrmError::execution("fetch", e))?
        {
            Some(row) => self.decode(&row).map(Some),
            None => {
                self.cursor = None;
                Ok(None)
            }
        }
    }
}

impl fmt::Debug for PgStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgStatement")
            .field("columns", &self.columns)
            .field("slots", &self.slots)
            .field("cursor_open", &self.cursor.is_some())
            .finish_non_exhaustive()
    }
}

impl Db<PgConnection> {
    /// Connect to `database_url` (see [`PgConnection::connect`]).
    ///
    /// A malformed URL is a [`OrmError::Configuration`] error.
    pub async fn connect(database_url: &str) -> OrmResult<Self> {
        PgConnection::connect(database_url).await.map(Db::new)
    }

    pub async fn connect_with(config: &ConnectConfig) -> OrmResult<Self> {
        PgConnection::connect_with(config).await.map(Db::new)
    }
}
