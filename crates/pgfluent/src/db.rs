//! The application-facing entry point.

use crate::connection::Connection;
use crate::error::OrmResult;
use crate::ident;
use crate::insert::{InsertBuilder, InsertOptions};
use crate::query::{LOG_SQL_MAX, Query, truncate_sql};
use crate::transaction::Transaction;
use crate::value::Value;

/// Statement construction, insert building and transaction scoping over one
/// connection.
///
/// # Example
///
/// ```ignore
/// use pgfluent::{Db, Assoc, named_params};
///
/// let db = Db::connect("postgres://postgres@localhost/app").await?;
/// let open = db
///     .prepare_query("select * from orders where status = :status")
///     .await?
///     .with_params(named_params! { "status" => "open" })?
///     .map_to::<Assoc>()
///     .fetch_all()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct Db<C> {
    conn: C,
}

impl<C: Connection> Db<C> {
    pub fn new(conn: C) -> Self {
        Self { conn }
    }

    /// The underlying connection handle.
    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn into_inner(self) -> C {
        self.conn
    }

    /// Prepare hand-written SQL.
    ///
    /// Placeholders are `?` (positional) or `:name` (named), never mixed.
    pub async fn prepare_query(&self, sql: impl Into<String>) -> OrmResult<Query<C::Statement>> {
        let sql = sql.into();
        tracing::debug!(
            target: "pgfluent.sql",
            sql = %truncate_sql(&sql, LOG_SQL_MAX),
            "preparing statement"
        );
        let statement = self
            .conn
            .prepare(&sql)
            .await
            .map_err(|e| e.within("Db::prepare_query"))?;
        Ok(Query::new(sql, statement))
    }

    /// Start a multi-row insert into `table` with a fixed column order.
    pub fn insert_into<I, S>(
        &self,
        table: impl Into<String>,
        columns: I,
    ) -> OrmResult<InsertBuilder<'_, C>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        InsertBuilder::new(self, table, columns)
    }

    /// Single-row insert from a column map, values bound as `:p0..:pN`.
    ///
    /// The column list is taken from `values` in order.
    ///
    /// ```ignore
    /// let id = db
    ///     .insert("orders", [("customer_id", 7_i64)], InsertOptions::new().returning(["id"]))
    ///     .await?
    ///     .map_to::<Tuple>()
    ///     .fetch_column::<i64>(0)
    ///     .await?;
    /// ```
    pub async fn insert<I, K, V>(
        &self,
        table: &str,
        values: I,
        options: InsertOptions,
    ) -> OrmResult<Query<C::Statement>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let values: Vec<(String, Value)> = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let columns: Vec<&str> = values.iter().map(|(k, _)| k.as_str()).collect();
        let builder = self
            .insert_into(table, columns)?
            .bind_values()
            .append(values.iter().map(|(k, v)| (k.as_str(), v.clone())))?;
        match options.returning {
            Some(fields) => builder.returning(fields).await,
            None => builder.query().await,
        }
    }

    /// Open a transaction scope. The scope holds this `Db` exclusively until
    /// it is finished or dropped.
    pub async fn begin_transaction(&mut self) -> OrmResult<Transaction<'_, C>> {
        Transaction::begin(self).await
    }

    /// Quote a table or column name.
    pub fn quote_identifier(name: &str) -> String {
        ident::quote_identifier(name)
    }
}
