//! Prepared query wrapper for hand-written SQL

use crate::bound::{BindMap, BoundQuery};
use crate::connection::Statement;
use crate::error::{OrmError, OrmResult};
use crate::mapped::{FetchShape, MappedQuery};
use crate::params::{Params, bind_params};

pub(crate) const LOG_SQL_MAX: usize = 200;

/// A prepared statement plus an optional parameter map.
///
/// # Example
///
/// ```ignore
/// use pgfluent::{Assoc, named_params};
///
/// let order = db
///     .prepare_query("select * from orders where id = :id")
///     .await?
///     .with_params(named_params! { "id" => 7_i64 })?
///     .map_to::<Assoc>()
///     .single()
///     .await?;
/// ```
#[must_use]
pub struct Query<S> {
    sql: String,
    statement: S,
    params: Option<Params>,
}

impl<S: Statement> Query<S> {
    pub(crate) fn new(sql: String, statement: S) -> Self {
        Self {
            sql,
            statement,
            params: None,
        }
    }

    /// The SQL text this query was prepared from.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> Option<&Params> {
        self.params.as_ref()
    }

    /// Attach the parameter map. Calling this twice is a usage error.
    pub fn with_params(mut self, params: impl Into<Params>) -> OrmResult<Self> {
        if self.params.is_some() {
            return Err(OrmError::usage("with_params() called twice"));
        }
        self.params = Some(params.into());
        Ok(self)
    }

    /// Bind the parameters and execute, ignoring any result rows.
    pub async fn execute(&mut self) -> OrmResult<()> {
        self.run("Query::execute").await
    }

    /// Execute and report whether at least one row came back.
    pub async fn exists(&mut self) -> OrmResult<bool> {
        self.run("Query::exists").await?;
        let row = self
            .statement
            .fetch()
            .await
            .map_err(|e| e.within("Query::exists"))?;
        Ok(row.is_some())
    }

    /// Shape result rows as `T` (see [`crate::Assoc`], [`crate::Tuple`],
    /// [`crate::Object`], [`crate::As`]).
    pub fn map_to<T: FetchShape>(self) -> MappedQuery<S, T> {
        MappedQuery::new(self)
    }

    /// Write selected columns into caller-owned slots instead of building rows.
    ///
    /// An empty map is a usage error.
    pub fn bind_fields<'a>(self, map: BindMap<'a>) -> OrmResult<BoundQuery<'a, S>> {
        if map.is_empty() {
            return Err(OrmError::usage("bind_fields() called with an empty map"));
        }
        Ok(BoundQuery::new(self, map))
    }

    /// Give up the wrapper and keep the raw statement.
    pub fn into_statement(self) -> S {
        self.statement
    }

    pub(crate) fn statement_mut(&mut self) -> &mut S {
        &mut self.statement
    }

    /// Bind parameters, then execute. Runs before every fetch operation.
    pub(crate) async fn run(&mut self, operation: &'static str) -> OrmResult<()> {
        bind_params(&mut self.statement, self.params.as_ref()).map_err(|e| e.within(operation))?;
        tracing::debug!(
            target: "pgfluent.sql",
            operation,
            param_count = self.params.as_ref().map_or(0, Params::len),
            sql = %truncate_sql(&self.sql, LOG_SQL_MAX),
            "executing statement"
        );
        self.statement
            .execute()
            .await
            .map_err(|e| e.within(operation))
    }
}

impl<S> std::fmt::Debug for Query<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("sql", &self.sql)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Truncate to at most `max` bytes on a char boundary.
pub(crate) fn truncate_sql(sql: &str, max: usize) -> &str {
    if sql.len() <= max {
        return sql;
    }
    let mut end = max;
    while !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Db;
    use crate::connection::ParamKey;
    use crate::memory::{Event, MemoryConnection, ResultSet};

    #[tokio::test]
    async fn params_bind_before_every_execute() {
        let conn = MemoryConnection::new();
        let db = Db::new(conn.clone());
        let mut q = db
            .prepare_query("update t set n = n + 1 where id = ?")
            .await
            .unwrap()
            .with_params(crate::params![5])
            .unwrap();
        q.execute().await.unwrap();
        q.execute().await.unwrap();

        let binds = conn
            .events()
            .into_iter()
            .filter(|e| matches!(e, Event::Bind { .. }))
            .count();
        assert_eq!(binds, 2);
        assert_eq!(conn.executed_sql().len(), 2);
    }

    #[tokio::test]
    async fn with_params_twice_is_usage_error() {
        let db = Db::new(MemoryConnection::new());
        let err = db
            .prepare_query("select 1")
            .await
            .unwrap()
            .with_params(crate::params![1])
            .unwrap()
            .with_params(crate::params![2])
            .unwrap_err();
        assert!(err.is_usage());
    }

    #[tokio::test]
    async fn exists_reports_presence() {
        let conn = MemoryConnection::new();
        conn.push_result(ResultSet::new(["one"]).row([1]));
        conn.push_result(ResultSet::new(["one"]));
        let db = Db::new(conn.clone());

        let mut q = db
            .prepare_query("select 1 where :on")
            .await
            .unwrap()
            .with_params(crate::named_params! { "on" => true })
            .unwrap();
        assert!(q.exists().await.unwrap());
        assert!(!q.exists().await.unwrap());
        assert!(
            conn.bound()
                .iter()
                .all(|(key, _, _)| *key == ParamKey::Name("on".into()))
        );
    }

    #[tokio::test]
    async fn execution_errors_name_the_operation() {
        let conn = MemoryConnection::new();
        conn.fail_next_execute("deadlock detected");
        let db = Db::new(conn);
        let err = db
            .prepare_query("delete from t")
            .await
            .unwrap()
            .execute()
            .await
            .unwrap_err();
        assert!(err.is_execution());
        assert!(err.to_string().starts_with("Query::execute"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_sql("select 'é'", 9), "select '");
        assert_eq!(truncate_sql("select 1", 100), "select 1");
    }
}
