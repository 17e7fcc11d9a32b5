//! Scripted in-memory connection for tests.
//!
//! A [`MemoryConnection`] hands out result sets queued with
//! [`MemoryConnection::push_result`], one per statement execution, and
//! records every call it receives as an [`Event`]. Clones share state, so a
//! test can keep one handle for inspection after moving another into a
//! [`crate::Db`].
//!
//! ```ignore
//! let conn = MemoryConnection::new();
//! conn.push_result(ResultSet::new(["id"]).row([1]));
//! let db = Db::new(conn.clone());
//! // ... run queries ...
//! assert_eq!(conn.executed_sql(), ["select id from t"]);
//! ```

use crate::connection::{BindType, Connection, FetchMode, ParamKey, Statement};
use crate::error::{OrmError, OrmResult};
use crate::row::Row;
use crate::value::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// One call observed by a [`MemoryConnection`].
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Prepare(String),
    Bind {
        key: ParamKey,
        value: Value,
        ty: BindType,
    },
    FetchMode(FetchMode),
    Execute(String),
    Begin,
    Commit,
    Rollback,
}

/// Rows returned by one execution.
#[derive(Debug, Clone)]
pub struct ResultSet {
    columns: Arc<[String]>,
    rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row; values line up with the column names.
    pub fn row<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.rows.push(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn into_rows(self) -> VecDeque<Row> {
        let columns = self.columns;
        self.rows
            .into_iter()
            .map(|values| Row::new(Arc::clone(&columns), values))
            .collect()
    }
}

impl Default for ResultSet {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

/// Failure injected with one of the `fail_next_*` methods.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct MemoryError(String);

#[derive(Debug, Default)]
struct State {
    events: Vec<Event>,
    results: VecDeque<ResultSet>,
    fail_prepare: Option<String>,
    fail_execute: Option<String>,
    fail_commit: Option<String>,
    in_transaction: bool,
}

/// A scripted [`Connection`]. See the module docs.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnection {
    state: Arc<Mutex<State>>,
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue the result of the next unscripted execution. Executions with
    /// nothing queued return no rows.
    pub fn push_result(&self, result: ResultSet) {
        self.lock().results.push_back(result);
    }

    pub fn fail_next_prepare(&self, message: impl Into<String>) {
        self.lock().fail_prepare = Some(message.into());
    }

    pub fn fail_next_execute(&self, message: impl Into<String>) {
        self.lock().fail_execute = Some(message.into());
    }

    pub fn fail_next_commit(&self, message: impl Into<String>) {
        self.lock().fail_commit = Some(message.into());
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    /// SQL text of every execution, in order.
    pub fn executed_sql(&self) -> Vec<String> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Execute(sql) => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    /// Every bound value, in order.
    pub fn bound(&self) -> Vec<(ParamKey, Value, BindType)> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Bind { key, value, ty } => Some((key.clone(), value.clone(), *ty)),
                _ => None,
            })
            .collect()
    }

    pub fn in_transaction(&self) -> bool {
        self.lock().in_transaction
    }

    fn record(&self, event: Event) {
        self.lock().events.push(event);
    }

    fn end_transaction(&self, event: Event, operation: &'static str) -> OrmResult<()> {
        let mut state = self.lock();
        if !state.in_transaction {
            return Err(OrmError::execution(
                operation,
                MemoryError("there is no active transaction".into()),
            ));
        }
        state.in_transaction = false;
        state.events.push(event);
        Ok(())
    }
}

impl Connection for MemoryConnection {
    type Statement = MemoryStatement;

    async fn prepare(&self, sql: &str) -> OrmResult<MemoryStatement> {
        let mut state = self.lock();
        state.events.push(Event::Prepare(sql.to_string()));
        if let Some(message) = state.fail_prepare.take() {
            return Err(OrmError::execution("prepare", MemoryError(message)));
        }
        Ok(MemoryStatement {
            conn: self.clone(),
            sql: sql.to_string(),
            cursor: VecDeque::new(),
        })
    }

    async fn begin(&self) -> OrmResult<()> {
        let mut state = self.lock();
        if state.in_transaction {
            return Err(OrmError::execution(
                "begin",
                MemoryError("there is already an active transaction".into()),
            ));
        }
        state.in_transaction = true;
        state.events.push(Event::Begin);
        Ok(())
    }

    async fn commit(&self) -> OrmResult<()> {
        if let Some(message) = self.lock().fail_commit.take() {
            return Err(OrmError::execution("commit", MemoryError(message)));
        }
        self.end_transaction(Event::Commit, "commit")
    }

    async fn rollback(&self) -> OrmResult<()> {
        self.end_transaction(Event::Rollback, "rollback")
    }

    fn rollback_on_drop(&self) {
        let mut state = self.lock();
        if state.in_transaction {
            state.in_transaction = false;
            state.events.push(Event::Rollback);
        }
    }
}

/// Statement prepared by a [`MemoryConnection`].
#[derive(Debug)]
pub struct MemoryStatement {
    conn: MemoryConnection,
    sql: String,
    cursor: VecDeque<Row>,
}

impl Statement for MemoryStatement {
    fn bind_value(&mut self, key: ParamKey, value: Value, ty: BindType) -> OrmResult<()> {
        self.conn.record(Event::Bind { key, value, ty });
        Ok(())
    }

    fn set_fetch_mode(&mut self, mode: FetchMode) {
        self.conn.record(Event::FetchMode(mode));
    }

    async fn execute(&mut self) -> OrmResult<()> {
        let mut state = self.conn.lock();
        state.events.push(Event::Execute(self.sql.clone()));
        if let Some(message) = state.fail_execute.take() {
            return Err(OrmError::execution("execute", MemoryError(message)));
        }
        self.cursor = state.results.pop_front().unwrap_or_default().into_rows();
        Ok(())
    }

    async fn fetch(&mut self) -> OrmResult<Option<Row>> {
        Ok(self.cursor.pop_front())
    }
}
