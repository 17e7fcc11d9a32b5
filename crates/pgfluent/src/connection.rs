//! The statement primitive everything else is built on.
//!
//! A [`Connection`] prepares SQL text into a [`Statement`], runs transaction
//! control, and escapes string literals. A [`Statement`] accepts bound values,
//! executes, and hands back rows one at a time.
//!
//! Two implementations ship with the crate: [`crate::PgConnection`]
//! (tokio-postgres) and [`crate::memory::MemoryConnection`] (scripted, for
//! tests).
//!
//! A statement must not be driven from more than one task at a time, and a
//! live cursor (between `execute` and the final `fetch`) should be drained or
//! dropped before another statement runs on the same connection.

use crate::error::OrmResult;
use crate::row::Row;
use crate::value::{Value, quote_literal};
use std::fmt;
use std::future::Future;

/// Where a bound value goes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamKey {
    /// 1-based position.
    Position(usize),
    /// Placeholder name without the leading `:`.
    Name(String),
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Position(p) => write!(f, "#{p}"),
            Self::Name(n) => write!(f, ":{n}"),
        }
    }
}

/// Type tag passed alongside a bound value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindType {
    /// Explicit boolean parameter.
    Bool,
    /// Let the driver infer the parameter type.
    Inferred,
}

/// Row shape requested from the statement before execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Column-name keyed records.
    Assoc,
    /// 0-based positional tuples.
    Num,
    /// Anonymous objects with one field per column.
    Obj,
    /// Instances of a caller-specified record type.
    Class,
    /// A single column at the given position.
    Column(usize),
}

/// A prepared statement.
pub trait Statement: Send {
    /// Bind one value. Values persist across executions until rebound.
    fn bind_value(&mut self, key: ParamKey, value: Value, ty: BindType) -> OrmResult<()>;

    /// Record the row shape the caller is about to fetch.
    ///
    /// Rows are always returned as [`Row`]; drivers that can exploit the hint
    /// (e.g. skip decoding unused columns) may do so.
    fn set_fetch_mode(&mut self, mode: FetchMode) {
        let _ = mode;
    }

    /// Execute with the currently bound values, opening a fresh cursor.
    fn execute(&mut self) -> impl Future<Output = OrmResult<()>> + Send;

    /// Next row of the current cursor, or `None` once exhausted.
    fn fetch(&mut self) -> impl Future<Output = OrmResult<Option<Row>>> + Send;

    /// Drain the current cursor.
    fn fetch_all(&mut self) -> impl Future<Output = OrmResult<Vec<Row>>> + Send {
        async move {
            let mut rows = Vec::new();
            while let Some(row) = self.fetch().await? {
                rows.push(row);
            }
            Ok(rows)
        }
    }
}

/// A database connection able to prepare statements and scope transactions.
pub trait Connection: Send + Sync {
    type Statement: Statement;

    /// Prepare SQL text.
    fn prepare(&self, sql: &str) -> impl Future<Output = OrmResult<Self::Statement>> + Send;

    fn begin(&self) -> impl Future<Output = OrmResult<()>> + Send;

    fn commit(&self) -> impl Future<Output = OrmResult<()>> + Send;

    fn rollback(&self) -> impl Future<Output = OrmResult<()>> + Send;

    /// Request a rollback from a synchronous context (a dropped transaction).
    ///
    /// Must guarantee that no later statement on this connection runs inside
    /// the abandoned transaction.
    fn rollback_on_drop(&self);

    /// Escape a string as an SQL literal, quotes included.
    fn quote(&self, literal: &str) -> String {
        quote_literal(literal)
    }
}
