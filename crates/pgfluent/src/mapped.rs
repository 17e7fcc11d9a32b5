//! Result mapping: fetch shapes and cardinality-aware fetch operations.

use crate::connection::{FetchMode, Statement};
use crate::error::{OrmError, OrmResult, RowCount};
use crate::query::Query;
use crate::row::{FromRow, Row};
use crate::value::{FromValue, Value};
use futures_core::Stream;
use std::marker::PhantomData;

/// A caller-chosen representation of result rows.
pub trait FetchShape {
    /// What each row becomes.
    type Output;

    /// Fetch mode announced to the statement before execution.
    const MODE: FetchMode;

    fn shape(row: Row) -> OrmResult<Self::Output>;
}

/// Column-name keyed records ([`Row`]).
#[derive(Debug, Clone, Copy)]
pub struct Assoc;

/// 0-based positional tuples.
#[derive(Debug, Clone, Copy)]
pub struct Tuple;

/// Anonymous objects with one field per column.
#[derive(Debug, Clone, Copy)]
pub struct Object;

/// Instances of a named record type, fields populated by column name.
pub struct As<T>(PhantomData<fn() -> T>);

impl FetchShape for Assoc {
    type Output = Row;
    const MODE: FetchMode = FetchMode::Assoc;

    fn shape(row: Row) -> OrmResult<Row> {
        Ok(row)
    }
}

impl FetchShape for Tuple {
    type Output = Vec<Value>;
    const MODE: FetchMode = FetchMode::Num;

    fn shape(row: Row) -> OrmResult<Vec<Value>> {
        Ok(row.into_values())
    }
}

impl FetchShape for Object {
    type Output = serde_json::Map<String, serde_json::Value>;
    const MODE: FetchMode = FetchMode::Obj;

    fn shape(row: Row) -> OrmResult<Self::Output> {
        Ok(row
            .iter()
            .map(|(column, value)| (column.to_string(), value.to_json()))
            .collect())
    }
}

impl<T: FromRow> FetchShape for As<T> {
    type Output = T;
    const MODE: FetchMode = FetchMode::Class;

    fn shape(row: Row) -> OrmResult<T> {
        T::from_row(&row)
    }
}

/// A query whose rows are produced in shape `T`.
///
/// Every operation binds the parameters and executes the statement afresh,
/// so a mapped query can be run repeatedly.
#[must_use]
pub struct MappedQuery<S, T> {
    query: Query<S>,
    _shape: PhantomData<fn() -> T>,
}

impl<S: Statement, T: FetchShape> MappedQuery<S, T> {
    pub(crate) fn new(query: Query<S>) -> Self {
        Self {
            query,
            _shape: PhantomData,
        }
    }

    pub fn sql(&self) -> &str {
        self.query.sql()
    }

    async fn execute_as(&mut self, mode: FetchMode, operation: &'static str) -> OrmResult<()> {
        self.query.statement_mut().set_fetch_mode(mode);
        self.query.run(operation).await
    }

    /// Execute and materialize every row.
    pub async fn fetch_all(&mut self) -> OrmResult<Vec<T::Output>> {
        const OP: &str = "MappedQuery::fetch_all";
        self.execute_as(T::MODE, OP).await?;
        let rows = self
            .query
            .statement_mut()
            .fetch_all()
            .await
            .map_err(|e| e.within(OP))?;
        rows.into_iter().map(T::shape).collect()
    }

    /// Execute and expose the cursor as a forward-only, single-pass stream.
    ///
    /// Each poll fetches one row from the connection. The stream borrows the
    /// query, so it must be dropped before the query runs again.
    pub async fn iterate(
        &mut self,
    ) -> OrmResult<impl Stream<Item = OrmResult<T::Output>> + Send + '_>
    where
        T::Output: Send,
    {
        const OP: &str = "MappedQuery::iterate";
        self.execute_as(T::MODE, OP).await?;
        let statement = self.query.statement_mut();
        Ok(futures_util::stream::try_unfold(
            statement,
            |statement| async move {
                match statement.fetch().await.map_err(|e| e.within(OP))? {
                    Some(row) => {
                        tracing::trace!(target: "pgfluent.sql", "fetched row");
                        Ok(Some((T::shape(row)?, statement)))
                    }
                    None => Ok(None),
                }
            },
        ))
    }

    /// Execute and return exactly one row.
    ///
    /// Zero rows, or a second row after the first, is a cardinality error.
    pub async fn single(&mut self) -> OrmResult<T::Output> {
        const OP: &str = "MappedQuery::single";
        match self.fetch_at_most_one(OP).await? {
            Some(row) => T::shape(row),
            None => Err(OrmError::cardinality(OP, RowCount::None)),
        }
    }

    /// Like [`MappedQuery::single`], but zero rows yields `None`.
    pub async fn single_or_none(&mut self) -> OrmResult<Option<T::Output>> {
        const OP: &str = "MappedQuery::single_or_none";
        self.fetch_at_most_one(OP)
            .await?
            .map(T::shape)
            .transpose()
    }

    /// Single-column projection: the value at `index` from every row.
    pub async fn fetch_column<V: FromValue>(&mut self, index: usize) -> OrmResult<Vec<V>> {
        const OP: &str = "MappedQuery::fetch_column";
        self.execute_as(FetchMode::Column(index), OP).await?;
        let rows = self
            .query
            .statement_mut()
            .fetch_all()
            .await
            .map_err(|e| e.within(OP))?;
        rows.into_iter()
            .map(|row| row.try_get_index::<V>(index))
            .collect()
    }

    async fn fetch_at_most_one(&mut self, operation: &'static str) -> OrmResult<Option<Row>> {
        self.execute_as(T::MODE, operation).await?;
        let statement = self.query.statement_mut();
        let Some(first) = statement.fetch().await.map_err(|e| e.within(operation))? else {
            return Ok(None);
        };
        if statement
            .fetch()
            .await
            .map_err(|e| e.within(operation))?
            .is_some()
        {
            return Err(OrmError::cardinality(operation, RowCount::Multiple));
        }
        Ok(Some(first))
    }

    /// Back to the unshaped query.
    pub fn into_query(self) -> Query<S> {
        self.query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Db;
    use crate::memory::{Event, MemoryConnection, ResultSet};
    use futures_util::StreamExt;

    fn users() -> ResultSet {
        ResultSet::new(["id", "name"])
            .row([Value::Int(1), Value::from("ada")])
            .row([Value::Int(2), Value::from("grace")])
    }

    async fn mapped<T: FetchShape>(
        conn: &MemoryConnection,
    ) -> MappedQuery<crate::memory::MemoryStatement, T> {
        Db::new(conn.clone())
            .prepare_query("select id, name from users")
            .await
            .unwrap()
            .map_to::<T>()
    }

    #[tokio::test]
    async fn fetch_all_shapes_every_row() {
        let conn = MemoryConnection::new();
        conn.push_result(users());
        conn.push_result(users());
        conn.push_result(users());

        let rows = mapped::<Assoc>(&conn).await.fetch_all().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].try_get::<String>("name").unwrap(), "grace");

        let tuples = mapped::<Tuple>(&conn).await.fetch_all().await.unwrap();
        assert_eq!(tuples[0], vec![Value::Int(1), Value::from("ada")]);

        let objects = mapped::<Object>(&conn).await.fetch_all().await.unwrap();
        assert_eq!(objects[0]["name"], serde_json::json!("ada"));
        assert_eq!(objects[1]["id"], serde_json::json!(2));
    }

    #[tokio::test]
    async fn announces_fetch_mode() {
        let conn = MemoryConnection::new();
        conn.push_result(users());
        mapped::<Tuple>(&conn).await.fetch_all().await.unwrap();
        assert!(conn.events().contains(&Event::FetchMode(FetchMode::Num)));
    }

    #[tokio::test]
    async fn single_requires_exactly_one_row() {
        let conn = MemoryConnection::new();
        conn.push_result(ResultSet::new(["id"]));
        conn.push_result(ResultSet::new(["id"]).row([7]));
        conn.push_result(users());

        let mut q = mapped::<Assoc>(&conn).await;
        let err = q.single().await.unwrap_err();
        assert!(matches!(
            err,
            OrmError::Cardinality {
                found: RowCount::None,
                ..
            }
        ));

        let row = q.single().await.unwrap();
        assert_eq!(row.get("id"), Some(&Value::Int(7)));

        let err = q.single().await.unwrap_err();
        assert!(matches!(
            err,
            OrmError::Cardinality {
                found: RowCount::Multiple,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn single_or_none_only_tolerates_zero_rows() {
        let conn = MemoryConnection::new();
        conn.push_result(ResultSet::new(["id"]));
        conn.push_result(ResultSet::new(["id"]).row([7]));
        conn.push_result(users());

        let mut q = mapped::<Tuple>(&conn).await;
        assert_eq!(q.single_or_none().await.unwrap(), None);
        assert_eq!(q.single_or_none().await.unwrap(), Some(vec![Value::Int(7)]));
        assert!(q.single_or_none().await.unwrap_err().is_cardinality());
    }

    #[tokio::test]
    async fn iterate_pulls_rows_lazily() {
        let conn = MemoryConnection::new();
        conn.push_result(users());

        let mut q = mapped::<Assoc>(&conn).await;
        let stream = q.iterate().await.unwrap();
        futures_util::pin_mut!(stream);

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.try_get::<i64>("id").unwrap(), 1);
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.try_get::<i64>("id").unwrap(), 2);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn fetch_column_projects_one_position() {
        let conn = MemoryConnection::new();
        conn.push_result(users());

        let names: Vec<String> = mapped::<Assoc>(&conn)
            .await
            .fetch_column(1)
            .await
            .unwrap();
        assert_eq!(names, ["ada", "grace"]);
        assert!(conn.events().contains(&Event::FetchMode(FetchMode::Column(1))));
    }
}
