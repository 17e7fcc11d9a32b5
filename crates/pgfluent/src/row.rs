//! Row mapping traits and utilities

use crate::error::{OrmError, OrmResult};
use crate::value::{FromValue, Value};
use std::sync::Arc;

/// One fetched result row: ordered column names plus their values.
///
/// This is also the associative-record fetch shape: values are addressable
/// by column name and by 0-based position.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Build a row. `values` must line up with `columns`.
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len(), "row width mismatch");
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Position of the first column with this name.
    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Value of the named column, if present.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.index_of(column).map(|idx| &self.values[idx])
    }

    /// Value at a 0-based position, if present.
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Typed access by column name, returning [`OrmError::Decode`] on failure.
    pub fn try_get<T: FromValue>(&self, column: &str) -> OrmResult<T> {
        let value = self
            .get(column)
            .ok_or_else(|| OrmError::decode(column, "column not found in result row"))?;
        T::from_value(value.clone()).map_err(|e| OrmError::decode(column, e.to_string()))
    }

    /// Typed access by 0-based position.
    pub fn try_get_index<T: FromValue>(&self, index: usize) -> OrmResult<T> {
        let column = self.column_label(index);
        let value = self
            .get_index(index)
            .ok_or_else(|| OrmError::decode(column.clone(), "column index out of range"))?;
        T::from_value(value.clone()).map_err(|e| OrmError::decode(column, e.to_string()))
    }

    /// Iterate `(column, value)` pairs in result order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Take the positional values, dropping the column names.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Take the value at `index`, leaving the row consumed.
    pub fn into_value(mut self, index: usize) -> Option<Value> {
        (index < self.values.len()).then(|| self.values.swap_remove(index))
    }

    pub(crate) fn column_label(&self, index: usize) -> String {
        self.columns
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("#{index}"))
    }
}

/// Trait for converting a result row into a Rust struct.
///
/// This trait should typically be derived using `#[derive(FromRow)]`
/// from the `pgfluent-derive` crate.
///
/// # Example
///
/// ```ignore
/// use pgfluent::FromRow;
///
/// #[derive(FromRow)]
/// struct Order {
///     id: i64,
///     customer_id: i64,
///     #[orm(column = "note_text")]
///     note: Option<String>,
/// }
/// ```
pub trait FromRow: Sized {
    /// Convert a result row into Self
    fn from_row(row: &Row) -> OrmResult<Self>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> OrmResult<Self> {
        Ok(row.clone())
    }
}
