//! Output-slot binding for call sites that want columns written into
//! existing variables rather than a fresh record.
//!
//! ```ignore
//! let mut id = 0_i64;
//! let mut status = String::new();
//! let found = db
//!     .prepare_query("select id, status from orders where id = ?")
//!     .await?
//!     .with_params(params![7_i64])?
//!     .bind_fields(BindMap::by_name().slot("id", &mut id)?.slot("status", &mut status)?)?
//!     .single_or_none()
//!     .await?;
//! ```

use crate::connection::{FetchMode, Statement};
use crate::error::{OrmError, OrmResult, RowCount};
use crate::query::Query;
use crate::row::Row;
use crate::value::{ConversionError, FromValue, Value};
use std::any::Any;
use std::fmt;

/// Addresses one selected column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKey {
    Name(String),
    /// 0-based position.
    Index(usize),
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Index(idx) => write!(f, "#{idx}"),
        }
    }
}

impl From<&str> for ColumnKey {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for ColumnKey {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<usize> for ColumnKey {
    fn from(idx: usize) -> Self {
        Self::Index(idx)
    }
}

/// A converted column value waiting to be stored.
pub type Staged = Box<dyn Any + Send>;

/// A caller-owned variable a column value can be written into.
///
/// Writing is two-phase: every column of a row is converted before any slot
/// is stored, so a failed conversion leaves all slots as they were.
pub trait OutputSlot: Send {
    fn convert(&self, value: Value) -> Result<Staged, ConversionError>;

    /// Store a value produced by this slot's [`OutputSlot::convert`].
    fn store(&mut self, staged: Staged);
}

impl<T: FromValue + Send + 'static> OutputSlot for T {
    fn convert(&self, value: Value) -> Result<Staged, ConversionError> {
        Ok(Box::new(T::from_value(value)?))
    }

    fn store(&mut self, staged: Staged) {
        if let Ok(value) = staged.downcast::<T>() {
            *self = *value;
        }
    }
}

/// How [`BindMap`] keys address columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    ByName,
    ByPosition,
}

/// Key to output-slot map for [`Query::bind_fields`].
///
/// The addressing mode is either fixed up front ([`BindMap::by_name`],
/// [`BindMap::by_position`]) or taken from the first key added
/// ([`BindMap::new`]). A later key of the other kind is a usage error.
pub struct BindMap<'a> {
    mode: Option<BindMode>,
    slots: Vec<(ColumnKey, &'a mut dyn OutputSlot)>,
}

impl<'a> BindMap<'a> {
    /// A map whose mode follows its first key.
    pub fn new() -> Self {
        Self {
            mode: None,
            slots: Vec::new(),
        }
    }

    pub fn by_name() -> Self {
        Self::with_mode(BindMode::ByName)
    }

    pub fn by_position() -> Self {
        Self::with_mode(BindMode::ByPosition)
    }

    pub fn with_mode(mode: BindMode) -> Self {
        Self {
            mode: Some(mode),
            slots: Vec::new(),
        }
    }

    /// `None` until a mode is fixed.
    pub fn mode(&self) -> Option<BindMode> {
        self.mode
    }

    /// Register a slot for `key`.
    pub fn slot<T: OutputSlot>(
        mut self,
        key: impl Into<ColumnKey>,
        slot: &'a mut T,
    ) -> OrmResult<Self> {
        let key = key.into();
        let key_mode = match key {
            ColumnKey::Name(_) => BindMode::ByName,
            ColumnKey::Index(_) => BindMode::ByPosition,
        };
        match self.mode {
            None => self.mode = Some(key_mode),
            Some(mode) if mode == key_mode => {}
            Some(mode) => {
                return Err(OrmError::usage(format!(
                    "bind key {key} does not match {mode:?} binding"
                )));
            }
        }
        self.slots.push((key, slot));
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn fetch_mode(&self) -> FetchMode {
        match self.mode {
            Some(BindMode::ByPosition) => FetchMode::Num,
            Some(BindMode::ByName) | None => FetchMode::Assoc,
        }
    }

    /// Write the selected columns of `row` into their slots, or none of them.
    fn fill(&mut self, row: Row) -> OrmResult<()> {
        let staged = self
            .slots
            .iter()
            .map(|(key, slot)| {
                let value = match key {
                    ColumnKey::Name(name) => row.get(name).cloned(),
                    ColumnKey::Index(idx) => row.get_index(*idx).cloned(),
                }
                .ok_or_else(|| {
                    OrmError::decode(key.to_string(), "column not found in result row")
                })?;
                slot.convert(value)
                    .map_err(|e| OrmError::decode(key.to_string(), e.to_string()))
            })
            .collect::<OrmResult<Vec<_>>>()?;
        for ((_, slot), value) in self.slots.iter_mut().zip(staged) {
            slot.store(value);
        }
        Ok(())
    }
}

impl Default for BindMap<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BindMap<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindMap")
            .field("mode", &self.mode)
            .field("keys", &self.slots.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .finish()
    }
}

/// A query that writes its single result row into caller-owned slots.
#[must_use]
pub struct BoundQuery<'a, S> {
    query: Query<S>,
    map: BindMap<'a>,
}

impl<'a, S: Statement> BoundQuery<'a, S> {
    pub(crate) fn new(query: Query<S>, map: BindMap<'a>) -> Self {
        Self { query, map }
    }

    /// Execute and fill the slots from exactly one row.
    ///
    /// Zero rows, or more than one, is a cardinality error and leaves every
    /// slot untouched.
    pub async fn single(&mut self) -> OrmResult<()> {
        const OP: &str = "BoundQuery::single";
        match self.fetch_at_most_one(OP).await? {
            Some(row) => self.map.fill(row),
            None => Err(OrmError::cardinality(OP, RowCount::None)),
        }
    }

    /// Like [`BoundQuery::single`], but zero rows returns `false`.
    pub async fn single_or_none(&mut self) -> OrmResult<bool> {
        const OP: &str = "BoundQuery::single_or_none";
        match self.fetch_at_most_one(OP).await? {
            Some(row) => self.map.fill(row).map(|()| true),
            None => Ok(false),
        }
    }

    async fn fetch_at_most_one(&mut self, operation: &'static str) -> OrmResult<Option<Row>> {
        let mode = self.map.fetch_mode();
        let statement = self.query.statement_mut();
        statement.set_fetch_mode(mode);
        self.query.run(operation).await?;

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

    /// Release the slots and keep the query.
    pub fn into_query(self) -> Query<S> {
        self.query
    }
}

impl<S> fmt::Debug for BoundQuery<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundQuery")
            .field("query", &self.query)
            .field("map", &self.map)
            .finish()
    }
}
