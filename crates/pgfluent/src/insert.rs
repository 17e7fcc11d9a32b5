//! INSERT statement builder.
//!
//! ```ignore
//! let mut ids = db
//!     .insert_into("tags", ["name", "color"])?
//!     .append([("name", Value::from("red")), ("color", Value::from("#f00"))])?
//!     .append([("name", "blue")])?
//!     .on_conflict(["name"], ConflictUpdate::AllExcept)?
//!     .returning(["id"])
//!     .await?
//!     .map_to::<Tuple>();
//! ```

use crate::connection::Connection;
use crate::db::Db;
use crate::error::{OrmError, OrmResult};
use crate::ident::write_identifier;
use crate::params::Params;
use crate::query::Query;
use crate::value::Value;
use std::str::FromStr;

/// What an `ON CONFLICT` clause does with the conflicting row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictUpdate {
    /// `DO UPDATE SET col = excluded.col` for each listed column. An empty
    /// list means `DO NOTHING`.
    Columns(Vec<String>),
    /// `DO NOTHING`
    Nothing,
    /// Every builder column that is not a conflict column (`"*"`).
    AllExcept,
}

impl ConflictUpdate {
    pub fn columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Columns(columns.into_iter().map(Into::into).collect())
    }
}

impl FromStr for ConflictUpdate {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "*" => Ok(Self::AllExcept),
            other => Err(OrmError::invalid_argument(format!(
                "invalid conflict update option {other:?}, expected \"*\" or a column list"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
struct OnConflict {
    target: Vec<String>,
    update: ConflictUpdate,
}

/// How row values reach the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueMode {
    /// Rendered as quoted literals into the VALUES list.
    Inline,
    /// Emitted as `:pN` placeholders with a named parameter map.
    Bound,
}

/// Options for [`Db::insert`].
#[derive(Debug, Clone, Default)]
pub struct InsertOptions {
    pub returning: Option<Vec<String>>,
}

impl InsertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `RETURNING` clause.
    pub fn returning<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returning = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}

/// Multi-row `INSERT ... VALUES ... [ON CONFLICT ...] [RETURNING ...]` builder.
///
/// The column list is fixed at construction. Each appended row supplies
/// values by column name; columns it omits render as `DEFAULT`. Rows are kept
/// as owned values and rendered on every compile. [`InsertBuilder::query`],
/// [`InsertBuilder::execute`] and [`InsertBuilder::returning`] consume the
/// builder.
#[must_use]
pub struct InsertBuilder<'db, C: Connection> {
    db: &'db Db<C>,
    table: String,
    columns: Vec<String>,
    rows: Vec<Vec<Option<Value>>>,
    on_conflict: Option<OnConflict>,
    returning: Vec<String>,
    mode: ValueMode,
}

impl<'db, C: Connection> InsertBuilder<'db, C> {
    /// Start an insert into `table` with a fixed column order.
    ///
    /// An empty column list is a [`OrmError::Configuration`] error.
    pub fn new<I, S>(db: &'db Db<C>, table: impl Into<String>, columns: I) -> OrmResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let table = table.into();
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            return Err(OrmError::configuration(format!(
                "insert into {table}: column list is empty"
            )));
        }
        Ok(Self {
            db,
            table,
            columns,
            rows: Vec::new(),
            on_conflict: None,
            returning: Vec::new(),
            mode: ValueMode::Inline,
        })
    }

    /// Emit `:p0, :p1, ...` placeholders and a named parameter map instead of
    /// inline literals.
    pub fn bind_values(mut self) -> Self {
        self.mode = ValueMode::Bound;
        self
    }

    /// Append one row of values keyed by column name.
    ///
    /// Columns the row leaves out become `DEFAULT`. A key that is not one of
    /// the builder's columns is an [`OrmError::InvalidArgument`]; an array
    /// value is an [`OrmError::UnsupportedType`].
    pub fn append<I, K, V>(mut self, row: I) -> OrmResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut slots: Vec<Option<Value>> = vec![None; self.columns.len()];
        for (key, value) in row {
            let key = key.as_ref();
            let idx = self.columns.iter().position(|c| c == key).ok_or_else(|| {
                OrmError::invalid_argument(format!(
                    "insert into {}: row has unknown column {key:?}",
                    self.table
                ))
            })?;
            let value = value.into();
            if let Value::Array(_) = value {
                return Err(OrmError::unsupported_type(format!(
                    "insert into {}: column {key:?} holds an array",
                    self.table
                )));
            }
            if slots[idx].replace(value).is_some() {
                return Err(OrmError::invalid_argument(format!(
                    "insert into {}: row sets column {key:?} twice",
                    self.table
                )));
            }
        }
        self.rows.push(slots);
        Ok(self)
    }

    /// Append every row of `rows`, in order.
    pub fn append_all<R, I, K, V>(self, rows: R) -> OrmResult<Self>
    where
        R: IntoIterator<Item = I>,
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        rows.into_iter().try_fold(self, |builder, row| builder.append(row))
    }

    /// Add an `ON CONFLICT` clause. May be called once per builder.
    ///
    /// An empty `target` emits the column-less form (`ON CONFLICT DO ...`).
    pub fn on_conflict<I, S>(mut self, target: I, update: ConflictUpdate) -> OrmResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.on_conflict.is_some() {
            return Err(OrmError::usage("on_conflict() can only be called once"));
        }
        self.on_conflict = Some(OnConflict {
            target: target.into_iter().map(Into::into).collect(),
            update,
        });
        Ok(self)
    }

    /// Render the statement text and its parameters.
    ///
    /// Fails with [`OrmError::InvalidArgument`] when no rows were appended.
    pub fn compile(&self) -> OrmResult<(String, Option<Params>)> {
        if self.rows.is_empty() {
            return Err(OrmError::invalid_argument(format!(
                "insert into {}: no rows appended",
                self.table
            )));
        }

        let conn = self.db.connection();
        let mut sql = String::with_capacity(64 + self.rows.len() * self.columns.len() * 8);
        let mut params: Vec<(String, Value)> = Vec::new();

        sql.push_str("insert into ");
        write_identifier(&mut sql, &self.table);
        sql.push_str(" (");
        push_ident_list(&mut sql, &self.columns);
        sql.push_str(") values ");

        for (row_idx, row) in self.rows.iter().enumerate() {
            if row_idx > 0 {
                sql.push(',');
            }
            sql.push('(');
            for (col_idx, slot) in row.iter().enumerate() {
                if col_idx > 0 {
                    sql.push(',');
                }
                match (slot, self.mode) {
                    (None, _) => sql.push_str("DEFAULT"),
                    (Some(value), ValueMode::Inline) => {
                        sql.push_str(&value.render_literal(|s| conn.quote(s))?);
                    }
                    (Some(value), ValueMode::Bound) => {
                        let name = format!("p{}", params.len());
                        sql.push(':');
                        sql.push_str(&name);
                        params.push((name, value.clone()));
                    }
                }
            }
            sql.push(')');
        }

        if let Some(on_conflict) = &self.on_conflict {
            self.write_on_conflict(&mut sql, on_conflict);
        }

        if !self.returning.is_empty() {
            sql.push_str(" returning ");
            push_ident_list(&mut sql, &self.returning);
        }

        let params = match self.mode {
            ValueMode::Inline => None,
            ValueMode::Bound => Some(Params::Named(params)),
        };
        Ok((sql, params))
    }

    fn write_on_conflict(&self, sql: &mut String, on_conflict: &OnConflict) {
        sql.push_str(" on conflict");
        if !on_conflict.target.is_empty() {
            sql.push_str(" (");
            push_ident_list(sql, &on_conflict.target);
            sql.push(')');
        }

        let updates: Vec<&String> = match &on_conflict.update {
            ConflictUpdate::Nothing => Vec::new(),
            ConflictUpdate::Columns(columns) => columns.iter().collect(),
            ConflictUpdate::AllExcept => self
                .columns
                .iter()
                .filter(|c| !on_conflict.target.contains(*c))
                .collect(),
        };

        // Nothing left to update (explicit empty list, or every column is a
        // conflict column) degrades to DO NOTHING.
        if updates.is_empty() {
            sql.push_str(" do nothing");
            return;
        }

        sql.push_str(" do update set ");
        for (i, column) in updates.into_iter().enumerate() {
            if i > 0 {
                sql.push(',');
            }
            let start = sql.len();
            write_identifier(sql, column);
            let quoted = sql[start..].to_string();
            sql.push_str("=excluded.");
            sql.push_str(&quoted);
        }
    }

    /// Add a `RETURNING` clause and compile.
    pub async fn returning<I, S>(mut self, fields: I) -> OrmResult<Query<C::Statement>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returning = fields.into_iter().map(Into::into).collect();
        self.query().await
    }

    /// Compile and prepare the statement.
    pub async fn query(self) -> OrmResult<Query<C::Statement>> {
        let (sql, params) = self.compile()?;
        tracing::debug!(
            target: "pgfluent.sql",
            table = %self.table,
            rows = self.rows.len(),
            "compiled insert"
        );
        let query = self.db.prepare_query(sql).await?;
        match params {
            Some(params) => query.with_params(params),
            None => Ok(query),
        }
    }

    /// Compile, prepare and execute, discarding any result rows.
    pub async fn execute(self) -> OrmResult<()> {
        self.query().await?.execute().await
    }
}

fn push_ident_list(sql: &mut String, names: &[String]) {
    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            sql.push(',');
        }
        write_identifier(sql, name);
    }
}
