//! Parameter maps and the binder that applies them to a statement.

use crate::connection::{BindType, ParamKey, Statement};
use crate::error::{OrmError, OrmResult};
use crate::value::{Value, format_timestamp};

/// Parameters for a prepared statement.
///
/// A map is either purely positional or purely named. Positional index `i`
/// binds at position `i + 1`; named keys bind by placeholder name (a leading
/// `:` is accepted and ignored).
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    Positional(Vec<Value>),
    Named(Vec<(String, Value)>),
}

impl Params {
    /// Positional parameters in placeholder order.
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Positional(values.into_iter().map(Into::into).collect())
    }

    /// Named parameters.
    pub fn named<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Positional(values) => values.len(),
            Self::Named(pairs) => pairs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bind every value to `statement`. Must run before each execution.
    pub fn bind_to<S: Statement + ?Sized>(&self, statement: &mut S) -> OrmResult<()> {
        match self {
            Self::Positional(values) => {
                for (idx, value) in values.iter().enumerate() {
                    bind_typed(statement, ParamKey::Position(idx + 1), value)?;
                }
            }
            Self::Named(pairs) => {
                for (name, value) in pairs {
                    let name = name.strip_prefix(':').unwrap_or(name);
                    bind_typed(statement, ParamKey::Name(name.to_string()), value)?;
                }
            }
        }
        Ok(())
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Self::Positional(values)
    }
}

impl From<Vec<(String, Value)>> for Params {
    fn from(pairs: Vec<(String, Value)>) -> Self {
        Self::Named(pairs)
    }
}

/// Bind an optional parameter map; absent or empty maps are a no-op.
pub fn bind_params<S: Statement + ?Sized>(
    statement: &mut S,
    params: Option<&Params>,
) -> OrmResult<()> {
    match params {
        Some(params) if !params.is_empty() => {
            tracing::trace!(target: "pgfluent.sql", param_count = params.len(), "binding parameters");
            params.bind_to(statement)
        }
        _ => Ok(()),
    }
}

/// Bind one value with its type tag.
///
/// Booleans go out as explicit boolean parameters, timestamps as their
/// ISO-8601 text, everything else with driver inference.
pub fn bind_typed<S: Statement + ?Sized>(
    statement: &mut S,
    key: ParamKey,
    value: &Value,
) -> OrmResult<()> {
    match value {
        Value::Bool(_) => statement.bind_value(key, value.clone(), BindType::Bool),
        Value::Timestamp(ts) => {
            statement.bind_value(key, Value::Text(format_timestamp(ts)), BindType::Inferred)
        }
        Value::Array(_) => Err(OrmError::unsupported_type(format!(
            "cannot bind an array to parameter {key}"
        ))),
        other => statement.bind_value(key, other.clone(), BindType::Inferred),
    }
}

/// Build positional [`Params`].
///
/// ```ignore
/// let params = pgfluent::params![7_i64, "paid"];
/// ```
#[macro_export]
macro_rules! params {
    ($($value:expr),* $(,)?) => {
        $crate::Params::Positional(vec![$($crate::Value::from($value)),*])
    };
}

/// Build named [`Params`].
///
/// ```ignore
/// let params = pgfluent::named_params! { "id" => 7_i64, "status" => "paid" };
/// ```
#[macro_export]
macro_rules! named_params {
    ($($name:expr => $value:expr),* $(,)?) => {
        $crate::Params::Named(vec![$((::std::string::String::from($name), $crate::Value::from($value))),*])
    };
}
