//! Convenient imports for typical `pgfluent` usage.
//!
//! ```ignore
//! use pgfluent::prelude::*;
//! ```

pub use crate::{
    As, Assoc, BindMap, ConflictUpdate, Connection, Db, FetchShape, FromRow, FromValue,
    InsertOptions, Object, OrmError, OrmResult, Params, PgConnection, Row, Statement,
    Transaction, Tuple, Value, named_params, params, transaction,
};

#[cfg(feature = "pool")]
pub use crate::create_pool;
