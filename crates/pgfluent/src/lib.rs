//! # pgfluent
//!
//! Statement building and result mapping for Postgres.
//!
//! ## Features
//!
//! - **Prepared statements with placeholders**: write `?` or `:name`, bind
//!   positional or named [`Params`]
//! - **Multi-row inserts**: [`InsertBuilder`] compiles one `VALUES` list with
//!   `ON CONFLICT` handling and `RETURNING`
//! - **Result mapping**: records, tuples, JSON objects or [`FromRow`] types,
//!   with `single` / `single_or_none` cardinality checks and streaming
//! - **Bound fields**: copy one row's columns into caller-owned variables
//! - **Transaction scope**: commit or roll back explicitly; a dropped scope
//!   rolls back
//!
//! ## Example
//!
//! ```ignore
//! use pgfluent::prelude::*;
//!
//! let mut db = Db::connect("postgres://localhost/shop").await?;
//!
//! db.insert_into("orders", ["customer_id", "total"])?
//!     .append([("customer_id", Value::from(7)), ("total", Value::from(19.5))])?
//!     .on_conflict(["id"], ConflictUpdate::AllExcept)?
//!     .execute()
//!     .await?;
//!
//! let totals: Vec<f64> = db
//!     .prepare_query("select total from orders where customer_id = ?")
//!     .await?
//!     .with_params(params![7])?
//!     .map_to::<Tuple>()
//!     .fetch_column(0)
//!     .await?;
//!
//! let mut tx = db.begin_transaction().await?;
//! tx.prepare_query("delete from orders where total = 0").await?.execute().await?;
//! tx.commit().await?;
//! ```

pub mod bound;
pub mod config;
pub mod connection;
pub mod db;
pub mod error;
pub mod ident;
pub mod insert;
pub mod mapped;
pub mod memory;
pub mod params;
pub mod pg;
pub mod prelude;
pub mod query;
pub mod row;
pub mod transaction;
pub mod value;

pub use bound::{BindMap, BindMode, BoundQuery, ColumnKey, OutputSlot, Staged};
pub use config::{ConnectConfig, DATABASE_URL_ENV};
pub use connection::{BindType, Connection, FetchMode, ParamKey, Statement};
pub use db::Db;
pub use error::{OrmError, OrmResult, RowCount};
pub use ident::{quote_identifier, unquote_identifier};
pub use insert::{ConflictUpdate, InsertBuilder, InsertOptions};
pub use mapped::{As, Assoc, FetchShape, MappedQuery, Object, Tuple};
pub use params::Params;
pub use pg::{PgConnection, PgStatement};
pub use query::Query;
pub use row::{FromRow, Row};
pub use transaction::{Transaction, TransactionState};
pub use value::{ConversionError, FromValue, Value, quote_literal};

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_with_manager_config};

#[cfg(feature = "derive")]
pub use pgfluent_derive::FromRow;

#[doc(hidden)]
pub mod __private {
    pub use tracing;
}
