//! Derive macros for pgfluent
//!
//! Provides `#[derive(FromRow)]`.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod from_row;

/// Derive `FromRow` for a struct.
///
/// # Example
///
/// ```ignore
/// use pgfluent::FromRow;
///
/// #[derive(FromRow)]
/// struct Invoice {
///     id: i64,
///     #[orm(column = "total_due")]
///     total: f64,
///     paid_at: Option<chrono::DateTime<chrono::Utc>>,
/// }
///
/// #[derive(FromRow)]
/// struct Pair(i64, String);
/// ```
///
/// # Attributes
///
/// - `#[orm(column = "name")]` - Map field to a different column name
///
/// Tuple structs read columns by position.
#[proc_macro_derive(FromRow, attributes(orm))]
pub fn derive_from_row(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    from_row::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
