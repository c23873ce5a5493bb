#![forbid(unsafe_code)]
//! Postgres-backed path store for `ltree-core`.
//!
//! Paths are stored in a column of the `ltree` extension type, so subtree, ancestor and
//! sibling filters run as native `<@`, `@>` and `~` predicates backed by a GiST index.

mod query;
mod schema;
mod store;

pub use schema::{ensure_schema, reset_for_tests};
pub use store::PgPathStore;
