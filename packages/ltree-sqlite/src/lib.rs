//! SQLite backend for the ltree index.
//! Paths live in one nullable, unique TEXT column; queries compile to prefix and length
//! predicates over the fixed-width labels.

mod filter;
mod storage;

pub use storage::SqlitePathStore;
