//! SQLite-backed [`bx_core::Store`] implementation.

pub mod schema;
pub mod sqlite_store;

pub use sqlite_store::SqliteStore;
