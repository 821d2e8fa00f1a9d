//! SQLite backend for the support-entitlement store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every mutating operation runs inside
//! one `BEGIN IMMEDIATE` transaction, which takes the database write lock
//! before the first read; consumption counters therefore cannot lose
//! updates to concurrent closures.

mod encode;
mod ops;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
