//! SQLite backend for the Steward decision store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Idempotent writes are single
//! `INSERT … ON CONFLICT … DO UPDATE` statements against natural unique keys.

mod encode;
mod queries;
mod schema;
mod store;
mod ttl;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
