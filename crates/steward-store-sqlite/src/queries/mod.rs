//! Synchronous query functions, run on the connection thread via
//! `tokio_rusqlite::Connection::call`.
//!
//! Each function takes already-encoded column values and returns raw rows;
//! decoding into domain types happens back on the async side.

pub mod actions;
pub mod kv;
pub mod ledger;
pub mod learning;
pub mod notifications;
pub mod preferences;
pub mod risk;
pub mod scores;

/// `?{first}, ?{first+1}, …` for `n` parameters.
pub(crate) fn placeholders(first: usize, n: usize) -> String {
  (first..first + n).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}
