//! Core types and pure decision logic for the Steward alerting engine.
//!
//! This crate is deliberately free of HTTP and database dependencies. Rule
//! evaluation, score banding, suppression filtering, learned-weight maths and
//! memory-policy analysis are all pure functions over the types defined here.
//! Storage backends implement [`store::DecisionStore`]; orchestration lives in
//! `steward-engine`.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod action;
pub mod context;
pub mod error;
pub mod notification;
pub mod policy;
pub mod preference;
pub mod risk;
pub mod rules;
pub mod run;
pub mod scope;
pub mod score;
pub mod store;
pub mod ttl;
pub mod weights;

pub use error::{Error, Result, RuleError};
pub use scope::Scope;
