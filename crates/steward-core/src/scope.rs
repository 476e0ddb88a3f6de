//! The entity an evaluation run is scoped to.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An `(entity_type, entity_id)` pair, e.g. `("workspace", "acme")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
  pub entity_type: String,
  pub entity_id:   String,
}

impl Scope {
  pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
    Self { entity_type: entity_type.into(), entity_id: entity_id.into() }
  }
}

impl fmt::Display for Scope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.entity_type, self.entity_id)
  }
}
