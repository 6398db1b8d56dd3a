//! Resource model for declared carbon-intensity providers.
//!
//! A resource pairs a desired [`ProviderSpec`] with an observed
//! [`ProviderStatus`]. Specs are written by the declarer (config file or an
//! external control plane); status is owned exclusively by the reconciler and
//! mutated through the store's optimistic-concurrency patch primitive.

mod condition;
mod error;
mod store;
mod types;

pub use condition::*;
pub use error::*;
pub use store::*;
pub use types::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one provider resource instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
