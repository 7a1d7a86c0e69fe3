/*!
 * Fallback Resolver
 * Primary operation -> alternate operation substitutions
 */

use crate::core::OperationId;
use ahash::RandomState;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Registered substitutions, read on every fallback-class match
#[derive(Debug, Default)]
pub struct FallbackRegistry {
    fallbacks: RwLock<HashMap<OperationId, OperationId, RandomState>>,
}

impl FallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the fallback of `primary`
    pub fn register(&self, primary: &str, fallback: &str) {
        debug!(primary = primary, fallback = fallback, "Registered fallback operation");
        self.fallbacks
            .write()
            .insert(primary.into(), fallback.into());
    }

    /// Drop the fallback of `primary`
    pub fn unregister(&self, primary: &str) -> Option<OperationId> {
        self.fallbacks.write().remove(primary)
    }

    pub fn resolve(&self, primary: &str) -> Option<OperationId> {
        self.fallbacks.read().get(primary).cloned()
    }

    pub fn len(&self) -> usize {
        self.fallbacks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fallbacks.read().is_empty()
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for FallbackRegistry {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let registry = Self::new();
        for (primary, fallback) in iter {
            registry.register(primary.as_ref(), fallback.as_ref());
        }
        registry
    }
}
