/*!
 * Capability Detection
 * Pre-dispatch validation of an operation's backend requirements
 *
 * The detector itself lives in the surrounding pipeline (it inspects the
 * backend catalog); the guard only asks whether a named extension or
 * capability is present.
 */

use crate::core::{FeatureName, GuardError, GuardResult, OperationId};
use ahash::RandomState;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Answers "is capability X available on this backend instance"
pub trait FeatureDetector: Send + Sync {
    fn has_feature(&self, feature: &str) -> bool;

    /// Check every requirement, reporting the first one that is missing
    fn validate(&self, requirements: &OperationRequirements) -> GuardResult<()> {
        match requirements
            .required()
            .find(|feature| !self.has_feature(feature))
        {
            Some(missing) => Err(GuardError::MissingCapability {
                operation: requirements.operation_id.clone(),
                feature: missing.into(),
            }),
            None => Ok(()),
        }
    }
}

/// Features an operation needs before it is worth attempting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRequirements {
    pub operation_id: OperationId,
    #[serde(default)]
    pub extensions: Vec<FeatureName>,
    #[serde(default)]
    pub capabilities: Vec<FeatureName>,
}

impl OperationRequirements {
    pub fn new(operation_id: impl Into<OperationId>) -> Self {
        Self {
            operation_id: operation_id.into(),
            ..Self::default()
        }
    }

    pub fn extension(mut self, name: impl Into<FeatureName>) -> Self {
        self.extensions.push(name.into());
        self
    }

    pub fn capability(mut self, name: impl Into<FeatureName>) -> Self {
        self.capabilities.push(name.into());
        self
    }

    /// Extensions first, then capabilities
    pub fn required(&self) -> impl Iterator<Item = &str> {
        self.extensions
            .iter()
            .chain(self.capabilities.iter())
            .map(|f| f.as_str())
    }
}

/// Detector backed by a fixed, updatable set of known features
#[derive(Debug, Default)]
pub struct StaticDetector {
    available: RwLock<HashSet<FeatureName, RandomState>>,
}

impl StaticDetector {
    pub fn new<I, S>(features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let detector = Self::default();
        {
            let mut available = detector.available.write();
            for f in features {
                available.insert(f.as_ref().into());
            }
        }
        detector
    }

    /// Record the outcome of a fresh detection pass for one feature
    pub fn set_available(&self, feature: &str, available: bool) {
        let mut set = self.available.write();
        if available {
            set.insert(feature.into());
        } else {
            set.remove(feature);
        }
    }
}

impl FeatureDetector for StaticDetector {
    fn has_feature(&self, feature: &str) -> bool {
        self.available.read().contains(feature)
    }
}
