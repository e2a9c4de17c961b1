use serde::{Deserialize, Serialize};

use super::summary::Summary;

/// Result of a classification call.
///
/// `NoArtifacts` and `NotEligible` are normal terminal states, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "summary", rename_all = "snake_case")]
pub enum ClassifyOutcome {
    /// The catalog was empty.
    NoArtifacts,
    /// A single artifact is never rotated.
    NotEligible,
    /// The catalog was partitioned into tiers.
    Classified(Summary),
}

impl ClassifyOutcome {
    pub fn summary(&self) -> Option<&Summary> {
        match self {
            Self::Classified(summary) => Some(summary),
            _ => None,
        }
    }

    pub fn into_summary(self) -> Option<Summary> {
        match self {
            Self::Classified(summary) => Some(summary),
            _ => None,
        }
    }
}
