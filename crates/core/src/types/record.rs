use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

// =============================================================================
// Catalog Record
// =============================================================================

/// One artifact as listed by a storage provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    /// Opaque path or object key; also the delete handle.
    pub identifier: String,

    /// Bucket/container scope. `None` for local files.
    pub container: Option<String>,

    /// Size in bytes.
    pub size_bytes: u64,

    /// Last-modified time.
    pub timestamp: DateTime<Utc>,
}

impl CatalogRecord {
    /// Create a record without a container scope.
    pub fn new(identifier: impl Into<String>, size_bytes: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            identifier: identifier.into(),
            container: None,
            size_bytes,
            timestamp,
        }
    }

    /// Attach a bucket/container scope.
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    /// Newest first; equal timestamps fall back to identifier ascending.
    pub fn newest_first(a: &Self, b: &Self) -> Ordering {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.identifier.cmp(&b.identifier))
    }
}

impl fmt::Display for CatalogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path: {}, Timestamp: {}", self.identifier, self.timestamp)
    }
}
