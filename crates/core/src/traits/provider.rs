//! Storage capability traits.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::CatalogRecord;

/// A place where backup artifacts live.
///
/// One implementation exists per backend (local filesystem, object stores).
/// The rotation engine only ever talks to this interface.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Enumerate every artifact under `location`, draining all pages.
    async fn list(&self, location: &str) -> Result<Vec<CatalogRecord>>;

    /// Remove exactly one artifact.
    ///
    /// Deleting an artifact that is already gone must not fail later calls.
    async fn delete(&self, identifier: &str) -> Result<()>;
}
