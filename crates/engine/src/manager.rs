//! Rotation Manager: list, classify, delete.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local};
use futures::stream::{self, StreamExt};
use rotate_core::{
    CatalogRecord, ClassifyOutcome, Error, Result, RetentionScheme, StorageProvider,
};
use serde::Serialize;

use crate::classifier::classify;
use crate::metrics;

/// One delete that did not go through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteFailure {
    pub identifier: String,
    pub message: String,
}

/// What the deletion phase did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
    /// Records in the delete set that were handed to the provider (or
    /// simulated, in dry-run mode).
    pub attempted: usize,
    pub deleted: usize,
    pub bytes_freed: u64,
    pub failures: Vec<DeleteFailure>,
    pub dry_run: bool,
}

impl DeletionReport {
    fn idle(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    /// Aggregate warning when any delete failed.
    pub fn warning(&self) -> Option<Error> {
        if self.failures.is_empty() {
            return None;
        }
        Some(Error::PartialDeletion {
            failed: self.failures.len(),
            attempted: self.attempted,
        })
    }
}

/// Result of one rotation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationReport {
    #[serde(flatten)]
    pub outcome: ClassifyOutcome,
    pub deletion: DeletionReport,
}

/// Drives one storage location through classification and deletion.
pub struct RotationManager {
    provider: Arc<dyn StorageProvider>,
    scheme: Option<RetentionScheme>,
    location: String,
    concurrency: usize,
}

impl RotationManager {
    pub fn new(
        provider: Arc<dyn StorageProvider>,
        scheme: Option<RetentionScheme>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            scheme,
            location: location.into(),
            concurrency: 1,
        }
    }

    /// Allow up to `limit` deletes in flight. Zero is treated as one.
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit.max(1);
        self
    }

    /// Run a rotation against the current wall-clock time.
    pub async fn rotate(&self) -> Result<RotationReport> {
        self.rotate_at(Local::now().fixed_offset()).await
    }

    /// Run a rotation with a fixed reference time.
    ///
    /// Fails only on a missing scheme or a listing error. Individual delete
    /// failures are collected in the report.
    pub async fn rotate_at(&self, now: DateTime<FixedOffset>) -> Result<RotationReport> {
        let scheme = self
            .scheme
            .as_ref()
            .ok_or_else(|| Error::invalid_scheme("no rotation scheme provided"))?;

        tracing::info!(
            location = %self.location,
            provider = self.provider.name(),
            dry_run = scheme.dry_run,
            "Starting rotation"
        );

        let records = self.provider.list(&self.location).await.map_err(|e| match e {
            Error::ProviderList(_) => e,
            other => Error::provider_list(other.to_string()),
        })?;
        tracing::debug!(count = records.len(), "Listed artifacts");

        let outcome = classify(&records, Some(scheme), now)?;

        let summary = match &outcome {
            ClassifyOutcome::NoArtifacts => {
                tracing::info!(location = %self.location, "No artifacts found");
                return Ok(RotationReport {
                    outcome,
                    deletion: DeletionReport::idle(scheme.dry_run),
                });
            }
            ClassifyOutcome::NotEligible => {
                tracing::info!(location = %self.location, "Single artifact, nothing to rotate");
                return Ok(RotationReport {
                    outcome,
                    deletion: DeletionReport::idle(scheme.dry_run),
                });
            }
            ClassifyOutcome::Classified(summary) => summary,
        };

        metrics::track_classification(summary);

        let deletion = if summary.for_delete.is_empty() {
            tracing::info!("No files eligible for deletion");
            DeletionReport::idle(scheme.dry_run)
        } else if scheme.dry_run {
            self.simulate(&summary.for_delete.records)
        } else {
            self.delete_all(&summary.for_delete.records).await
        };

        if let Some(warning) = deletion.warning() {
            tracing::warn!(error = %warning, "Rotation finished with delete failures");
        } else {
            tracing::info!(
                deleted = deletion.deleted,
                bytes_freed = deletion.bytes_freed,
                dry_run = deletion.dry_run,
                "Rotation finished"
            );
        }

        Ok(RotationReport { outcome, deletion })
    }

    fn simulate(&self, records: &[CatalogRecord]) -> DeletionReport {
        for record in records {
            tracing::info!(path = %record.identifier, "DRYRUN: simulate file delete");
            metrics::track_delete("dry_run");
        }
        DeletionReport {
            attempted: records.len(),
            dry_run: true,
            ..DeletionReport::default()
        }
    }

    async fn delete_all(&self, records: &[CatalogRecord]) -> DeletionReport {
        let results: Vec<(&CatalogRecord, Result<()>)> = stream::iter(records)
            .map(|record| async move { (record, self.remove(&record.identifier).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = DeletionReport {
            attempted: records.len(),
            ..DeletionReport::default()
        };

        for (record, result) in results {
            match result {
                Ok(()) => {
                    report.deleted += 1;
                    report.bytes_freed += record.size_bytes;
                }
                Err(e) => report.failures.push(DeleteFailure {
                    identifier: record.identifier.clone(),
                    message: e.to_string(),
                }),
            }
        }
        report
            .failures
            .sort_by(|a, b| a.identifier.cmp(&b.identifier));

        metrics::track_bytes_freed(report.bytes_freed);
        report
    }

    async fn remove(&self, identifier: &str) -> Result<()> {
        tracing::info!(path = %identifier, "Deleting");
        match self.provider.delete(identifier).await {
            Ok(()) => {
                metrics::track_delete("ok");
                Ok(())
            }
            Err(e) => {
                tracing::error!(path = %identifier, error = %e, "Failed to delete");
                metrics::track_delete("error");
                Err(e)
            }
        }
    }
}
