//! Local filesystem provider.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use rotate_core::{traits::StorageProvider, CatalogRecord, Error, Result};

/// Lists regular files under a directory tree and deletes them by path.
#[derive(Debug, Default, Clone)]
pub struct LocalProvider;

impl LocalProvider {
    pub fn new() -> Self {
        Self
    }
}

fn walk(root: PathBuf) -> Result<Vec<CatalogRecord>> {
    let mut records = Vec::new();

    for entry in WalkDir::new(&root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            Error::provider_list(format!("Failed to walk {}: {}", root.display(), e))
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        // Identifiers are handed back to `delete`, so they must name the file exactly.
        let Some(path) = entry.path().to_str() else {
            tracing::warn!(path = %entry.path().display(), "Skipping file with a non UTF-8 name");
            continue;
        };

        let metadata = entry.metadata().map_err(|e| {
            Error::provider_list(format!("Failed to stat {}: {}", entry.path().display(), e))
        })?;
        let modified = metadata.modified().map_err(|e| {
            Error::provider_list(format!(
                "No modification time for {}: {}",
                entry.path().display(),
                e
            ))
        })?;

        records.push(CatalogRecord::new(
            path,
            metadata.len(),
            DateTime::<Utc>::from(modified),
        ));
    }

    Ok(records)
}

#[async_trait]
impl StorageProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn list(&self, location: &str) -> Result<Vec<CatalogRecord>> {
        let root = PathBuf::from(location);
        tokio::task::spawn_blocking(move || walk(root))
            .await
            .map_err(|e| Error::internal(e.to_string()))?
    }

    async fn delete(&self, identifier: &str) -> Result<()> {
        match tokio::fs::remove_file(identifier).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %identifier, "Already gone");
                Ok(())
            }
            Err(e) => Err(Error::provider_delete(identifier, e.to_string())),
        }
    }
}
