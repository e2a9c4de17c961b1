//! Storage backends for rotate-files.
//!
//! A [`Location`] string picks the backend; [`provider_for`] builds the
//! matching [`StorageProvider`]: local filesystem, S3, Google Cloud Storage
//! or Azure Blob Storage.

pub mod azure;
pub mod gcs;
pub mod local;
pub mod location;
mod oauth;
pub mod s3;

use std::sync::Arc;

use rotate_core::{
    config::{AzureConfig, GcsConfig, RotateConfig, S3Config},
    traits::StorageProvider,
    Result,
};

pub use azure::AzureProvider;
pub use gcs::GcsProvider;
pub use local::LocalProvider;
pub use location::{split_account_container, split_bucket_key, Location};
pub use s3::S3Provider;

/// Backend settings handed to the factory.
#[derive(Debug, Clone, Default)]
pub struct StoreSettings {
    pub s3: S3Config,
    pub gcs: GcsConfig,
    pub azure: AzureConfig,
}

impl From<&RotateConfig> for StoreSettings {
    fn from(config: &RotateConfig) -> Self {
        Self {
            s3: config.s3.clone(),
            gcs: config.gcs.clone(),
            azure: config.azure.clone(),
        }
    }
}

/// Build the provider that serves `location`.
pub async fn provider_for(
    location: &Location,
    settings: &StoreSettings,
) -> Result<Arc<dyn StorageProvider>> {
    tracing::debug!(backend = location.backend(), "Initializing storage provider");

    match location {
        Location::Local(_) => Ok(Arc::new(LocalProvider::new())),
        Location::S3 { .. } => Ok(Arc::new(S3Provider::new(&settings.s3).await)),
        Location::Gcs { .. } => Ok(Arc::new(GcsProvider::new(&settings.gcs)?)),
        Location::Azure { account, .. } => {
            Ok(Arc::new(AzureProvider::new(account, &settings.azure)?))
        }
    }
}
