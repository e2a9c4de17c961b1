use std::path::PathBuf;

use config::{Config, Environment, File};
use secrecy::Secret;
use serde::Deserialize;

use crate::error::Result;
use crate::types::RetentionScheme;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_PATH_ENV: &str = "ROTATE_CONFIG";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RotateConfig {
    pub retention: RetentionConfig,
    pub deletion: DeletionConfig,
    pub logging: LoggingConfig,
    pub s3: S3Config,
    pub gcs: GcsConfig,
    pub azure: AzureConfig,
}

/// Signed retention limits; `yearly < 0` means unlimited.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetentionConfig {
    pub hourly: i64,
    pub daily: i64,
    pub weekly: i64,
    pub monthly: i64,
    pub yearly: i64,
    pub dry_run: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DeletionConfig {
    /// Maximum deletes in flight. `1` deletes sequentially.
    pub concurrency: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct S3Config {
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores (MinIO, R2, ...).
    pub endpoint: Option<String>,
}

/// Google Cloud Storage credentials are resolved in order: `access_token`,
/// `anonymous`, `credentials_file`, `$GOOGLE_APPLICATION_CREDENTIALS`, the
/// gcloud well-known file, then the metadata server.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct GcsConfig {
    pub endpoint: Option<String>,
    /// Fixed bearer token, used as is.
    pub access_token: Option<Secret<String>>,
    /// Service account or authorized user JSON file.
    pub credentials_file: Option<PathBuf>,
    /// Send requests without credentials (public buckets, emulators).
    pub anonymous: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AzureConfig {
    /// Takes precedence over `$AZURE_STORAGE_CONNECTION_STRING`. Without
    /// either, an Entra ID token is requested for the storage account.
    pub connection_string: Option<Secret<String>>,
    /// Blob service endpoint override, e.g. an Azurite instance.
    pub endpoint: Option<String>,
}

impl RotateConfig {
    /// Load configuration from an optional file and `ROTATE__*` variables.
    ///
    /// The file is `$ROTATE_CONFIG` when set, otherwise `rotate.{toml,yaml,json}`
    /// in the working directory if present.
    pub fn load() -> Result<Self> {
        let file = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => File::with_name(&path).required(true),
            Err(_) => File::with_name("rotate").required(false),
        };

        let s = Config::builder()
            .add_source(file)
            // Map ROTATE__RETENTION__DAILY=10 to retention.daily
            .add_source(
                Environment::with_prefix("ROTATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(s.try_deserialize()?)
    }

    /// Validated retention scheme from the `retention` section.
    pub fn retention_scheme(&self) -> Result<RetentionScheme> {
        let r = &self.retention;
        RetentionScheme::from_limits(r.hourly, r.daily, r.weekly, r.monthly, r.yearly, r.dry_run)
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        let scheme = RetentionScheme::default();
        Self {
            hourly: scheme.hourly as i64,
            daily: scheme.daily as i64,
            weekly: scheme.weekly as i64,
            monthly: scheme.monthly as i64,
            yearly: scheme.yearly.as_flag(),
            dry_run: scheme.dry_run,
        }
    }
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}
