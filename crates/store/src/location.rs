//! Location strings and the backend they select.

use std::fmt;
use std::path::PathBuf;

use rotate_core::{Error, Result};

/// A parsed rotation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local(PathBuf),
    S3 { bucket: String, prefix: String },
    Gcs { bucket: String, prefix: String },
    Azure {
        account: String,
        container: String,
        prefix: String,
    },
}

impl Location {
    /// Parse a local path or a `scheme://` remote location.
    ///
    /// `s3`, `gs`/`gc`/`gcs` and `az`/`azr`/`azure`/`blob` select remote
    /// backends; any other string is taken as a local path.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(Error::invalid_location("empty location"));
        }

        let Some((scheme, _)) = raw.split_once("://") else {
            return Ok(Location::Local(PathBuf::from(raw)));
        };

        match scheme {
            "s3" => {
                let (bucket, prefix) = remote_parts(raw)?;
                Ok(Location::S3 { bucket, prefix })
            }
            "gs" | "gc" | "gcs" => {
                let (bucket, prefix) = remote_parts(raw)?;
                Ok(Location::Gcs { bucket, prefix })
            }
            "az" | "azr" | "azure" | "blob" => {
                let (account, container, prefix) = split_account_container(raw)
                    .ok_or_else(|| {
                        Error::invalid_location(format!(
                            "{raw}: expected {scheme}://account/container[/prefix]"
                        ))
                    })?;
                Ok(Location::Azure {
                    account,
                    container,
                    prefix,
                })
            }
            _ => Ok(Location::Local(PathBuf::from(raw))),
        }
    }

    /// Short backend label for logs.
    pub fn backend(&self) -> &'static str {
        match self {
            Location::Local(_) => "local",
            Location::S3 { .. } => "s3",
            Location::Gcs { .. } => "gcs",
            Location::Azure { .. } => "azure",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(path) => write!(f, "{}", path.display()),
            Location::S3 { bucket, prefix } => write!(f, "s3://{bucket}/{prefix}"),
            Location::Gcs { bucket, prefix } => write!(f, "gs://{bucket}/{prefix}"),
            Location::Azure {
                account,
                container,
                prefix,
            } => write!(f, "azure://{account}/{container}/{prefix}"),
        }
    }
}

fn remote_parts(raw: &str) -> Result<(String, String)> {
    let (bucket, prefix) = split_bucket_key(raw);
    if bucket.is_empty() {
        return Err(Error::invalid_location(format!("{raw}: missing bucket")));
    }
    Ok((bucket.to_string(), prefix.to_string()))
}

/// Split `scheme://bucket/key` into bucket and key.
///
/// Trailing slashes are ignored. Without a `://` separator the whole input
/// is returned as the bucket. A blank key comes back empty.
pub fn split_bucket_key(identifier: &str) -> (&str, &str) {
    let Some((_, rest)) = identifier.split_once("://") else {
        return (identifier.trim_end_matches('/'), "");
    };
    let rest = rest.trim_end_matches('/');

    match rest.split_once('/') {
        Some((bucket, key)) if !key.trim().is_empty() => (bucket, key),
        Some((bucket, _)) => (bucket, ""),
        None => (rest, ""),
    }
}

/// Split `scheme://account/container/path`. `None` when either the account
/// or the container is missing.
pub fn split_account_container(identifier: &str) -> Option<(String, String, String)> {
    let (_, rest) = identifier.split_once("://")?;
    let rest = rest.trim_end_matches('/');

    let mut parts = rest.splitn(3, '/');
    let account = parts.next().filter(|s| !s.is_empty())?;
    let container = parts.next().filter(|s| !s.is_empty())?;
    let path = parts.next().filter(|s| !s.trim().is_empty()).unwrap_or("");

    Some((account.to_string(), container.to_string(), path.to_string()))
}
