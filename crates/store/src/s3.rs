//! S3 implementation of StorageProvider.

use std::future::Future;

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::operation::list_objects_v2::ListObjectsV2Output;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};

use rotate_core::{config::S3Config, traits::StorageProvider, CatalogRecord, Error, Result};

use crate::location::split_bucket_key;

const DEFAULT_REGION: &str = "us-east-1";

/// S3 (or S3-compatible) bucket provider. Identifiers are `s3://bucket/key`.
pub struct S3Provider {
    client: Client,
}

impl S3Provider {
    /// Build a client from the default AWS credential chain.
    ///
    /// `config.region` overrides the environment; a custom endpoint switches
    /// to path-style addressing for MinIO and similar stores.
    pub async fn new(config: &S3Config) -> Self {
        let region = RegionProviderChain::first_try(config.region.clone().map(Region::new))
            .or_default_provider()
            .or_else(Region::new(DEFAULT_REGION));

        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(region)
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
        }
    }

    /// Wrap an already configured client.
    pub fn new_with_client(client: Client) -> Self {
        Self { client }
    }
}

fn to_chrono(ts: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts.secs(), ts.subsec_nanos())
}

/// Records for one ListObjectsV2 page. Objects without a key or a
/// modification time are skipped.
fn page_records(bucket: &str, page: &ListObjectsV2Output) -> Vec<CatalogRecord> {
    let mut records = Vec::with_capacity(page.contents().len());
    for object in page.contents() {
        let Some(key) = object.key().filter(|k| !k.is_empty()) else {
            continue;
        };
        let Some(timestamp) = object.last_modified().and_then(to_chrono) else {
            tracing::warn!(bucket, key, "Skipping object without last-modified time");
            continue;
        };

        records.push(
            CatalogRecord::new(
                format!("s3://{}/{}", bucket, key),
                object.size().unwrap_or(0).max(0) as u64,
                timestamp,
            )
            .with_container(bucket),
        );
    }
    records
}

/// Fetch pages until the listing is no longer truncated.
async fn drain_pages<F, Fut>(bucket: &str, mut fetch: F) -> Result<Vec<CatalogRecord>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<ListObjectsV2Output>>,
{
    let mut records = Vec::new();
    let mut token = None;
    loop {
        let page = fetch(token.take()).await?;
        records.extend(page_records(bucket, &page));

        match (page.is_truncated(), page.next_continuation_token()) {
            (Some(true), Some(next)) if !next.is_empty() => token = Some(next.to_string()),
            _ => break,
        }
    }
    Ok(records)
}

#[async_trait]
impl StorageProvider for S3Provider {
    fn name(&self) -> &str {
        "s3"
    }

    async fn list(&self, location: &str) -> Result<Vec<CatalogRecord>> {
        let (bucket, prefix) = split_bucket_key(location);

        let records = drain_pages(bucket, |token| {
            let request = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(token);
            async move {
                request.send().await.map_err(|e| {
                    Error::provider_list(format!("S3 list error on {}: {}", bucket, e))
                })
            }
        })
        .await?;

        tracing::debug!(bucket, prefix, count = records.len(), "Listed S3 objects");
        Ok(records)
    }

    async fn delete(&self, identifier: &str) -> Result<()> {
        let (bucket, key) = split_bucket_key(identifier);
        if key.is_empty() {
            return Err(Error::provider_delete(identifier, "missing object key"));
        }

        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::provider_delete(identifier, format!("S3 delete error: {}", e)))?;

        Ok(())
    }
}
