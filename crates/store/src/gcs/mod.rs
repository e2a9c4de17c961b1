//! Google Cloud Storage provider over the JSON API.

pub mod auth;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use secrecy::ExposeSecret;
use serde::Deserialize;

use rotate_core::{config::GcsConfig, traits::StorageProvider, CatalogRecord, Error, Result};

use crate::location::split_bucket_key;
use crate::oauth::TokenCache;

pub use auth::GcsCredentials;

const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Bucket provider for `gs://bucket/object` identifiers.
pub struct GcsProvider {
    http: Client,
    endpoint: Url,
    credentials: GcsCredentials,
    tokens: TokenCache,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectResource>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectResource {
    name: String,
    /// The API encodes 64-bit integers as strings.
    #[serde(default)]
    size: Option<String>,
    updated: Option<DateTime<Utc>>,
    time_created: Option<DateTime<Utc>>,
}

impl ObjectResource {
    fn into_record(self, bucket: &str) -> Option<CatalogRecord> {
        let timestamp = self.updated.or(self.time_created)?;
        let size = self
            .size
            .as_deref()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        Some(
            CatalogRecord::new(format!("gs://{}/{}", bucket, self.name), size, timestamp)
                .with_container(bucket),
        )
    }
}

impl GcsProvider {
    pub fn new(config: &GcsConfig) -> Result<Self> {
        let endpoint = config.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::invalid_location(format!("Bad GCS endpoint {}: {}", endpoint, e)))?;

        let http = Client::builder()
            .user_agent(concat!("rotate-files/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::storage(format!("Failed to build HTTP client: {}", e)))?;

        let credentials = GcsCredentials::resolve(config)?;
        tracing::debug!(credentials = credentials.kind(), "Resolved GCS credentials");

        Ok(Self {
            http,
            endpoint,
            credentials,
            tokens: TokenCache::default(),
        })
    }

    /// `{endpoint}/storage/v1/b/{bucket}/o[/{object}]` with each part
    /// percent-encoded as a single segment.
    fn objects_url(&self, bucket: &str, object: Option<&str>) -> Result<Url> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| Error::internal("GCS endpoint cannot be a base URL"))?;
            segments.pop_if_empty().extend(["storage", "v1", "b", bucket, "o"]);
            if let Some(object) = object {
                segments.push(object);
            }
        }
        Ok(url)
    }

    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        Ok(match self.credentials.token(&self.http, &self.tokens).await? {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        })
    }

    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        page_token: Option<&str>,
    ) -> Result<ObjectList> {
        let mut request = self
            .http
            .get(self.objects_url(bucket, None)?)
            .query(&[("prefix", prefix)]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = self
            .authorize(request)
            .await?
            .send()
            .await
            .map_err(|e| Error::provider_list(format!("GCS list error on {}: {}", bucket, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider_list(format!(
                "GCS list error on {}: {} {}",
                bucket, status, body
            )));
        }

        response
            .json::<ObjectList>()
            .await
            .map_err(|e| Error::provider_list(format!("GCS list decode error: {}", e)))
    }
}

#[async_trait]
impl StorageProvider for GcsProvider {
    fn name(&self) -> &str {
        "gcs"
    }

    async fn list(&self, location: &str) -> Result<Vec<CatalogRecord>> {
        let (bucket, prefix) = split_bucket_key(location);

        let mut records = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self.list_page(bucket, prefix, page_token.as_deref()).await?;
            records.extend(page.items.into_iter().filter_map(|o| o.into_record(bucket)));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!(bucket, prefix, count = records.len(), "Listed GCS objects");
        Ok(records)
    }

    async fn delete(&self, identifier: &str) -> Result<()> {
        let (bucket, object) = split_bucket_key(identifier);
        if object.is_empty() {
            return Err(Error::provider_delete(identifier, "missing object name"));
        }

        let request = self.http.delete(self.objects_url(bucket, Some(object))?);
        let response = self
            .authorize(request)
            .await
            .map_err(|e| Error::provider_delete(identifier, e.to_string()))?
            .send()
            .await
            .map_err(|e| Error::provider_delete(identifier, format!("GCS delete error: {}", e)))?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                tracing::debug!(path = %identifier, "Already gone");
                Ok(())
            }
            s => Err(Error::provider_delete(
                identifier,
                format!("GCS delete error: {}", s),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(endpoint: &str) -> GcsProvider {
        GcsProvider::new(&GcsConfig {
            endpoint: Some(endpoint.to_string()),
            anonymous: true,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_object_urls_encode_names() {
        let gcs = provider("http://localhost:4443");
        assert_eq!(
            gcs.objects_url("backups", None).unwrap().as_str(),
            "http://localhost:4443/storage/v1/b/backups/o"
        );
        assert_eq!(
            gcs.objects_url("backups", Some("db/2023 01.tar")).unwrap().as_str(),
            "http://localhost:4443/storage/v1/b/backups/o/db%2F2023%2001.tar"
        );
    }

    #[test]
    fn test_object_list_decodes_into_records() {
        let body = r#"{
            "kind": "storage#objects",
            "nextPageToken": "abc",
            "items": [
                {"name": "db/a.tar", "size": "2048", "updated": "2023-01-12T10:00:00Z"},
                {"name": "db/b.tar", "size": "1", "timeCreated": "2023-01-11T10:00:00.123Z"},
                {"name": "db/c.tar"}
            ]
        }"#;

        let list: ObjectList = serde_json::from_str(body).unwrap();
        assert_eq!(list.next_page_token.as_deref(), Some("abc"));

        let records: Vec<_> = list
            .items
            .into_iter()
            .filter_map(|o| o.into_record("bucket"))
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].identifier, "gs://bucket/db/a.tar");
        assert_eq!(records[0].size_bytes, 2048);
        assert_eq!(records[0].container.as_deref(), Some("bucket"));
        assert_eq!(records[1].timestamp.timestamp_subsec_millis(), 123);
    }

    #[test]
    fn test_empty_page_has_no_items() {
        let list: ObjectList = serde_json::from_str(r#"{"kind": "storage#objects"}"#).unwrap();
        assert!(list.items.is_empty());
        assert!(list.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_static_token_is_sent_as_bearer() {
        let gcs = GcsProvider::new(&GcsConfig {
            endpoint: Some("http://localhost:4443".into()),
            access_token: Some(secrecy::Secret::new("fixed".into())),
            ..Default::default()
        })
        .unwrap();

        let request = gcs
            .authorize(gcs.http.get(gcs.objects_url("b", None).unwrap()))
            .await
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            request.headers()[reqwest::header::AUTHORIZATION],
            "Bearer fixed"
        );

        let anonymous = provider("http://localhost:4443");
        let request = anonymous
            .authorize(anonymous.http.get(anonymous.objects_url("b", None).unwrap()))
            .await
            .unwrap()
            .build()
            .unwrap();
        assert!(request.headers().get(reqwest::header::AUTHORIZATION).is_none());
    }

    #[test]
    fn test_rejects_bad_endpoint() {
        let err = GcsProvider::new(&GcsConfig {
            endpoint: Some("not a url".into()),
            anonymous: true,
            ..Default::default()
        })
        .err()
        .unwrap();
        assert!(matches!(err, Error::InvalidLocation(_)));
    }
}
