//! Azure Blob Storage provider over the Blob service REST API.

pub mod auth;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header::AUTHORIZATION, Client, Method, RequestBuilder, StatusCode, Url};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

use rotate_core::{config::AzureConfig, traits::StorageProvider, CatalogRecord, Error, Result};

use crate::location::split_account_container;
use crate::oauth::TokenCache;

pub use auth::{ConnectionString, EntraCredential, SharedKey, CONNECTION_STRING_ENV};

const API_VERSION: &str = "2021-08-06";

/// How requests to the blob service are authorized.
pub enum AzureCredential {
    SharedKey(SharedKey),
    /// Query string of a shared access signature, without the leading `?`.
    Sas(Secret<String>),
    Entra(EntraCredential),
}

impl AzureCredential {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SharedKey(_) => "shared_key",
            Self::Sas(_) => "sas",
            Self::Entra(source) => source.kind(),
        }
    }
}

/// Container provider for `azure://account/container/blob` identifiers.
///
/// One provider serves one storage account.
pub struct AzureProvider {
    http: Client,
    account: String,
    endpoint: Url,
    credential: AzureCredential,
    tokens: TokenCache,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EnumerationResults {
    #[serde(default)]
    blobs: BlobList,
    #[serde(default)]
    next_marker: Option<String>,
}

impl EnumerationResults {
    fn next_marker(&self) -> Option<&str> {
        self.next_marker.as_deref().filter(|m| !m.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
struct BlobList {
    #[serde(rename = "Blob", default)]
    items: Vec<BlobItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlobItem {
    name: String,
    properties: BlobProperties,
}

#[derive(Debug, Deserialize)]
struct BlobProperties {
    #[serde(rename = "Creation-Time", default)]
    creation_time: Option<String>,
    #[serde(rename = "Last-Modified", default)]
    last_modified: Option<String>,
    #[serde(rename = "Content-Length", default)]
    content_length: Option<u64>,
}

fn parse_http_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

impl BlobItem {
    fn into_record(self, account: &str, container: &str) -> Option<CatalogRecord> {
        let props = self.properties;
        let timestamp = props
            .creation_time
            .as_deref()
            .and_then(parse_http_date)
            .or_else(|| props.last_modified.as_deref().and_then(parse_http_date))?;

        Some(
            CatalogRecord::new(
                format!("azure://{}/{}/{}", account, container, self.name),
                props.content_length.unwrap_or(0),
                timestamp,
            )
            .with_container(container),
        )
    }
}

fn decode_listing(body: &str) -> Result<EnumerationResults> {
    // The service prefixes its XML with a byte order mark.
    quick_xml::de::from_str(body.trim_start_matches('\u{feff}'))
        .map_err(|e| Error::provider_list(format!("Azure list decode error: {}", e)))
}

impl AzureProvider {
    /// Build a client for `account`.
    ///
    /// A connection string from configuration or `$AZURE_STORAGE_CONNECTION_STRING`
    /// selects Shared Key or SAS authorization; otherwise an Entra ID token
    /// source is picked from the environment.
    pub fn new(account: &str, config: &AzureConfig) -> Result<Self> {
        let connection = config.connection_string.clone().or_else(|| {
            std::env::var(CONNECTION_STRING_ENV)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(Secret::new)
        });

        let (credential, default_endpoint) = match connection {
            Some(raw) => {
                let parsed = ConnectionString::parse(raw.expose_secret())?;
                let endpoint = parsed.blob_endpoint(account);
                (parsed.credential(account)?, endpoint)
            }
            None => (
                AzureCredential::Entra(EntraCredential::from_env()),
                format!("https://{}.blob.core.windows.net", account),
            ),
        };

        let endpoint = config.endpoint.clone().unwrap_or(default_endpoint);
        Self::with_credential(account, &endpoint, credential)
    }

    pub fn with_credential(
        account: &str,
        endpoint: &str,
        credential: AzureCredential,
    ) -> Result<Self> {
        let endpoint = Url::parse(endpoint).map_err(|e| {
            Error::invalid_location(format!("Bad Azure blob endpoint {}: {}", endpoint, e))
        })?;

        let http = Client::builder()
            .user_agent(concat!("rotate-files/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::storage(format!("Failed to build HTTP client: {}", e)))?;

        tracing::debug!(account, credential = credential.kind(), "Resolved Azure credentials");

        Ok(Self {
            http,
            account: account.to_string(),
            endpoint,
            credential,
            tokens: TokenCache::default(),
        })
    }

    /// `{endpoint}/{container}[/{blob}]`. Slashes in blob names stay path
    /// separators; every other reserved character is percent-encoded.
    fn blob_url(&self, container: &str, blob: Option<&str>) -> Result<Url> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| Error::internal("Azure endpoint cannot be a base URL"))?;
            segments.pop_if_empty().push(container);
            if let Some(blob) = blob {
                segments.extend(blob.split('/'));
            }
        }
        Ok(url)
    }

    fn list_url(&self, container: &str, prefix: &str, marker: Option<&str>) -> Result<Url> {
        let mut url = self.blob_url(container, None)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("restype", "container").append_pair("comp", "list");
            if !prefix.is_empty() {
                query.append_pair("prefix", prefix);
            }
            if let Some(marker) = marker {
                query.append_pair("marker", marker);
            }
        }
        Ok(url)
    }

    /// Attach date, version and authorization to a request for `url`.
    async fn request(&self, method: Method, mut url: Url) -> Result<RequestBuilder> {
        if let AzureCredential::Sas(sas) = &self.credential {
            let query = match url.query() {
                Some(existing) => format!("{}&{}", existing, sas.expose_secret()),
                None => sas.expose_secret().clone(),
            };
            url.set_query(Some(&query));
        }

        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .header("x-ms-date", &date)
            .header("x-ms-version", API_VERSION);

        match &self.credential {
            AzureCredential::SharedKey(key) => {
                let authorization = key.authorization(
                    method.as_str(),
                    &url,
                    &[("x-ms-date", date.as_str()), ("x-ms-version", API_VERSION)],
                );
                request = request.header(AUTHORIZATION, authorization);
            }
            AzureCredential::Entra(source) => {
                let token = self
                    .tokens
                    .get_or_refresh(|| source.fetch(&self.http))
                    .await?;
                request = request.bearer_auth(token.expose_secret());
            }
            AzureCredential::Sas(_) => {}
        }

        Ok(request)
    }

    async fn list_page(
        &self,
        container: &str,
        prefix: &str,
        marker: Option<&str>,
    ) -> Result<EnumerationResults> {
        let url = self.list_url(container, prefix, marker)?;
        let response = self
            .request(Method::GET, url)
            .await?
            .send()
            .await
            .map_err(|e| {
                Error::provider_list(format!("Azure list error on {}: {}", container, e))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            Error::provider_list(format!("Azure list error on {}: {}", container, e))
        })?;
        if !status.is_success() {
            return Err(Error::provider_list(format!(
                "Azure list error on {}: {} {}",
                container, status, body
            )));
        }

        decode_listing(&body)
    }
}

#[async_trait]
impl StorageProvider for AzureProvider {
    fn name(&self) -> &str {
        "azure"
    }

    async fn list(&self, location: &str) -> Result<Vec<CatalogRecord>> {
        let (_, container, prefix) = split_account_container(location).ok_or_else(|| {
            Error::invalid_location(format!("{}: expected azure://account/container", location))
        })?;

        let mut records = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let page = self.list_page(&container, &prefix, marker.as_deref()).await?;
            let next = page.next_marker().map(str::to_string);

            for blob in page.blobs.items {
                let name = blob.name.clone();
                match blob.into_record(&self.account, &container) {
                    Some(record) => records.push(record),
                    None => tracing::warn!(
                        container = %container,
                        blob = %name,
                        "Skipping blob without a creation time"
                    ),
                }
            }

            match next {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        tracing::debug!(
            container = %container,
            prefix = %prefix,
            count = records.len(),
            "Listed Azure blobs"
        );
        Ok(records)
    }

    async fn delete(&self, identifier: &str) -> Result<()> {
        let (_, container, blob) = split_account_container(identifier)
            .ok_or_else(|| Error::provider_delete(identifier, "missing container"))?;
        if blob.is_empty() {
            return Err(Error::provider_delete(identifier, "missing blob name"));
        }

        let url = self
            .blob_url(&container, Some(&blob))
            .map_err(|e| Error::provider_delete(identifier, e.to_string()))?;
        let response = self
            .request(Method::DELETE, url)
            .await
            .map_err(|e| Error::provider_delete(identifier, e.to_string()))?
            .send()
            .await
            .map_err(|e| Error::provider_delete(identifier, format!("Azure delete error: {}", e)))?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                tracing::debug!(path = %identifier, "Already gone");
                Ok(())
            }
            s => Err(Error::provider_delete(
                identifier,
                format!("Azure delete error: {}", s),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

    const LISTING: &str = "\u{feff}<?xml version=\"1.0\" encoding=\"utf-8\"?>\
<EnumerationResults ServiceEndpoint=\"https://backups.blob.core.windows.net/\" ContainerName=\"db\">\
<Prefix>daily/</Prefix><Marker /><MaxResults>5000</MaxResults>\
<Blobs>\
<Blob><Name>daily/a.tar</Name><Properties>\
<Creation-Time>Thu, 12 Jan 2023 10:00:00 GMT</Creation-Time>\
<Last-Modified>Thu, 12 Jan 2023 11:00:00 GMT</Last-Modified>\
<Etag>0x8DAF4</Etag><Content-Length>2048</Content-Length>\
<Content-Type>application/x-tar</Content-Type><BlobType>BlockBlob</BlobType>\
</Properties><OrMetadata /></Blob>\
<Blob><Name>daily/b 1.tar</Name><Properties>\
<Last-Modified>Wed, 11 Jan 2023 10:00:00 GMT</Last-Modified>\
<Content-Length>1</Content-Length></Properties></Blob>\
<Blob><Name>daily/c.tar</Name><Properties><Content-Length>7</Content-Length></Properties></Blob>\
</Blobs>\
<NextMarker>2!96!MDAwMDE2IWRhaWx5L2MudGFyITAwMDAyOCE5OTk5LTEyLTMxVDIzOjU5OjU5Ljk5OTk5OTlaIQ--</NextMarker>\
</EnumerationResults>";

    fn provider(endpoint: &str) -> AzureProvider {
        let key = SharedKey::new("backups", &Secret::new(BASE64.encode(b"key"))).unwrap();
        AzureProvider::with_credential("backups", endpoint, AzureCredential::SharedKey(key))
            .unwrap()
    }

    #[test]
    fn test_listing_decodes_into_records() {
        let page = decode_listing(LISTING).unwrap();
        assert!(page.next_marker().unwrap().starts_with("2!96!"));

        let records: Vec<_> = page
            .blobs
            .items
            .into_iter()
            .filter_map(|b| b.into_record("backups", "db"))
            .collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].identifier, "azure://backups/db/daily/a.tar");
        assert_eq!(records[0].size_bytes, 2048);
        assert_eq!(records[0].container.as_deref(), Some("db"));
        // Creation time wins over last modified.
        assert_eq!(
            records[0].timestamp,
            "2023-01-12T10:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert_eq!(
            records[1].timestamp,
            "2023-01-11T10:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[test]
    fn test_last_page_has_no_marker() {
        let page = decode_listing(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
             <EnumerationResults ContainerName=\"db\"><Blobs /><NextMarker /></EnumerationResults>",
        )
        .unwrap();
        assert!(page.blobs.items.is_empty());
        assert!(page.next_marker().is_none());
    }

    #[test]
    fn test_malformed_listing_is_a_list_error() {
        let err = decode_listing(
            "<EnumerationResults><Blobs><Blob><Name>a.tar</Name></Blob></Blobs></EnumerationResults>",
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::ProviderList(_)));
    }

    #[test]
    fn test_urls() {
        let azure = provider("https://backups.blob.core.windows.net");
        assert_eq!(
            azure.blob_url("db", Some("daily/b 1.tar")).unwrap().as_str(),
            "https://backups.blob.core.windows.net/db/daily/b%201.tar"
        );
        assert_eq!(
            azure.list_url("db", "daily/", Some("2!96")).unwrap().as_str(),
            "https://backups.blob.core.windows.net/db?restype=container&comp=list&prefix=daily%2F&marker=2%2196"
        );
        assert_eq!(
            azure.list_url("db", "", None).unwrap().as_str(),
            "https://backups.blob.core.windows.net/db?restype=container&comp=list"
        );

        let azurite = provider("http://127.0.0.1:10000/devstoreaccount1");
        assert_eq!(
            azurite.blob_url("db", Some("a.tar")).unwrap().as_str(),
            "http://127.0.0.1:10000/devstoreaccount1/db/a.tar"
        );
    }

    #[tokio::test]
    async fn test_requests_are_signed() {
        let azure = provider("https://backups.blob.core.windows.net");
        let url = azure.blob_url("db", Some("a.tar")).unwrap();

        let request = azure.request(Method::DELETE, url).await.unwrap().build().unwrap();
        let headers = request.headers();
        assert_eq!(headers["x-ms-version"], API_VERSION);
        assert!(headers.contains_key("x-ms-date"));
        assert!(headers[AUTHORIZATION]
            .to_str()
            .unwrap()
            .starts_with("SharedKey backups:"));
    }

    #[tokio::test]
    async fn test_sas_is_appended_to_the_query() {
        let azure = AzureProvider::with_credential(
            "backups",
            "https://backups.blob.core.windows.net",
            AzureCredential::Sas(Secret::new("sv=2022-11-02&sig=abc%3D".into())),
        )
        .unwrap();

        let url = azure.list_url("db", "", None).unwrap();
        let request = azure.request(Method::GET, url).await.unwrap().build().unwrap();
        assert_eq!(
            request.url().query(),
            Some("restype=container&comp=list&sv=2022-11-02&sig=abc%3D")
        );
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn test_delete_requires_a_blob_name() {
        let azure = provider("https://backups.blob.core.windows.net");
        for identifier in ["azure://backups/db", "azure://backups/db/", "azure://backups"] {
            let err = azure.delete(identifier).await.unwrap_err();
            assert!(matches!(err, Error::ProviderDelete { .. }), "{identifier}");
        }
    }

    #[test]
    fn test_connection_string_picks_endpoint_and_key() {
        let azure = AzureProvider::new(
            "ignored",
            &AzureConfig {
                connection_string: Some(Secret::new("UseDevelopmentStorage=true".into())),
                endpoint: None,
            },
        )
        .unwrap();
        assert_eq!(azure.credential.kind(), "shared_key");
        assert_eq!(
            azure.endpoint.as_str(),
            "http://127.0.0.1:10000/devstoreaccount1"
        );

        let overridden = AzureProvider::new(
            "backups",
            &AzureConfig {
                connection_string: Some(Secret::new(
                    "AccountName=backups;SharedAccessSignature=?sv=1&sig=x".into(),
                )),
                endpoint: Some("http://localhost:10000/backups".into()),
            },
        )
        .unwrap();
        assert_eq!(overridden.credential.kind(), "sas");
        assert_eq!(overridden.endpoint.as_str(), "http://localhost:10000/backups");
    }
}
