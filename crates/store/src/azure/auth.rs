//! Azure Storage credentials: connection strings, Shared Key signing and
//! Microsoft Entra ID tokens.

use std::collections::BTreeMap;
use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, Secret};
use sha2::{Digest, Sha256};

use rotate_core::{Error, Result};

use crate::oauth::{request_token, TokenResponse};

use super::AzureCredential;

pub const CONNECTION_STRING_ENV: &str = "AZURE_STORAGE_CONNECTION_STRING";

const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";
const STORAGE_RESOURCE: &str = "https://storage.azure.com/";
const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
const IMDS_TOKEN_URL: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

const DEV_ACCOUNT: &str = "devstoreaccount1";
const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const DEV_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

/// The parts of a storage connection string that the blob client needs.
#[derive(Default)]
pub struct ConnectionString {
    pub account_name: Option<String>,
    pub account_key: Option<Secret<String>>,
    pub sas: Option<Secret<String>>,
    pub blob_endpoint: Option<String>,
    pub protocol: Option<String>,
    pub endpoint_suffix: Option<String>,
}

impl ConnectionString {
    /// Parse `Key=Value;Key=Value`. Values may themselves contain `=`.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parsed = Self::default();

        for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            // Never echo the segment, it may carry the key.
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| Error::storage("Malformed Azure storage connection string"))?;

            match key {
                "AccountName" => parsed.account_name = Some(value.to_string()),
                "AccountKey" => parsed.account_key = Some(Secret::new(value.to_string())),
                "SharedAccessSignature" => parsed.sas = Some(Secret::new(value.to_string())),
                "BlobEndpoint" => parsed.blob_endpoint = Some(value.to_string()),
                "DefaultEndpointsProtocol" => parsed.protocol = Some(value.to_string()),
                "EndpointSuffix" => parsed.endpoint_suffix = Some(value.to_string()),
                "UseDevelopmentStorage" if value.eq_ignore_ascii_case("true") => {
                    parsed.account_name = Some(DEV_ACCOUNT.to_string());
                    parsed.account_key = Some(Secret::new(DEV_ACCOUNT_KEY.to_string()));
                    parsed.blob_endpoint = Some(DEV_BLOB_ENDPOINT.to_string());
                }
                _ => {}
            }
        }

        if parsed.account_key.is_none() && parsed.sas.is_none() {
            return Err(Error::storage(
                "Azure storage connection string has neither AccountKey nor SharedAccessSignature",
            ));
        }
        Ok(parsed)
    }

    /// Explicit `BlobEndpoint`, or one derived from account, protocol and suffix.
    pub fn blob_endpoint(&self, fallback_account: &str) -> String {
        if let Some(endpoint) = &self.blob_endpoint {
            return endpoint.clone();
        }
        format!(
            "{}://{}.blob.{}",
            self.protocol.as_deref().unwrap_or("https"),
            self.account_name.as_deref().unwrap_or(fallback_account),
            self.endpoint_suffix.as_deref().unwrap_or("core.windows.net"),
        )
    }

    /// Shared Key when the string carries an account key, SAS otherwise.
    pub fn credential(&self, fallback_account: &str) -> Result<AzureCredential> {
        if let Some(key) = &self.account_key {
            let account = self.account_name.as_deref().unwrap_or(fallback_account);
            return Ok(AzureCredential::SharedKey(SharedKey::new(account, key)?));
        }
        match &self.sas {
            Some(sas) => Ok(AzureCredential::Sas(Secret::new(
                sas.expose_secret().trim_start_matches('?').to_string(),
            ))),
            None => Err(Error::storage(
                "Azure storage connection string has neither AccountKey nor SharedAccessSignature",
            )),
        }
    }
}

/// Decoded account key used for Shared Key authorization.
pub struct SharedKey {
    pub account: String,
    key: Vec<u8>,
}

impl SharedKey {
    pub fn new(account: impl Into<String>, encoded_key: &Secret<String>) -> Result<Self> {
        let key = BASE64
            .decode(encoded_key.expose_secret().trim())
            .map_err(|e| Error::storage(format!("Azure account key is not valid base64: {}", e)))?;
        Ok(Self {
            account: account.into(),
            key,
        })
    }

    /// `Authorization` header value for a request without a body.
    ///
    /// `ms_headers` are the `x-ms-*` headers sent with the request, with
    /// lowercase names.
    pub fn authorization(&self, method: &str, url: &Url, ms_headers: &[(&str, &str)]) -> String {
        let to_sign = string_to_sign(method, &self.account, url, ms_headers);
        let signature = BASE64.encode(hmac_sha256(&self.key, to_sign.as_bytes()));
        format!("SharedKey {}:{}", self.account, signature)
    }
}

/// Blob service string-to-sign for requests that carry no standard headers.
fn string_to_sign(method: &str, account: &str, url: &Url, ms_headers: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(256);
    out.push_str(method);
    out.push('\n');
    // Content-Encoding through Range: eleven empty standard headers.
    out.push_str(&"\n".repeat(11));

    let mut headers = ms_headers.to_vec();
    headers.sort();
    for (name, value) in headers {
        out.push_str(name);
        out.push(':');
        out.push_str(value.trim());
        out.push('\n');
    }

    out.push('/');
    out.push_str(account);
    out.push_str(url.path());

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in url.query_pairs() {
        params
            .entry(name.to_lowercase())
            .or_default()
            .push(value.into_owned());
    }
    for (name, mut values) in params {
        values.sort();
        out.push('\n');
        out.push_str(&name);
        out.push(':');
        out.push_str(&values.join(","));
    }

    out
}

/// HMAC-SHA256 (RFC 2104).
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    const BLOCK: usize = 64;

    let mut block = [0u8; BLOCK];
    if key.len() > BLOCK {
        let digest = Sha256::digest(key);
        block[..digest.len()].copy_from_slice(&digest);
    } else {
        block[..key.len()].copy_from_slice(key);
    }

    let ipad: Vec<u8> = block.iter().map(|b| b ^ 0x36).collect();
    let opad: Vec<u8> = block.iter().map(|b| b ^ 0x5c).collect();

    let inner = Sha256::new().chain_update(&ipad).chain_update(data).finalize();
    Sha256::new()
        .chain_update(&opad)
        .chain_update(inner)
        .finalize()
        .to_vec()
}

/// Entra ID token sources, tried the way the Azure SDKs' default chain does:
/// client secret, workload identity, then managed identity.
pub enum EntraCredential {
    ClientSecret {
        authority: String,
        tenant_id: String,
        client_id: String,
        client_secret: Secret<String>,
    },
    WorkloadIdentity {
        authority: String,
        tenant_id: String,
        client_id: String,
        token_file: PathBuf,
    },
    ManagedIdentity {
        client_id: Option<String>,
    },
}

impl EntraCredential {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let authority = get("AZURE_AUTHORITY_HOST")
            .map(|a| a.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_AUTHORITY.to_string());
        let tenant_id = get("AZURE_TENANT_ID");
        let client_id = get("AZURE_CLIENT_ID");

        match (tenant_id, client_id) {
            (Some(tenant_id), Some(client_id)) => {
                if let Some(secret) = get("AZURE_CLIENT_SECRET") {
                    Self::ClientSecret {
                        authority,
                        tenant_id,
                        client_id,
                        client_secret: Secret::new(secret),
                    }
                } else if let Some(file) = get("AZURE_FEDERATED_TOKEN_FILE") {
                    Self::WorkloadIdentity {
                        authority,
                        tenant_id,
                        client_id,
                        token_file: PathBuf::from(file),
                    }
                } else {
                    Self::ManagedIdentity {
                        client_id: Some(client_id),
                    }
                }
            }
            (_, client_id) => Self::ManagedIdentity { client_id },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ClientSecret { .. } => "client_secret",
            Self::WorkloadIdentity { .. } => "workload_identity",
            Self::ManagedIdentity { .. } => "managed_identity",
        }
    }

    pub(crate) async fn fetch(&self, http: &Client) -> Result<TokenResponse> {
        match self {
            Self::ClientSecret {
                authority,
                tenant_id,
                client_id,
                client_secret,
            } => {
                let request = http
                    .post(format!("{}/{}/oauth2/v2.0/token", authority, tenant_id))
                    .form(&[
                        ("grant_type", "client_credentials"),
                        ("client_id", client_id.as_str()),
                        ("client_secret", client_secret.expose_secret().as_str()),
                        ("scope", STORAGE_SCOPE),
                    ]);
                request_token(request, "Entra ID").await
            }
            Self::WorkloadIdentity {
                authority,
                tenant_id,
                client_id,
                token_file,
            } => {
                let assertion = tokio::fs::read_to_string(token_file).await.map_err(|e| {
                    Error::storage(format!(
                        "Failed to read federated token {}: {}",
                        token_file.display(),
                        e
                    ))
                })?;
                let request = http
                    .post(format!("{}/{}/oauth2/v2.0/token", authority, tenant_id))
                    .form(&[
                        ("grant_type", "client_credentials"),
                        ("client_id", client_id.as_str()),
                        ("client_assertion_type", CLIENT_ASSERTION_TYPE),
                        ("client_assertion", assertion.trim()),
                        ("scope", STORAGE_SCOPE),
                    ]);
                request_token(request, "Entra ID").await
            }
            Self::ManagedIdentity { client_id } => {
                let mut request = http
                    .get(IMDS_TOKEN_URL)
                    .header("Metadata", "true")
                    .query(&[("api-version", "2018-02-01"), ("resource", STORAGE_RESOURCE)]);
                if let Some(id) = client_id {
                    request = request.query(&[("client_id", id.as_str())]);
                }
                request_token(request, "Managed identity").await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    #[test]
    fn test_hmac_sha256_vectors() {
        assert_eq!(
            hex(&hmac_sha256(b"Jefe", b"what do ya want for nothing?")),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
        // Keys longer than the block size are hashed first.
        assert_eq!(
            hex(&hmac_sha256(
                &[0xaa; 131],
                b"Test Using Larger Than Block-Size Key - Hash Key First"
            )),
            "60e431591ee0b67f0d8a26aacbf5b77f8e0bc6213728c5140546040f0ee37f54"
        );
    }

    #[test]
    fn test_connection_string_with_account_key() {
        let cs = ConnectionString::parse(
            "DefaultEndpointsProtocol=https;AccountName=backups;AccountKey=a2V5PT0=;EndpointSuffix=core.chinacloudapi.cn",
        )
        .unwrap();
        assert_eq!(cs.account_name.as_deref(), Some("backups"));
        // Base64 padding survives the split on the first `=`.
        assert_eq!(cs.account_key.unwrap().expose_secret(), "a2V5PT0=");
        assert_eq!(
            ConnectionString::parse("AccountName=backups;AccountKey=a2V5")
                .unwrap()
                .blob_endpoint("ignored"),
            "https://backups.blob.core.windows.net"
        );
    }

    #[test]
    fn test_connection_string_endpoints() {
        let sas = ConnectionString::parse(
            "BlobEndpoint=https://backups.blob.core.windows.net/;SharedAccessSignature=sv=2022-11-02&sig=abc%3D",
        )
        .unwrap();
        assert_eq!(sas.sas.unwrap().expose_secret(), "sv=2022-11-02&sig=abc%3D");

        let dev = ConnectionString::parse("UseDevelopmentStorage=true").unwrap();
        assert_eq!(dev.blob_endpoint("x"), DEV_BLOB_ENDPOINT);
        assert_eq!(dev.account_name.as_deref(), Some(DEV_ACCOUNT));
    }

    #[test]
    fn test_connection_string_without_credentials_is_rejected() {
        assert!(ConnectionString::parse("AccountName=backups").is_err());
        assert!(ConnectionString::parse("AccountName=backups;garbage").is_err());
    }

    #[test]
    fn test_string_to_sign_canonicalizes_query() {
        let url = Url::parse(
            "https://backups.blob.core.windows.net/db?restype=container&comp=list&prefix=daily%2F&marker=2!48",
        )
        .unwrap();

        let signed = string_to_sign(
            "GET",
            "backups",
            &url,
            &[
                ("x-ms-version", "2021-08-06"),
                ("x-ms-date", "Thu, 12 Jan 2023 10:00:00 GMT"),
            ],
        );

        assert_eq!(
            signed,
            "GET\n\n\n\n\n\n\n\n\n\n\n\n\
             x-ms-date:Thu, 12 Jan 2023 10:00:00 GMT\n\
             x-ms-version:2021-08-06\n\
             /backups/db\n\
             comp:list\n\
             marker:2!48\n\
             prefix:daily/\n\
             restype:container"
        );
    }

    #[test]
    fn test_shared_key_authorization() {
        let key = SharedKey::new("backups", &Secret::new(BASE64.encode(b"secret"))).unwrap();
        let url = Url::parse("https://backups.blob.core.windows.net/db/a.tar").unwrap();
        let headers = [("x-ms-date", "Thu, 12 Jan 2023 10:00:00 GMT")];

        let header = key.authorization("DELETE", &url, &headers);
        let expected = BASE64.encode(hmac_sha256(
            b"secret",
            string_to_sign("DELETE", "backups", &url, &headers).as_bytes(),
        ));
        assert_eq!(header, format!("SharedKey backups:{}", expected));

        assert!(SharedKey::new("backups", &Secret::new("not base64!".into())).is_err());
    }

    #[test]
    fn test_entra_credential_selection() {
        let env = |pairs: &'static [(&'static str, &'static str)]| {
            move |name: &str| {
                pairs
                    .iter()
                    .find(|(k, _)| *k == name)
                    .map(|(_, v)| v.to_string())
            }
        };

        let secret = EntraCredential::from_lookup(env(&[
            ("AZURE_TENANT_ID", "t"),
            ("AZURE_CLIENT_ID", "c"),
            ("AZURE_CLIENT_SECRET", "s"),
        ]));
        assert_eq!(secret.kind(), "client_secret");

        let workload = EntraCredential::from_lookup(env(&[
            ("AZURE_TENANT_ID", "t"),
            ("AZURE_CLIENT_ID", "c"),
            ("AZURE_FEDERATED_TOKEN_FILE", "/var/run/secrets/azure/tokens/azure-identity-token"),
        ]));
        assert_eq!(workload.kind(), "workload_identity");

        match EntraCredential::from_lookup(env(&[("AZURE_CLIENT_ID", "user-assigned")])) {
            EntraCredential::ManagedIdentity { client_id } => {
                assert_eq!(client_id.as_deref(), Some("user-assigned"))
            }
            other => panic!("unexpected credential {}", other.kind()),
        }
        assert_eq!(EntraCredential::from_lookup(env(&[])).kind(), "managed_identity");
    }
}
