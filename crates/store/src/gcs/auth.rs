//! Google credentials.
//!
//! A fixed token from configuration wins. Otherwise Application Default
//! Credentials are used: a service account or authorized user JSON file, and
//! finally the metadata server of the VM or pod the process runs on.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

use rotate_core::{config::GcsConfig, Error, Result};

use crate::oauth::{request_token, TokenCache, TokenResponse};

pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

const SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";
const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CredentialsFile {
    ServiceAccount {
        client_email: String,
        private_key: Secret<String>,
        #[serde(default)]
        token_uri: Option<String>,
    },
    AuthorizedUser {
        client_id: String,
        client_secret: Secret<String>,
        refresh_token: Secret<String>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

/// Where bearer tokens for the JSON API come from.
pub enum GcsCredentials {
    Anonymous,
    Static(Secret<String>),
    ServiceAccount {
        client_email: String,
        key: EncodingKey,
        token_uri: String,
    },
    AuthorizedUser {
        client_id: String,
        client_secret: Secret<String>,
        refresh_token: Secret<String>,
    },
    Metadata,
}

impl GcsCredentials {
    /// Pick a credential source from configuration and the environment.
    pub fn resolve(config: &GcsConfig) -> Result<Self> {
        if let Some(token) = &config.access_token {
            return Ok(Self::Static(token.clone()));
        }
        if config.anonymous {
            return Ok(Self::Anonymous);
        }

        let file = config
            .credentials_file
            .clone()
            .or_else(|| std::env::var_os(CREDENTIALS_ENV).map(PathBuf::from))
            .or_else(well_known_file);

        match file {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::Metadata),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::storage(format!(
                "Failed to read Google credentials {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: CredentialsFile = serde_json::from_str(raw)
            .map_err(|e| Error::storage(format!("Unsupported Google credentials: {}", e)))?;

        Ok(match file {
            CredentialsFile::ServiceAccount {
                client_email,
                private_key,
                token_uri,
            } => {
                let key = EncodingKey::from_rsa_pem(private_key.expose_secret().as_bytes())
                    .map_err(|e| {
                        Error::storage(format!("Bad service account key for {}: {}", client_email, e))
                    })?;
                Self::ServiceAccount {
                    client_email,
                    key,
                    token_uri: token_uri.unwrap_or_else(|| TOKEN_URI.to_string()),
                }
            }
            CredentialsFile::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
            } => Self::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
            },
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Static(_) => "static",
            Self::ServiceAccount { .. } => "service_account",
            Self::AuthorizedUser { .. } => "authorized_user",
            Self::Metadata => "metadata",
        }
    }

    /// Current bearer token, or `None` for anonymous access.
    pub(crate) async fn token(
        &self,
        http: &Client,
        cache: &TokenCache,
    ) -> Result<Option<Secret<String>>> {
        match self {
            Self::Anonymous => Ok(None),
            Self::Static(token) => Ok(Some(token.clone())),
            _ => cache.get_or_refresh(|| self.fetch(http)).await.map(Some),
        }
    }

    async fn fetch(&self, http: &Client) -> Result<TokenResponse> {
        match self {
            Self::ServiceAccount {
                client_email,
                key,
                token_uri,
            } => {
                let assertion = sign_assertion(client_email, key, token_uri, Utc::now())?;
                let request = http
                    .post(token_uri.as_str())
                    .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())]);
                request_token(request, "Google").await
            }
            Self::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
            } => {
                let request = http.post(TOKEN_URI).form(&[
                    ("grant_type", "refresh_token"),
                    ("client_id", client_id.as_str()),
                    ("client_secret", client_secret.expose_secret().as_str()),
                    ("refresh_token", refresh_token.expose_secret().as_str()),
                ]);
                request_token(request, "Google").await
            }
            Self::Metadata => {
                let request = http
                    .get(METADATA_TOKEN_URL)
                    .header("Metadata-Flavor", "Google");
                request_token(request, "GCE metadata").await
            }
            Self::Anonymous | Self::Static(_) => {
                Err(Error::internal("credential has no token endpoint"))
            }
        }
    }
}

/// `~/.config/gcloud/application_default_credentials.json`, written by
/// `gcloud auth application-default login`.
fn well_known_file() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    let path = PathBuf::from(home)
        .join(".config")
        .join("gcloud")
        .join("application_default_credentials.json");
    path.is_file().then_some(path)
}

fn sign_assertion(
    client_email: &str,
    key: &EncodingKey,
    audience: &str,
    now: DateTime<Utc>,
) -> Result<String> {
    let iat = now.timestamp();
    let claims = AssertionClaims {
        iss: client_email.to_string(),
        scope: SCOPE.to_string(),
        aud: audience.to_string(),
        iat,
        exp: iat + ASSERTION_LIFETIME_SECS,
    };

    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, key)
        .map_err(|e| Error::storage(format!("Failed to sign token assertion: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation};

    const PRIVATE_KEY: &str = include_str!("../../tests/fixtures/test_rsa_key.pem");
    const PUBLIC_KEY: &str = include_str!("../../tests/fixtures/test_rsa_key.pub.pem");

    fn service_account_json() -> String {
        serde_json::json!({
            "type": "service_account",
            "project_id": "backups",
            "private_key_id": "0123",
            "private_key": PRIVATE_KEY,
            "client_email": "rotate@backups.iam.gserviceaccount.com",
            "client_id": "42"
        })
        .to_string()
    }

    #[test]
    fn test_service_account_file() {
        let creds = GcsCredentials::from_json(&service_account_json()).unwrap();
        match creds {
            GcsCredentials::ServiceAccount {
                client_email,
                token_uri,
                ..
            } => {
                assert_eq!(client_email, "rotate@backups.iam.gserviceaccount.com");
                assert_eq!(token_uri, TOKEN_URI);
            }
            other => panic!("unexpected credential {}", other.kind()),
        }
    }

    #[test]
    fn test_assertion_is_signed_for_the_token_endpoint() {
        let key = EncodingKey::from_rsa_pem(PRIVATE_KEY.as_bytes()).unwrap();
        let jwt = sign_assertion("sa@example.com", &key, TOKEN_URI, Utc::now()).unwrap();

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[TOKEN_URI]);
        let decoded = jsonwebtoken::decode::<AssertionClaims>(
            &jwt,
            &DecodingKey::from_rsa_pem(PUBLIC_KEY.as_bytes()).unwrap(),
            &validation,
        )
        .unwrap();

        assert_eq!(decoded.claims.iss, "sa@example.com");
        assert_eq!(decoded.claims.scope, SCOPE);
        assert_eq!(decoded.claims.exp - decoded.claims.iat, ASSERTION_LIFETIME_SECS);
    }

    #[test]
    fn test_authorized_user_file() {
        let creds = GcsCredentials::from_json(
            r#"{"type": "authorized_user", "client_id": "id", "client_secret": "s", "refresh_token": "r"}"#,
        )
        .unwrap();
        assert_eq!(creds.kind(), "authorized_user");
    }

    #[test]
    fn test_unknown_credential_type_is_rejected() {
        let err = GcsCredentials::from_json(r#"{"type": "external_account"}"#)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_static_token_overrides_credentials_file() {
        let config = GcsConfig {
            access_token: Some(Secret::new("fixed".into())),
            credentials_file: Some(PathBuf::from("/nonexistent/sa.json")),
            ..Default::default()
        };
        assert_eq!(GcsCredentials::resolve(&config).unwrap().kind(), "static");
    }

    #[test]
    fn test_configured_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sa.json");
        std::fs::write(&path, service_account_json()).unwrap();

        let config = GcsConfig {
            credentials_file: Some(path),
            ..Default::default()
        };
        assert_eq!(GcsCredentials::resolve(&config).unwrap().kind(), "service_account");

        let missing = GcsConfig {
            credentials_file: Some(dir.path().join("missing.json")),
            ..Default::default()
        };
        assert!(matches!(
            GcsCredentials::resolve(&missing),
            Err(Error::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_anonymous_and_static_need_no_endpoint() {
        let http = Client::new();
        let cache = TokenCache::default();

        let anonymous = GcsCredentials::resolve(&GcsConfig {
            anonymous: true,
            ..Default::default()
        })
        .unwrap();
        assert!(anonymous.token(&http, &cache).await.unwrap().is_none());

        let fixed = GcsCredentials::Static(Secret::new("fixed".into()));
        let token = fixed.token(&http, &cache).await.unwrap().unwrap();
        assert_eq!(token.expose_secret(), "fixed");
    }
}
