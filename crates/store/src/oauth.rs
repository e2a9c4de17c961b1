//! OAuth2 bearer tokens for the HTTP backends.

use std::future::Future;
use std::time::{Duration, Instant};

use reqwest::RequestBuilder;
use secrecy::Secret;
use serde::{Deserialize, Deserializer};
use tokio::sync::Mutex;

use rotate_core::{Error, Result};

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Lifetime assumed when the endpoint does not report one.
const DEFAULT_LIFETIME: Duration = Duration::from_secs(3600);

/// Token endpoint response shared by Google and Microsoft identity platforms.
#[derive(Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: Secret<String>,
    #[serde(default, deserialize_with = "seconds")]
    pub expires_in: Option<u64>,
}

/// Managed identity endpoints report `expires_in` as a string.
fn seconds<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u64),
        Text(String),
    }

    Ok(match Option::<Seconds>::deserialize(deserializer)? {
        Some(Seconds::Number(n)) => Some(n),
        Some(Seconds::Text(s)) => s.parse().ok(),
        None => None,
    })
}

/// Send a token request and decode the response.
pub(crate) async fn request_token(request: RequestBuilder, issuer: &str) -> Result<TokenResponse> {
    let response = request
        .send()
        .await
        .map_err(|e| Error::storage(format!("{} token request failed: {}", issuer, e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::storage(format!(
            "{} token request failed: {} {}",
            issuer, status, body
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::storage(format!("{} token response: {}", issuer, e)))
}

struct CachedToken {
    value: Secret<String>,
    refresh_at: Instant,
}

/// Holds the last token until it is close to expiry.
#[derive(Default)]
pub(crate) struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    /// Return the cached token, or call `fetch` for a new one.
    ///
    /// The lock is held across the fetch so concurrent deletes share a
    /// single refresh.
    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> Result<Secret<String>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TokenResponse>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref().filter(|c| Instant::now() < c.refresh_at) {
            return Ok(cached.value.clone());
        }

        let response = fetch().await?;
        let lifetime = response
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_LIFETIME);
        *slot = Some(CachedToken {
            value: response.access_token.clone(),
            refresh_at: Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN),
        });

        Ok(response.access_token)
    }
}
