use jsonwebtoken::jwk::{Jwk, JwkSet};
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

/// JWKS for the keys that sign Firebase ID tokens.
pub const SECURETOKEN_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

const DEFAULT_MAX_AGE_SECS: u64 = 3600;

#[derive(Error, Debug)]
pub enum KeyFetchError {
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Key fetch failed with status {0}")]
    Status(reqwest::StatusCode),
    #[error("No public key found for kid {0}")]
    UnknownKid(String),
}

#[derive(Clone)]
struct CachedKeys {
    keys: JwkSet,
    expires_at: Instant,
}

/// Fetches and caches the public signing keys, honouring `Cache-Control: max-age`.
pub struct PublicKeyManager {
    client: Client,
    url: String,
    cache: Arc<RwLock<Option<CachedKeys>>>,
}

impl PublicKeyManager {
    pub fn new() -> Self {
        Self::with_url(SECURETOKEN_JWKS_URL.to_string())
    }

    pub fn with_url(url: String) -> Self {
        Self {
            client: Client::new(),
            url,
            cache: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn get_key(&self, kid: &str) -> Result<Jwk, KeyFetchError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = &*cache {
                if Instant::now() < cached.expires_at {
                    if let Some(key) = cached.keys.find(kid) {
                        return Ok(key.clone());
                    }
                }
            }
        }

        // Miss or stale: keys rotate, so refetch before giving up on the kid.
        self.refresh_keys().await?;

        let cache = self.cache.read().await;
        cache
            .as_ref()
            .and_then(|cached| cached.keys.find(kid).cloned())
            .ok_or_else(|| KeyFetchError::UnknownKid(kid.to_string()))
    }

    async fn refresh_keys(&self) -> Result<(), KeyFetchError> {
        let response = self.client.get(&self.url).send().await?;

        if !response.status().is_success() {
            return Err(KeyFetchError::Status(response.status()));
        }

        let max_age = response
            .headers()
            .get(reqwest::header::CACHE_CONTROL)
            .and_then(|h| h.to_str().ok())
            .and_then(parse_max_age)
            .unwrap_or(DEFAULT_MAX_AGE_SECS);

        let keys: JwkSet = response.json().await?;
        tracing::debug!(keys = keys.keys.len(), max_age, "refreshed token signing keys");

        let mut cache = self.cache.write().await;
        *cache = Some(CachedKeys {
            keys,
            expires_at: Instant::now() + Duration::from_secs(max_age),
        });

        Ok(())
    }
}

impl Default for PublicKeyManager {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn parse_max_age(cache_control: &str) -> Option<u64> {
    cache_control.split(',').find_map(|part| {
        part.trim()
            .strip_prefix("max-age=")
            .and_then(|v| v.parse::<u64>().ok())
    })
}
