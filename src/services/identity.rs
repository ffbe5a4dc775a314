//! Third-party identity verification
//!
//! Google sign-in hands the browser an RS256 ID token. Before trusting it we
//! check the signature against Google's published keys, the audience (our
//! client id) and the issuer. Signing keys are fetched over HTTPS and kept
//! in a moka cache keyed by `kid`.

use anyhow::Context;
use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use moka::future::Cache;
use serde::Deserialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

/// Google's JWKS endpoint
pub const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";

/// Issuers Google uses for ID tokens
pub const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

const KEY_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimum spacing between two key fetches triggered by unknown key ids
pub const MIN_KEY_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// What a verified assertion tells us about the person signing in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityClaims {
    /// Stable subject id at the provider
    pub subject: String,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    /// The assertion failed verification
    #[error("Identity assertion rejected: {0}")]
    Rejected(String),
    /// Third-party login has no client id configured
    #[error("Third-party login is not configured")]
    NotConfigured,
    /// The provider's keys could not be retrieved
    #[error(transparent)]
    KeyFetch(#[from] anyhow::Error),
}

/// Verifies identity provider assertions
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, assertion: &str) -> Result<IdentityClaims, IdentityError>;
}

#[derive(Debug, Deserialize)]
struct GoogleIdTokenClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Verifies Google ID tokens against Google's JWKS
pub struct GoogleIdentityVerifier {
    client_id: String,
    jwks_url: String,
    http: reqwest::Client,
    keys: Cache<String, DecodingKey>,
    /// When keys were last fetched; held across the fetch so only one runs
    last_refresh: Mutex<Option<Instant>>,
    refresh_interval: Duration,
}

impl GoogleIdentityVerifier {
    /// Create a verifier for `client_id`, caching keys for `cache_ttl`
    pub fn new(client_id: impl Into<String>, cache_ttl: Duration) -> anyhow::Result<Self> {
        Self::with_jwks_url(client_id, GOOGLE_JWKS_URL, cache_ttl)
    }

    /// Same as `new` but fetching keys from `jwks_url`
    pub fn with_jwks_url(
        client_id: impl Into<String>,
        jwks_url: impl Into<String>,
        cache_ttl: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(KEY_FETCH_TIMEOUT)
            .build()
            .context("Failed to build HTTP client for key fetching")?;

        let keys = Cache::builder()
            .max_capacity(64)
            .time_to_live(cache_ttl)
            .build();

        Ok(Self {
            client_id: client_id.into(),
            jwks_url: jwks_url.into(),
            http,
            keys,
            last_refresh: Mutex::new(None),
            refresh_interval: MIN_KEY_REFRESH_INTERVAL,
        })
    }

    /// Change how often unknown key ids may trigger a fetch
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Load every usable key of a JWKS document into the cache.
    ///
    /// Returns how many keys were cached.
    pub async fn insert_jwks(&self, jwks: &JwkSet) -> usize {
        let mut count = 0;
        for jwk in &jwks.keys {
            let Some(kid) = jwk.common.key_id.clone() else {
                continue;
            };
            match DecodingKey::from_jwk(jwk) {
                Ok(key) => {
                    self.keys.insert(kid, key).await;
                    count += 1;
                }
                Err(e) => tracing::warn!("Skipping unusable signing key {}: {}", kid, e),
            }
        }
        count
    }

    async fn refresh_keys(&self) -> anyhow::Result<()> {
        tracing::debug!("Fetching identity provider keys from {}", self.jwks_url);

        let jwks: JwkSet = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .context("Failed to fetch identity provider keys")?
            .error_for_status()
            .context("Identity provider key endpoint returned an error")?
            .json()
            .await
            .context("Failed to parse identity provider keys")?;

        let count = self.insert_jwks(&jwks).await;
        tracing::debug!("Cached {} identity provider key(s)", count);
        Ok(())
    }

    async fn key_for(&self, kid: &str) -> Result<DecodingKey, IdentityError> {
        if let Some(key) = self.keys.get(kid).await {
            return Ok(key);
        }

        let unknown = || IdentityError::Rejected(format!("unknown signing key {}", kid));

        // Unknown kid: Google may have rotated keys since the last fetch.
        // Forged key ids must not turn every request into an outbound fetch.
        let mut last_refresh = self.last_refresh.lock().await;
        if let Some(key) = self.keys.get(kid).await {
            return Ok(key);
        }
        if last_refresh.is_some_and(|at| at.elapsed() < self.refresh_interval) {
            tracing::debug!("Key {} unknown; refresh throttled", kid);
            return Err(unknown());
        }
        *last_refresh = Some(Instant::now());
        self.refresh_keys().await?;
        drop(last_refresh);

        self.keys.get(kid).await.ok_or_else(unknown)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.client_id.as_str()]);
        validation.set_issuer(&GOOGLE_ISSUERS[..]);
        validation.set_required_spec_claims(&["exp", "sub", "aud", "iss"]);
        validation
    }
}

#[async_trait]
impl IdentityVerifier for GoogleIdentityVerifier {
    async fn verify(&self, assertion: &str) -> Result<IdentityClaims, IdentityError> {
        if self.client_id.is_empty() {
            return Err(IdentityError::NotConfigured);
        }

        let header = decode_header(assertion)
            .map_err(|e| IdentityError::Rejected(format!("malformed token: {}", e)))?;
        if header.alg != Algorithm::RS256 {
            return Err(IdentityError::Rejected(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| IdentityError::Rejected("token has no key id".into()))?;

        let key = self.key_for(&kid).await?;
        let claims = decode::<GoogleIdTokenClaims>(assertion, &key, &self.validation())
            .map_err(|e| IdentityError::Rejected(e.to_string()))?
            .claims;

        let email = claims
            .email
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| IdentityError::Rejected("token carries no email".into()))?;
        let name = claims
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| email.split('@').next().unwrap_or(&email).to_string());

        Ok(IdentityClaims {
            subject: claims.sub,
            email,
            name,
        })
    }
}
