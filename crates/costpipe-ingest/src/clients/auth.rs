//! Bearer tokens for Google APIs

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::{status_error, ClientResult};
use crate::config::AuthConfig;
use crate::error::ClientError;

/// Tokens are refreshed this long before they expire.
pub const TOKEN_REFRESH_MARGIN_SECS: u64 = 60;

const METADATA_TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

/// Source of OAuth2 access tokens
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> ClientResult<String>;
}

/// Fixed token supplied through configuration
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> ClientResult<String> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Token of the default service account from the compute metadata server
pub struct MetadataTokenProvider {
    client: Client,
    endpoint: String,
    cached: Mutex<Option<CachedToken>>,
}

impl MetadataTokenProvider {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            cached: Mutex::new(None),
        }
    }

    #[instrument(skip(self))]
    async fn request_token(&self) -> ClientResult<MetadataToken> {
        let url = format!("{}{}", self.endpoint, METADATA_TOKEN_PATH);
        debug!("Requesting access token from metadata server");

        let response = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| ClientError::auth(format!("metadata server unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(ClientError::auth(
                status_error("metadata", response).await.to_string(),
            ));
        }

        response
            .json::<MetadataToken>()
            .await
            .map_err(|e| ClientError::decode(format!("metadata token: {}", e)))
    }
}

#[async_trait]
impl TokenProvider for MetadataTokenProvider {
    async fn token(&self) -> ClientResult<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.request_token().await?;
        let lifetime = fresh.expires_in.saturating_sub(TOKEN_REFRESH_MARGIN_SECS);
        let value = fresh.access_token;

        *cached = Some(CachedToken {
            value: value.clone(),
            refresh_at: Instant::now() + Duration::from_secs(lifetime),
        });

        Ok(value)
    }
}

/// Token provider selected by configuration
pub fn token_provider(config: &AuthConfig, client: Client) -> Arc<dyn TokenProvider> {
    match &config.access_token {
        Some(token) => Arc::new(StaticTokenProvider::new(token.clone())),
        None => Arc::new(MetadataTokenProvider::new(client, &config.metadata_endpoint)),
    }
}
