//! Secret Manager REST client

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::auth::TokenProvider;
use super::{status_error, ClientResult, SecretStore};
use crate::error::ClientError;

/// Public Secret Manager endpoint
pub const DEFAULT_SECRET_MANAGER_ENDPOINT: &str = "https://secretmanager.googleapis.com";

#[derive(Debug, Deserialize)]
struct AccessResponse {
    payload: SecretPayload,
}

#[derive(Debug, Deserialize)]
struct SecretPayload {
    data: String,
}

/// Reads secret versions through `versions/{v}:access`
pub struct SecretManagerClient {
    client: Client,
    endpoint: String,
    tokens: Arc<dyn TokenProvider>,
}

impl SecretManagerClient {
    pub fn new(client: Client, endpoint: Option<String>, tokens: Arc<dyn TokenProvider>) -> Self {
        let endpoint = endpoint
            .unwrap_or_else(|| DEFAULT_SECRET_MANAGER_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string();
        Self {
            client,
            endpoint,
            tokens,
        }
    }

    fn access_url(&self, project: &str, secret_id: &str, version: &str) -> String {
        format!(
            "{}/v1/projects/{}/secrets/{}/versions/{}:access",
            self.endpoint,
            urlencoding::encode(project),
            urlencoding::encode(secret_id),
            urlencoding::encode(version)
        )
    }
}

#[async_trait]
impl SecretStore for SecretManagerClient {
    #[instrument(skip(self))]
    async fn fetch(&self, project: &str, secret_id: &str, version: &str) -> ClientResult<String> {
        let url = self.access_url(project, secret_id, version);
        debug!("Accessing secret version");

        let token = self.tokens.token().await?;
        let response = self.client.get(&url).bearer_auth(token).send().await?;

        if !response.status().is_success() {
            return Err(status_error("secretmanager", response).await);
        }

        let body: AccessResponse = response
            .json()
            .await
            .map_err(|e| ClientError::decode(format!("secret payload: {}", e)))?;

        let raw = STANDARD
            .decode(body.payload.data.trim())
            .map_err(|e| ClientError::decode(format!("secret payload is not base64: {}", e)))?;

        let text = String::from_utf8(raw)
            .map_err(|e| ClientError::decode(format!("secret payload is not UTF-8: {}", e)))?;

        info!(secret = secret_id, "Retrieved secret payload");
        Ok(text)
    }
}
