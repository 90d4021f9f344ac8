//! Cloud Storage JSON API client

use async_trait::async_trait;
use reqwest::{Body, Client};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, instrument};

use super::auth::TokenProvider;
use super::{status_error, ClientResult, DestinationStore};
use crate::error::ClientError;
use crate::pipeline::types::{BlobInfo, UploadedBlob};

/// Public Cloud Storage endpoint
pub const DEFAULT_STORAGE_ENDPOINT: &str = "https://storage.googleapis.com";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectResource {
    name: String,
    /// Decimal string in the JSON API
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    md5_hash: Option<String>,
}

impl ObjectResource {
    fn size(&self) -> u64 {
        self.size
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectResource>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Destination bucket access
pub struct GcsClient {
    client: Client,
    endpoint: String,
    tokens: Arc<dyn TokenProvider>,
}

impl GcsClient {
    pub fn new(client: Client, endpoint: Option<String>, tokens: Arc<dyn TokenProvider>) -> Self {
        let endpoint = endpoint
            .unwrap_or_else(|| DEFAULT_STORAGE_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string();
        Self {
            client,
            endpoint,
            tokens,
        }
    }

    fn objects_url(&self, bucket: &str) -> String {
        format!("{}/storage/v1/b/{}/o", self.endpoint, urlencoding::encode(bucket))
    }
}

#[async_trait]
impl DestinationStore for GcsClient {
    #[instrument(skip(self, local_file))]
    async fn upload(
        &self,
        bucket: &str,
        name: &str,
        local_file: &Path,
    ) -> ClientResult<UploadedBlob> {
        let file = tokio::fs::File::open(local_file).await?;
        let length = file.metadata().await?.len();

        debug!("Uploading {} bytes to gs://{}/{}", length, bucket, name);

        let url = format!(
            "{}/upload/storage/v1/b/{}/o",
            self.endpoint,
            urlencoding::encode(bucket)
        );
        let token = self.tokens.token().await?;

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .query(&[("uploadType", "media"), ("name", name)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .header(reqwest::header::CONTENT_LENGTH, length)
            .body(Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error("storage", response).await);
        }

        let object: ObjectResource = response
            .json()
            .await
            .map_err(|e| ClientError::decode(format!("upload response: {}", e)))?;

        info!("Successfully uploaded to gs://{}/{}", bucket, object.name);

        Ok(UploadedBlob {
            size: object.size(),
            name: object.name,
            md5_base64: object.md5_hash,
        })
    }

    #[instrument(skip(self))]
    async fn list_blobs(&self, bucket: &str, prefix: &str) -> ClientResult<Vec<BlobInfo>> {
        let url = self.objects_url(bucket);
        let mut blobs = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let token = self.tokens.token().await?;
            let mut request = self
                .client
                .get(&url)
                .bearer_auth(token)
                .query(&[("prefix", prefix), ("fields", "items(name,size),nextPageToken")]);

            if let Some(ref page) = page_token {
                request = request.query(&[("pageToken", page.as_str())]);
            }

            let response = request.send().await?;
            if !response.status().is_success() {
                return Err(status_error("storage", response).await);
            }

            let page: ObjectList = response
                .json()
                .await
                .map_err(|e| ClientError::decode(format!("object list: {}", e)))?;

            blobs.extend(page.items.iter().map(|item| BlobInfo {
                name: item.name.clone(),
                size: item.size(),
            }));

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        debug!("Listed {} blobs under gs://{}/{}", blobs.len(), bucket, prefix);
        Ok(blobs)
    }

    #[instrument(skip(self))]
    async fn rename_blob(&self, bucket: &str, old_name: &str, new_name: &str) -> ClientResult<()> {
        let url = format!(
            "{}/{}/moveTo/o/{}",
            self.objects_url(bucket),
            urlencoding::encode(old_name),
            urlencoding::encode(new_name)
        );
        let token = self.tokens.token().await?;

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_LENGTH, 0)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error("storage", response).await);
        }

        debug!("Moved gs://{}/{} to {}", bucket, old_name, new_name);
        Ok(())
    }
}
