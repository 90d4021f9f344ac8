//! Native Object Storage REST client with signed requests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use super::signer::RequestSigner;
use crate::clients::{status_error, ByteStream, ClientResult, ReportSource};
use crate::error::ClientError;
use crate::pipeline::types::RemoteObject;

/// Fields requested for every listed object
pub const LIST_FIELDS: &str = "name,timeCreated,size";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectSummary {
    name: String,
    #[serde(default)]
    time_created: Option<DateTime<Utc>>,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListObjects {
    #[serde(default)]
    objects: Vec<ObjectSummary>,
    #[serde(default)]
    next_start_with: Option<String>,
}

/// Report bucket access through the native API
pub struct NativeObjectStorage {
    client: Client,
    endpoint: Url,
    signer: RequestSigner,
}

impl NativeObjectStorage {
    pub fn new(client: Client, endpoint: &str, signer: RequestSigner) -> ClientResult<Self> {
        let endpoint = Url::parse(endpoint.trim_end_matches('/'))
            .map_err(|e| ClientError::decode(format!("invalid endpoint '{}': {}", endpoint, e)))?;

        Ok(Self {
            client,
            endpoint,
            signer,
        })
    }

    /// Public endpoint of a region
    pub fn endpoint_for_region(region: &str) -> String {
        format!("https://objectstorage.{}.oraclecloud.com", region)
    }

    fn url(&self, segments: &[&str]) -> ClientResult<Url> {
        let path: String = segments
            .iter()
            .map(|s| format!("/{}", urlencoding::encode(s)))
            .collect();

        self.endpoint
            .join(&path)
            .map_err(|e| ClientError::decode(format!("invalid object URL: {}", e)))
    }

    /// Send a signed GET request for `url`
    async fn signed_get(&self, url: Url) -> ClientResult<Response> {
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(ClientError::decode(format!("URL without host: {}", url))),
        };

        let target = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };

        let date = RequestSigner::http_date(Utc::now());
        let authorization = self.signer.authorization("get", &target, &host, &date)?;

        let response = self
            .client
            .get(url)
            .header("date", &date)
            .header("authorization", authorization)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error("objectstorage", response).await);
        }

        Ok(response)
    }
}

#[async_trait]
impl ReportSource for NativeObjectStorage {
    #[instrument(skip(self))]
    async fn list(
        &self,
        namespace: &str,
        bucket: &str,
        prefix: &str,
    ) -> ClientResult<Vec<RemoteObject>> {
        let base = self.url(&["n", namespace, "b", bucket, "o"])?;
        let mut objects = Vec::new();
        let mut start: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let mut url = base.clone();
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("prefix", prefix);
                query.append_pair("fields", LIST_FIELDS);
                if let Some(ref start) = start {
                    query.append_pair("start", start);
                }
            }

            let page: ListObjects = self
                .signed_get(url)
                .await?
                .json()
                .await
                .map_err(|e| ClientError::decode(format!("object list: {}", e)))?;
            pages += 1;

            for summary in page.objects {
                match summary.time_created {
                    Some(created_at) => objects.push(RemoteObject {
                        name: summary.name,
                        created_at,
                        size: summary.size,
                    }),
                    None => warn!(object = %summary.name, "Listed object has no creation time, ignoring"),
                }
            }

            match page.next_start_with {
                Some(next) if !next.is_empty() => start = Some(next),
                _ => break,
            }
        }

        debug!("Listed {} objects in {} page(s)", objects.len(), pages);
        Ok(objects)
    }

    #[instrument(skip(self))]
    async fn get(&self, namespace: &str, bucket: &str, name: &str) -> ClientResult<ByteStream> {
        let url = self.url(&["n", namespace, "b", bucket, "o", name])?;
        let response = self.signed_get(url).await?;

        Ok(Box::pin(response.bytes_stream().map_err(std::io::Error::other)))
    }
}
