//! Report bucket access through the S3 compatibility endpoint

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{BehaviorVersion, Credentials, Region},
    error::DisplayErrorContext,
    Client,
};
use chrono::{DateTime, Utc};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, instrument, warn};

use crate::clients::{ByteStream, ClientResult, ReportSource};
use crate::error::ClientError;
use crate::pipeline::types::RemoteObject;

/// Connection settings for an S3-compatible endpoint
#[derive(Debug, Clone)]
pub struct S3CompatConfig {
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
}

impl S3CompatConfig {
    /// Compatibility endpoint of a namespace in a region
    pub fn endpoint_for(namespace: &str, region: &str) -> String {
        format!("https://{}.compat.objectstorage.{}.oraclecloud.com", namespace, region)
    }
}

/// [`ReportSource`] backed by the S3 API. The namespace is part of the endpoint,
/// so the `namespace` argument of the trait methods is only logged.
pub struct S3CompatSource {
    client: Client,
}

impl S3CompatSource {
    pub fn new(config: S3CompatConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "costpipe-profile",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .endpoint_url(&config.endpoint)
            .force_path_style(config.path_style)
            .build();

        info!("S3 compatibility client initialized for {}", config.endpoint);

        Self {
            client: Client::from_conf(s3_config),
        }
    }

    /// Wrap an existing SDK client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn sdk_error<E>(err: E) -> ClientError
where
    E: std::error::Error,
{
    ClientError::sdk(DisplayErrorContext(&err).to_string())
}

#[async_trait]
impl ReportSource for S3CompatSource {
    #[instrument(skip(self))]
    async fn list(
        &self,
        namespace: &str,
        bucket: &str,
        prefix: &str,
    ) -> ClientResult<Vec<RemoteObject>> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(sdk_error)?;

            for object in response.contents() {
                let Some(name) = object.key() else {
                    continue;
                };

                let created_at = object
                    .last_modified()
                    .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()));

                match created_at {
                    Some(created_at) => objects.push(RemoteObject {
                        name: name.to_string(),
                        created_at,
                        size: object.size().and_then(|s| u64::try_from(s).ok()),
                    }),
                    None => warn!(object = name, "Listed object has no timestamp, ignoring"),
                }
            }

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                },
                _ => break,
            }
        }

        debug!("Listed {} objects in s3://{}/{}", objects.len(), bucket, prefix);
        Ok(objects)
    }

    #[instrument(skip(self))]
    async fn get(&self, namespace: &str, bucket: &str, name: &str) -> ClientResult<ByteStream> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(name)
            .send()
            .await
            .map_err(sdk_error)?;

        Ok(Box::pin(ReaderStream::new(response.body.into_async_read())))
    }
}
