//! Source object storage adapters
//!
//! [`OciConnector`] turns a materialized credential profile into a
//! [`ReportSource`]: the signed native client by default, or the S3
//! compatibility client, which reads its access key pair from the
//! `s3_access_key_id` and `s3_secret_access_key` profile entries.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use tracing::info;

use crate::clients::{ClientResult, ReportSource, ReportSourceConnector};
use crate::config::{SourceBackend, SourceConfig};
use crate::error::ClientError;
use crate::pipeline::profile::{ProfileSection, KEY_FILE_ENTRY};

pub mod native;
pub mod s3_compat;
pub mod signer;

pub use native::NativeObjectStorage;
pub use s3_compat::{S3CompatConfig, S3CompatSource};
pub use signer::RequestSigner;

/// Profile entry holding the S3 access key id
pub const S3_ACCESS_KEY_ENTRY: &str = "s3_access_key_id";

/// Profile entry holding the S3 secret key
pub const S3_SECRET_KEY_ENTRY: &str = "s3_secret_access_key";

fn required<'a>(profile: &'a ProfileSection, key: &str) -> ClientResult<&'a str> {
    profile.get(key).ok_or_else(|| {
        ClientError::auth(format!("profile [{}] has no '{}' entry", profile.name(), key))
    })
}

/// Connects to the report bucket with the configured backend
pub struct OciConnector {
    client: Client,
    backend: SourceBackend,
    namespace: String,
    endpoint: Option<String>,
}

impl OciConnector {
    pub fn new(client: Client, source: &SourceConfig) -> Self {
        Self {
            client,
            backend: source.backend,
            namespace: source.namespace.clone(),
            endpoint: source.endpoint.clone(),
        }
    }

    async fn connect_native(&self, profile: &ProfileSection) -> ClientResult<Arc<dyn ReportSource>> {
        let tenancy = required(profile, "tenancy")?;
        let user = required(profile, "user")?;
        let fingerprint = required(profile, "fingerprint")?;
        let region = required(profile, "region")?;
        let key_file = required(profile, KEY_FILE_ENTRY)?;

        let pem = tokio::fs::read(key_file).await?;
        let signer = RequestSigner::new(tenancy, user, fingerprint, &pem)?;

        let endpoint = self
            .endpoint
            .clone()
            .unwrap_or_else(|| NativeObjectStorage::endpoint_for_region(region));

        info!(endpoint = %endpoint, key_id = signer.key_id(), "Object Storage client initialized");

        Ok(Arc::new(NativeObjectStorage::new(
            self.client.clone(),
            &endpoint,
            signer,
        )?))
    }

    fn connect_s3(&self, profile: &ProfileSection) -> ClientResult<Arc<dyn ReportSource>> {
        let region = required(profile, "region")?;
        let config = S3CompatConfig {
            endpoint: self
                .endpoint
                .clone()
                .unwrap_or_else(|| S3CompatConfig::endpoint_for(&self.namespace, region)),
            region: region.to_string(),
            access_key: required(profile, S3_ACCESS_KEY_ENTRY)?.to_string(),
            secret_key: required(profile, S3_SECRET_KEY_ENTRY)?.to_string(),
            path_style: true,
        };

        Ok(Arc::new(S3CompatSource::new(config)))
    }
}

#[async_trait]
impl ReportSourceConnector for OciConnector {
    async fn connect(&self, profile: &ProfileSection) -> ClientResult<Arc<dyn ReportSource>> {
        match self.backend {
            SourceBackend::Native => self.connect_native(profile).await,
            SourceBackend::S3Compat => self.connect_s3(profile),
        }
    }
}
