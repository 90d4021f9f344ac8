//! Upload of decompressed reports to the staging prefix

use costpipe_common::checksum::verify_file_md5_base64;
use costpipe_common::{object_path, CommonError};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::clients::DestinationStore;
use crate::error::{PipelineError, Result};
use crate::pipeline::types::UploadedBlob;

/// Publishes local files into `<bucket>/<prefix>/`
pub struct StagingPublisher {
    store: Arc<dyn DestinationStore>,
    bucket: String,
    prefix: String,
}

impl StagingPublisher {
    pub fn new(
        store: Arc<dyn DestinationStore>,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    /// Destination object name for a local file: `prefix/basename`
    pub fn staged_name(&self, local_path: &Path) -> Result<String> {
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                PipelineError::upload(
                    local_path.display().to_string(),
                    "local path has no UTF-8 file name",
                )
            })?;
        Ok(object_path::join(&self.prefix, file_name))
    }

    /// Upload one file. Counts as staged only when the store confirms the
    /// upload and, if it reports a digest, the digest matches the local file.
    #[instrument(skip(self))]
    pub async fn publish(&self, local_path: &Path) -> Result<UploadedBlob> {
        let name = self.staged_name(local_path)?;

        let uploaded = self
            .store
            .upload(&self.bucket, &name, local_path)
            .await
            .map_err(|e| PipelineError::upload(&name, e))?;

        match uploaded.md5_base64.as_deref() {
            Some(md5) => {
                let path = local_path.to_path_buf();
                let md5 = md5.to_string();
                let verified = tokio::task::spawn_blocking(move || {
                    verify_file_md5_base64(&path, &md5)
                })
                .await
                .map_err(|e| PipelineError::upload(&name, e))?;

                match verified {
                    Ok(_) => {},
                    Err(CommonError::ChecksumMismatch { expected, actual }) => {
                        return Err(PipelineError::upload(
                            &name,
                            format!("MD5 mismatch: store reported {}, local file is {}", expected, actual),
                        ));
                    },
                    Err(e) => return Err(PipelineError::upload(&name, e)),
                }
            },
            None => warn!(object = %name, "Store reported no MD5 digest, upload not verified"),
        }

        info!(
            "Staged gs://{}/{} ({} bytes)",
            self.bucket, uploaded.name, uploaded.size
        );
        Ok(uploaded)
    }
}
