//! Move of loaded files from staging to archive

use costpipe_common::object_path;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::clients::{ClientResult, DestinationStore};
use crate::error::{PipelineError, Result};
use crate::pipeline::types::BlobInfo;

/// Renames staged blobs into the archive prefix
pub struct ArchiveMover {
    store: Arc<dyn DestinationStore>,
    bucket: String,
}

impl ArchiveMover {
    pub fn new(store: Arc<dyn DestinationStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    async fn list(&self, prefix: &str) -> ClientResult<Vec<BlobInfo>> {
        self.store
            .list_blobs(&self.bucket, &object_path::folder(prefix))
            .await
    }

    /// Basenames of the blobs already under `archive_prefix`
    pub async fn archived_basenames(&self, archive_prefix: &str) -> Result<HashSet<String>> {
        Ok(self
            .list(archive_prefix)
            .await
            .map_err(|source| PipelineError::Listing {
                prefix: archive_prefix.to_string(),
                source,
            })?
            .into_iter()
            .filter(|b| !object_path::is_folder_marker(&b.name, b.size))
            .map(|b| object_path::basename(&b.name).to_string())
            .collect())
    }

    /// Move every blob under `source_prefix` to `destination_prefix/basename`.
    ///
    /// Each blob is attempted. Blobs that could not be moved are logged by name
    /// and reported in the returned error.
    #[instrument(skip(self))]
    pub async fn archive(&self, source_prefix: &str, destination_prefix: &str) -> Result<usize> {
        let blobs: Vec<BlobInfo> = self
            .list(source_prefix)
            .await
            .map_err(|e| PipelineError::Archive {
                reason: format!("listing '{}' failed: {}", source_prefix, e),
                unmoved: Vec::new(),
            })?
            .into_iter()
            .filter(|b| !object_path::is_folder_marker(&b.name, b.size))
            .collect();

        let mut moved = 0usize;
        let mut unmoved = Vec::new();

        for blob in blobs {
            let target = object_path::join(destination_prefix, object_path::basename(&blob.name));

            match self.store.rename_blob(&self.bucket, &blob.name, &target).await {
                Ok(()) => {
                    info!("Archived {} -> {}", blob.name, target);
                    moved += 1;
                },
                Err(e) => {
                    error!(object = %blob.name, error = %e, "Failed to archive, object is still staged");
                    unmoved.push(blob.name);
                },
            }
        }

        if !unmoved.is_empty() {
            return Err(PipelineError::archive_incomplete(unmoved));
        }

        info!("Archived {} object(s) from '{}' to '{}'", moved, source_prefix, destination_prefix);
        Ok(moved)
    }
}
