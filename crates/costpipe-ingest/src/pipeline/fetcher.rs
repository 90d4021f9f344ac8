//! Report download and decompression
//!
//! Bodies are streamed to disk through a fixed-size buffer so memory stays
//! bounded by the chunk size. Gzip files are then decompressed on the blocking
//! pool and the compressed copy removed.

use costpipe_common::object_path;
use flate2::read::MultiGzDecoder;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;
use tracing::{debug, info, instrument, warn};

use crate::clients::ReportSource;
use crate::error::{PipelineError, Result};
use crate::pipeline::types::{FetchedReport, RemoteObject};

/// Suffix of compressed reports
pub const COMPRESSED_SUFFIX: &str = ".gz";

/// Read/write chunk size for downloads (1 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Decompress a gzip file (all members) into `destination`, returning the
/// decompressed size.
pub fn decompress_gzip(source: &Path, destination: &Path) -> std::io::Result<u64> {
    let input = std::fs::File::open(source)?;
    let mut decoder = MultiGzDecoder::new(BufReader::new(input));
    let mut output = BufWriter::new(std::fs::File::create(destination)?);

    let written = std::io::copy(&mut decoder, &mut output)?;
    std::io::Write::flush(&mut output)?;
    Ok(written)
}

/// Name of the decompressed file for a downloaded file name
pub fn decompressed_name(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(COMPRESSED_SUFFIX)
        .filter(|name| !name.is_empty())
}

/// Streams source reports to local files
pub struct ReportFetcher {
    source: Arc<dyn ReportSource>,
    namespace: String,
    bucket: String,
    download_dir: PathBuf,
    decompress_dir: PathBuf,
    chunk_size: usize,
}

impl ReportFetcher {
    pub fn new(
        source: Arc<dyn ReportSource>,
        namespace: impl Into<String>,
        bucket: impl Into<String>,
        download_dir: impl Into<PathBuf>,
        decompress_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            namespace: namespace.into(),
            bucket: bucket.into(),
            download_dir: download_dir.into(),
            decompress_dir: decompress_dir.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Download one report and decompress it when needed.
    ///
    /// Returns the path of the file to stage. Errors are `Download` or
    /// `Decompress` and concern this object only.
    #[instrument(skip(self, object), fields(object = %object.name))]
    pub async fn fetch(&self, object: &RemoteObject) -> Result<FetchedReport> {
        let file_name = object_path::basename(&object.name);
        if file_name.is_empty() {
            return Err(PipelineError::download(&object.name, "object name has no file name"));
        }

        tokio::fs::create_dir_all(&self.download_dir).await?;
        let download_path = self.download_dir.join(file_name);

        let downloaded_bytes = match self.download(object, &download_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tokio::fs::remove_file(&download_path).await;
                return Err(e);
            },
        };

        info!(
            "Downloaded {} ({:.2} MiB)",
            object.name,
            downloaded_bytes as f64 / BYTES_PER_MIB
        );

        let Some(plain_name) = decompressed_name(file_name) else {
            debug!("Not compressed, passing through {}", download_path.display());
            return Ok(FetchedReport {
                object: object.name.clone(),
                local_path: download_path,
                downloaded_bytes,
            });
        };

        tokio::fs::create_dir_all(&self.decompress_dir).await?;
        let decompressed_path = self.decompress_dir.join(plain_name);

        let source = download_path.clone();
        let destination = decompressed_path.clone();
        let result = tokio::task::spawn_blocking(move || decompress_gzip(&source, &destination))
            .await
            .map_err(|e| std::io::Error::other(format!("decompression task failed: {}", e)))
            .and_then(|r| r);

        match result {
            Ok(bytes) => {
                info!("Decompressed to {} ({} bytes)", decompressed_path.display(), bytes);
                if let Err(e) = tokio::fs::remove_file(&download_path).await {
                    warn!(error = %e, path = %download_path.display(), "Failed to remove compressed file");
                }
                Ok(FetchedReport {
                    object: object.name.clone(),
                    local_path: decompressed_path,
                    downloaded_bytes,
                })
            },
            Err(source) => {
                let _ = tokio::fs::remove_file(&decompressed_path).await;
                Err(PipelineError::Decompress {
                    path: download_path,
                    source,
                })
            },
        }
    }

    async fn download(&self, object: &RemoteObject, path: &Path) -> Result<u64> {
        let body = self
            .source
            .get(&self.namespace, &self.bucket, &object.name)
            .await
            .map_err(|e| PipelineError::download(&object.name, e))?;

        let mut reader = tokio::io::BufReader::with_capacity(
            self.chunk_size,
            StreamReader::new(body),
        );

        let file = tokio::fs::File::create(path).await?;
        let mut writer = tokio::io::BufWriter::with_capacity(self.chunk_size, file);

        let bytes = tokio::io::copy_buf(&mut reader, &mut writer)
            .await
            .map_err(|e| PipelineError::download(&object.name, e))?;
        writer.flush().await?;

        Ok(bytes)
    }
}
