//! Pipeline orchestration
//!
//! ```text
//! Init -> CredentialsReady -> Fetched -> Staged(n) -> Loaded -> Archived -> CleanedUp(Success)
//!                                            \-> Skipped (n = 0) ---------> CleanedUp(Success)
//! any stage error ----------------------------------------------------> CleanedUp(Failure)
//! ```
//!
//! Credential, listing, load and archive errors end the run. Download,
//! decompression and upload errors only drop the affected report. Cleanup runs
//! on every path and only ever produces warnings.

use chrono::NaiveDate;
use costpipe_common::logging::RunLogFile;
use costpipe_common::object_path;
use costpipe_common::types::RunOutcome;
use futures::{stream, StreamExt};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::clients::auth::token_provider;
use crate::clients::bigquery::BigQueryClient;
use crate::clients::gcs::GcsClient;
use crate::clients::oci::OciConnector;
use crate::clients::secret_manager::SecretManagerClient;
use crate::clients::{
    http_client, ClientResult, DestinationStore, ReportSourceConnector, SecretStore, Warehouse,
};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::pipeline::archive::ArchiveMover;
use crate::pipeline::catalog::RemoteReportCatalog;
use crate::pipeline::credentials::{purge_credential_files, CredentialBundle, CredentialMaterializer};
use crate::pipeline::fetcher::{decompressed_name, ReportFetcher};
use crate::pipeline::staging::StagingPublisher;
use crate::pipeline::types::{CleanupWarning, RemoteObject, RunReport, RunState};
use crate::pipeline::warehouse::WarehouseLoader;

/// External services used by a run
#[derive(Clone)]
pub struct Collaborators {
    pub secrets: Arc<dyn SecretStore>,
    pub source: Arc<dyn ReportSourceConnector>,
    pub destination: Arc<dyn DestinationStore>,
    pub warehouse: Arc<dyn Warehouse>,
}

impl Collaborators {
    /// Production adapters for the configured endpoints
    pub fn from_config(config: &PipelineConfig) -> ClientResult<Self> {
        let http = http_client()?;
        let tokens = token_provider(&config.auth, http.clone());

        Ok(Self {
            secrets: Arc::new(SecretManagerClient::new(
                http.clone(),
                config.secrets.endpoint.clone(),
                tokens.clone(),
            )),
            source: Arc::new(OciConnector::new(http.clone(), &config.source)),
            destination: Arc::new(GcsClient::new(
                http.clone(),
                config.destination.endpoint.clone(),
                tokens.clone(),
            )),
            warehouse: Arc::new(BigQueryClient::new(
                http,
                config.warehouse.endpoint.clone(),
                tokens,
            )),
        })
    }
}

/// Outcome of fetching and staging one report
enum ObjectOutcome {
    Staged,
    FetchFailed,
    UploadFailed,
}

/// Basename a report will have once staged
fn staged_basename(object_name: &str) -> &str {
    let file_name = object_path::basename(object_name);
    decompressed_name(file_name).unwrap_or(file_name)
}

fn advance(report: &mut RunReport, next: RunState) {
    let current = report.state();
    if !current.can_transition_to(next) {
        warn!("Unexpected state transition {} -> {}", current, next);
    }
    info!(state = %next, "Pipeline state changed");
    report.states.push(next);
}

fn remove_dir_if_present(path: &Path) -> std::result::Result<(), CleanupWarning> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {
            info!("Removed local directory {}", path.display());
            Ok(())
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CleanupWarning::new(
            format!("remove directory {}", path.display()),
            e,
        )),
    }
}

/// Runs the ingestion pipeline for one target date
pub struct PipelineRunner {
    config: PipelineConfig,
    collaborators: Collaborators,
    target_date: NaiveDate,
    run_id: Uuid,
    run_log: Option<RunLogFile>,
}

impl PipelineRunner {
    pub fn new(config: PipelineConfig, collaborators: Collaborators, target_date: NaiveDate) -> Self {
        Self {
            config,
            collaborators,
            target_date,
            run_id: Uuid::new_v4(),
            run_log: None,
        }
    }

    /// Runner with production adapters.
    ///
    /// `target_date` is resolved once by the caller (see
    /// [`crate::config::RunConfig::resolve_target_date`]) so the run log and the
    /// processed reports always agree on the day.
    pub fn from_config(config: &PipelineConfig, target_date: NaiveDate) -> Result<Self> {
        let collaborators = Collaborators::from_config(config)
            .map_err(|e| PipelineError::config(format!("cannot build clients: {}", e)))?;

        Ok(Self::new(config.clone(), collaborators, target_date))
    }

    /// Upload this local log file at the end of the run
    pub fn with_run_log(mut self, run_log: RunLogFile) -> Self {
        self.run_log = Some(run_log);
        self
    }

    pub fn target_date(&self) -> NaiveDate {
        self.target_date
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Execute the run. Never fails: the outcome is in the returned report.
    pub async fn run(&self) -> RunReport {
        let span = info_span!("pipeline_run", run_id = %self.run_id, target_date = %self.target_date);

        async {
            info!(
                dest_bucket = %self.config.destination.bucket,
                table = %format!("{}.{}.{}", self.config.warehouse.project, self.config.warehouse.dataset, self.config.warehouse.table),
                "Starting pipeline run"
            );

            let mut report = RunReport::new(self.run_id, self.target_date);
            let mut credentials: Option<CredentialBundle> = None;

            let outcome = match self.execute(&mut report, &mut credentials).await {
                Ok(()) => RunOutcome::Success,
                Err(e) => {
                    error!(stage = e.stage(), error = %e, "Pipeline run failed");
                    report.error = Some(format!("{}: {}", e.stage(), e));
                    RunOutcome::Failure
                },
            };

            self.cleanup(&mut report, credentials, outcome).await;
            report
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        report: &mut RunReport,
        credentials: &mut Option<CredentialBundle>,
    ) -> Result<()> {
        let config = &self.config;

        // Credentials
        let materializer = CredentialMaterializer::new(
            self.collaborators.secrets.clone(),
            config.secrets.clone(),
            &config.source.profile_name,
            &config.run.credentials_dir,
        );
        let bundle = credentials.insert(materializer.materialize().await?);
        advance(report, RunState::CredentialsReady);

        let source = self
            .collaborators
            .source
            .connect(bundle.profile())
            .await
            .map_err(|source| PipelineError::Listing {
                prefix: config.source.prefix.clone(),
                source,
            })?;

        let bucket = match &config.source.bucket {
            Some(bucket) => bucket.clone(),
            None => bundle.profile().require("tenancy")?.to_string(),
        };
        info!(
            namespace = %config.source.namespace,
            bucket = %bucket,
            prefix = %config.source.prefix,
            "Listing source reports"
        );

        // Catalog
        let catalog = RemoteReportCatalog::new(
            source.clone(),
            &config.source.namespace,
            &bucket,
            &config.source.prefix,
        );
        let matched = catalog.reports_for(self.target_date).await?;
        report.found = matched.len();

        let mover = ArchiveMover::new(
            self.collaborators.destination.clone(),
            &config.destination.bucket,
        );
        let archived = mover
            .archived_basenames(&config.destination.archive_prefix)
            .await?;
        let pending = self.exclude_archived(matched, &archived, report);

        // Fetch and stage
        let fetcher = ReportFetcher::new(
            source,
            &config.source.namespace,
            &bucket,
            config.run.download_dir(),
            config.run.decompress_dir(),
        );
        let publisher = StagingPublisher::new(
            self.collaborators.destination.clone(),
            &config.destination.bucket,
            &config.destination.staging_prefix,
        );

        let outcomes: Vec<ObjectOutcome> = stream::iter(pending.iter())
            .map(|object| Self::fetch_and_stage(object, &fetcher, &publisher))
            .buffer_unordered(config.run.fetch_concurrency.max(1))
            .collect()
            .await;

        for outcome in &outcomes {
            match outcome {
                ObjectOutcome::Staged => {
                    report.fetched += 1;
                    report.staged += 1;
                },
                ObjectOutcome::UploadFailed => {
                    report.fetched += 1;
                    report.failed += 1;
                },
                ObjectOutcome::FetchFailed => report.failed += 1,
            }
        }

        let staged = report.staged;
        advance(report, RunState::Fetched);
        advance(report, RunState::Staged(staged));

        if staged == 0 {
            info!("No new files staged for {}, skipping load and archive", self.target_date);
            advance(report, RunState::Skipped);
            return Ok(());
        }

        // Load
        let loader = WarehouseLoader::new(
            self.collaborators.warehouse.clone(),
            config.warehouse.clone(),
        );
        let source_uri = format!(
            "gs://{}/{}*",
            config.destination.bucket,
            object_path::folder(&config.destination.staging_prefix)
        );
        report.load = Some(loader.load(&source_uri).await?);
        advance(report, RunState::Loaded);

        // Archive
        report.archived = mover
            .archive(
                &config.destination.staging_prefix,
                &config.destination.archive_prefix,
            )
            .await?;
        advance(report, RunState::Archived);

        Ok(())
    }

    fn exclude_archived(
        &self,
        matched: Vec<RemoteObject>,
        archived: &HashSet<String>,
        report: &mut RunReport,
    ) -> Vec<RemoteObject> {
        matched
            .into_iter()
            .filter(|object| {
                let already = archived.contains(staged_basename(&object.name));
                if already {
                    info!(object = %object.name, "Already archived, skipping");
                    report.already_archived += 1;
                }
                !already
            })
            .collect()
    }

    async fn fetch_and_stage(
        object: &RemoteObject,
        fetcher: &ReportFetcher,
        publisher: &StagingPublisher,
    ) -> ObjectOutcome {
        let fetched = match fetcher.fetch(object).await {
            Ok(fetched) => fetched,
            Err(e) => {
                error!(object = %object.name, stage = e.stage(), error = %e, "Report not staged");
                return ObjectOutcome::FetchFailed;
            },
        };

        match publisher.publish(&fetched.local_path).await {
            Ok(_) => ObjectOutcome::Staged,
            Err(e) => {
                error!(object = %object.name, error = %e, "Report not staged");
                ObjectOutcome::UploadFailed
            },
        }
    }

    async fn cleanup(
        &self,
        report: &mut RunReport,
        credentials: Option<CredentialBundle>,
        outcome: RunOutcome,
    ) {
        info!("Cleaning up");
        let mut warnings = match credentials {
            Some(mut bundle) => bundle.destroy(),
            None => purge_credential_files(&self.config.run.credentials_dir),
        };

        for dir in [self.config.run.download_dir(), self.config.run.decompress_dir()] {
            if let Err(warning) = remove_dir_if_present(&dir) {
                warnings.push(warning);
            }
        }

        advance(report, RunState::CleanedUp(outcome));

        for warning in &warnings {
            warn!(%warning, "Cleanup warning");
        }

        info!(
            outcome = %outcome,
            found = report.found,
            already_archived = report.already_archived,
            fetched = report.fetched,
            staged = report.staged,
            failed = report.failed,
            archived = report.archived,
            rows_loaded = ?report.load.as_ref().and_then(|l| l.rows_loaded),
            "Run summary"
        );

        if let Some(run_log) = &self.run_log {
            if let Err(warning) = self.upload_run_log(run_log, report).await {
                warn!(%warning, "Run log kept locally");
                warnings.push(warning);
            }
        }

        report.warnings = warnings;
    }

    async fn upload_run_log(
        &self,
        run_log: &RunLogFile,
        report: &mut RunReport,
    ) -> std::result::Result<(), CleanupWarning> {
        let name = object_path::join(&self.config.destination.log_prefix, &run_log.file_name());
        info!("Uploading run log to gs://{}/{}", self.config.destination.bucket, name);

        self.collaborators
            .destination
            .upload(&self.config.destination.bucket, &name, &run_log.path())
            .await
            .map_err(|e| CleanupWarning::new("upload run log", e))?;

        report.log_object = Some(name);

        run_log
            .remove()
            .map_err(|e| CleanupWarning::new("remove local run log", e))
    }
}
