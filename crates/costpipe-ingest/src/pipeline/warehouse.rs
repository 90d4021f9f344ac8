//! Warehouse load with dataset provisioning and bounded job polling

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::clients::{
    DatasetRef, JobHandle, JobSpec, JobStatus, LoadJobSpec, TableRef, Warehouse,
};
use crate::config::WarehouseConfig;
use crate::error::LoadJobError;
use crate::pipeline::types::LoadSummary;

/// Make sure `dataset` exists, creating it in `location` when missing.
///
/// A creation that fails because someone else created the dataset in the
/// meantime is accepted.
pub async fn ensure_dataset(
    warehouse: &dyn Warehouse,
    dataset: &DatasetRef,
    location: &str,
) -> Result<(), LoadJobError> {
    if warehouse.dataset_exists(dataset).await? {
        debug!("Dataset {} exists", dataset);
        return Ok(());
    }

    info!("Dataset {} not found, creating it in {}", dataset, location);

    match warehouse.create_dataset(dataset, location).await {
        Ok(()) => {
            info!("Created dataset {}", dataset);
            Ok(())
        },
        Err(e) if e.is_already_exists() => {
            info!("Dataset {} was created concurrently", dataset);
            Ok(())
        },
        Err(e) => {
            // Creation may have raced with another creator that used a different error
            if warehouse.dataset_exists(dataset).await.unwrap_or(false) {
                warn!(error = %e, "Dataset creation failed but the dataset exists now");
                Ok(())
            } else {
                Err(LoadJobError::Dataset {
                    dataset: dataset.to_string(),
                    reason: e.to_string(),
                })
            }
        },
    }
}

/// Poll a job until it is done or `timeout` elapses.
///
/// A done job with an error result is [`LoadJobError::Failed`].
pub async fn wait_for_job(
    warehouse: &dyn Warehouse,
    handle: &JobHandle,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<JobStatus, LoadJobError> {
    let deadline = Instant::now() + timeout;

    loop {
        let status = warehouse.get_job(handle).await?;

        if status.is_done() {
            return match status.error {
                Some(message) => Err(LoadJobError::Failed {
                    job_id: handle.job_id.clone(),
                    message,
                }),
                None => Ok(status),
            };
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(LoadJobError::Timeout {
                job_id: handle.job_id.clone(),
                timeout,
            });
        }

        debug!(job_id = %handle.job_id, state = ?status.state, "Job not finished yet");
        tokio::time::sleep(poll_interval.min(deadline - now)).await;
    }
}

/// Appends staged CSV files to the destination table
pub struct WarehouseLoader {
    warehouse: Arc<dyn Warehouse>,
    config: WarehouseConfig,
}

impl WarehouseLoader {
    pub fn new(warehouse: Arc<dyn Warehouse>, config: WarehouseConfig) -> Self {
        Self { warehouse, config }
    }

    pub fn dataset(&self) -> DatasetRef {
        DatasetRef::new(&self.config.project, &self.config.dataset)
    }

    pub fn table(&self) -> TableRef {
        self.dataset().table(&self.config.table)
    }

    /// Load everything matching `source_uri` and wait for the job to finish
    #[instrument(skip(self), fields(table = %self.table()))]
    pub async fn load(&self, source_uri: &str) -> Result<LoadSummary, LoadJobError> {
        ensure_dataset(self.warehouse.as_ref(), &self.dataset(), &self.config.location).await?;

        let table = self.table();
        let job = JobSpec::Load(LoadJobSpec::csv_append(table.clone(), source_uri));

        let handle = self
            .warehouse
            .insert_job(&self.config.project, &self.config.location, &job)
            .await?;
        info!(job_id = %handle.job_id, "Started load job from {}", source_uri);

        let status = wait_for_job(
            self.warehouse.as_ref(),
            &handle,
            self.config.load_timeout(),
            self.config.poll_interval(),
        )
        .await?;

        info!(
            job_id = %handle.job_id,
            rows = ?status.output_rows,
            "Load job finished"
        );

        // Row total is informational only
        let table_rows = match self.warehouse.table_row_count(&table).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Could not read table row count");
                None
            },
        };
        if let Some(rows) = table_rows {
            info!("Table {} now holds {} rows", table, rows);
        }

        Ok(LoadSummary {
            job_id: handle.job_id,
            rows_loaded: status.output_rows,
            table_rows,
        })
    }
}
