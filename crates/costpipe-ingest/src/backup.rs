//! Dataset backup
//!
//! Copies every table of a dataset into a backup dataset, one blocking copy job
//! per table. Every table is attempted; failures are collected and reported
//! once all copies have finished.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};

use crate::clients::{CopyJobSpec, DatasetRef, JobSpec, Warehouse, WriteDisposition};
use crate::config::WarehouseConfig;
use crate::error::LoadJobError;
use crate::pipeline::warehouse::{ensure_dataset, wait_for_job};

/// A table that could not be copied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedCopy {
    pub table: String,
    pub reason: String,
}

/// Outcome of a dataset backup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupReport {
    pub copied: Vec<String>,
    pub failed: Vec<FailedCopy>,
}

impl BackupReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Copies the tables of one dataset into another
pub struct DatasetBackup {
    warehouse: Arc<dyn Warehouse>,
    location: String,
    timeout: Duration,
    poll_interval: Duration,
    write_disposition: WriteDisposition,
}

impl DatasetBackup {
    /// Backup using the location and job deadlines of `config`.
    ///
    /// Copies refuse to overwrite a non-empty backup table unless
    /// [`DatasetBackup::overwrite`] is set.
    pub fn new(warehouse: Arc<dyn Warehouse>, config: &WarehouseConfig) -> Self {
        Self {
            warehouse,
            location: config.location.clone(),
            timeout: config.load_timeout(),
            poll_interval: config.poll_interval(),
            write_disposition: WriteDisposition::WriteEmpty,
        }
    }

    /// Replace the content of existing backup tables
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.write_disposition = if overwrite {
            WriteDisposition::WriteTruncate
        } else {
            WriteDisposition::WriteEmpty
        };
        self
    }

    #[instrument(skip(self), fields(source = %source, backup = %backup))]
    pub async fn run(
        &self,
        source: &DatasetRef,
        backup: &DatasetRef,
    ) -> Result<BackupReport, LoadJobError> {
        if source == backup {
            return Err(LoadJobError::Dataset {
                dataset: backup.to_string(),
                reason: "backup dataset must differ from the source dataset".to_string(),
            });
        }

        ensure_dataset(self.warehouse.as_ref(), backup, &self.location).await?;

        let tables = self.warehouse.list_tables(source).await?;
        info!("Backing up {} table(s) from {} to {}", tables.len(), source, backup);

        let mut report = BackupReport::default();

        for table in tables {
            let job = JobSpec::Copy(CopyJobSpec {
                source: source.table(&table),
                destination: backup.table(&table),
                write_disposition: self.write_disposition,
            });

            match self.copy(backup, &job).await {
                Ok(()) => {
                    info!("Backed up {}.{} to {}.{}", source, table, backup, table);
                    report.copied.push(table);
                },
                Err(e) => {
                    error!(table = %table, error = %e, "Table backup failed");
                    report.failed.push(FailedCopy {
                        table,
                        reason: e.to_string(),
                    });
                },
            }
        }

        info!(
            copied = report.copied.len(),
            failed = report.failed.len(),
            "Backup finished"
        );
        Ok(report)
    }

    async fn copy(&self, backup: &DatasetRef, job: &JobSpec) -> Result<(), LoadJobError> {
        let handle = self
            .warehouse
            .insert_job(&backup.project, &self.location, job)
            .await?;
        wait_for_job(self.warehouse.as_ref(), &handle, self.timeout, self.poll_interval).await?;
        Ok(())
    }
}
