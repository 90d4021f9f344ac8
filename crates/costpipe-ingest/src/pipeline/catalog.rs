//! Report selection by creation date

use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::clients::ReportSource;
use crate::error::{PipelineError, Result};
use crate::pipeline::types::RemoteObject;

/// Keep the objects created on `target_date` (UTC calendar day), oldest first.
///
/// Pseudo-folder entries (names ending in `/`) are dropped.
pub fn select_for_date(objects: Vec<RemoteObject>, target_date: NaiveDate) -> Vec<RemoteObject> {
    let mut selected: Vec<RemoteObject> = objects
        .into_iter()
        .filter(|o| !o.name.ends_with('/'))
        .filter(|o| o.created_at.date_naive() == target_date)
        .collect();

    selected.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
    selected
}

/// Lists the report bucket and filters it to one target date
pub struct RemoteReportCatalog {
    source: Arc<dyn ReportSource>,
    namespace: String,
    bucket: String,
    prefix: String,
}

impl RemoteReportCatalog {
    pub fn new(
        source: Arc<dyn ReportSource>,
        namespace: impl Into<String>,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            source,
            namespace: namespace.into(),
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    /// Reports created on `target_date`. A failed listing aborts: a partial
    /// listing is never processed.
    #[instrument(skip(self), fields(namespace = %self.namespace, bucket = %self.bucket))]
    pub async fn reports_for(&self, target_date: NaiveDate) -> Result<Vec<RemoteObject>> {
        let listed = self
            .source
            .list(&self.namespace, &self.bucket, &self.prefix)
            .await
            .map_err(|source| PipelineError::Listing {
                prefix: self.prefix.clone(),
                source,
            })?;

        let total = listed.len();
        let selected = select_for_date(listed, target_date);

        for object in &selected {
            debug!(object = %object.name, created_at = %object.created_at, "Matched report");
        }
        info!(
            "Found {} report(s) for {} out of {} listed under '{}'",
            selected.len(),
            target_date,
            total,
            self.prefix
        );

        Ok(selected)
    }
}
