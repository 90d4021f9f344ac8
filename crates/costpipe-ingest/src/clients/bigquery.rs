//! BigQuery REST client

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::auth::TokenProvider;
use super::{
    status_error, ClientResult, DatasetRef, JobHandle, JobSpec, JobState, JobStatus, TableRef,
    Warehouse, WriteDisposition,
};
use crate::error::ClientError;

/// Public BigQuery endpoint
pub const DEFAULT_BIGQUERY_ENDPOINT: &str = "https://bigquery.googleapis.com";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
    job_reference: JobReference,
    #[serde(default)]
    status: Option<JobStatusResource>,
    #[serde(default)]
    statistics: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatusResource {
    state: String,
    #[serde(default)]
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableResource {
    #[serde(default)]
    num_rows: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableList {
    #[serde(default)]
    tables: Vec<TableListEntry>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableListEntry {
    table_reference: TableReference,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableReference {
    table_id: String,
}

impl JobResource {
    fn to_status(&self) -> ClientResult<JobStatus> {
        let status = self
            .status
            .as_ref()
            .ok_or_else(|| ClientError::decode("job resource without status"))?;

        let state = match status.state.as_str() {
            "PENDING" => JobState::Pending,
            "RUNNING" => JobState::Running,
            "DONE" => JobState::Done,
            other => return Err(ClientError::decode(format!("unknown job state '{}'", other))),
        };

        let error = status.error_result.as_ref().map(|e| {
            match (&e.reason, &e.message) {
                (Some(reason), Some(message)) => format!("{}: {}", reason, message),
                (None, Some(message)) => message.clone(),
                (Some(reason), None) => reason.clone(),
                (None, None) => "unknown error".to_string(),
            }
        });

        let output_rows = self
            .statistics
            .as_ref()
            .and_then(|s| s.pointer("/load/outputRows"))
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok());

        Ok(JobStatus {
            state,
            error,
            output_rows,
        })
    }
}

fn table_json(table: &TableRef) -> Value {
    json!({
        "projectId": table.project,
        "datasetId": table.dataset,
        "tableId": table.table,
    })
}

fn disposition(write: WriteDisposition) -> &'static str {
    match write {
        WriteDisposition::WriteAppend => "WRITE_APPEND",
        WriteDisposition::WriteTruncate => "WRITE_TRUNCATE",
        WriteDisposition::WriteEmpty => "WRITE_EMPTY",
    }
}

/// Request body of `jobs.insert`
pub(crate) fn job_body(project: &str, job_id: &str, location: &str, job: &JobSpec) -> Value {
    let configuration = match job {
        JobSpec::Load(load) => json!({
            "load": {
                "destinationTable": table_json(&load.destination),
                "sourceUris": load.source_uris,
                "sourceFormat": "CSV",
                "skipLeadingRows": load.skip_leading_rows,
                "autodetect": load.autodetect,
                "writeDisposition": disposition(load.write_disposition),
            }
        }),
        JobSpec::Copy(copy) => json!({
            "copy": {
                "sourceTable": table_json(&copy.source),
                "destinationTable": table_json(&copy.destination),
                "writeDisposition": disposition(copy.write_disposition),
            }
        }),
    };

    json!({
        "jobReference": {
            "projectId": project,
            "jobId": job_id,
            "location": location,
        },
        "configuration": configuration,
    })
}

/// Warehouse access over the BigQuery v2 REST API
pub struct BigQueryClient {
    client: Client,
    endpoint: String,
    tokens: Arc<dyn TokenProvider>,
}

impl BigQueryClient {
    pub fn new(client: Client, endpoint: Option<String>, tokens: Arc<dyn TokenProvider>) -> Self {
        let endpoint = endpoint
            .unwrap_or_else(|| DEFAULT_BIGQUERY_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string();
        Self {
            client,
            endpoint,
            tokens,
        }
    }

    fn project_url(&self, project: &str) -> String {
        format!("{}/bigquery/v2/projects/{}", self.endpoint, urlencoding::encode(project))
    }

    fn dataset_url(&self, dataset: &DatasetRef) -> String {
        format!(
            "{}/datasets/{}",
            self.project_url(&dataset.project),
            urlencoding::encode(&dataset.dataset)
        )
    }
}

#[async_trait]
impl Warehouse for BigQueryClient {
    #[instrument(skip(self))]
    async fn dataset_exists(&self, dataset: &DatasetRef) -> ClientResult<bool> {
        let token = self.tokens.token().await?;
        let response = self
            .client
            .get(self.dataset_url(dataset))
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(status_error("bigquery", response).await),
        }
    }

    #[instrument(skip(self))]
    async fn create_dataset(&self, dataset: &DatasetRef, location: &str) -> ClientResult<()> {
        let token = self.tokens.token().await?;
        let body = json!({
            "datasetReference": {
                "projectId": dataset.project,
                "datasetId": dataset.dataset,
            },
            "location": location,
        });

        let response = self
            .client
            .post(format!("{}/datasets", self.project_url(&dataset.project)))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error("bigquery", response).await);
        }

        debug!("Created dataset {} in {}", dataset, location);
        Ok(())
    }

    #[instrument(skip(self, job))]
    async fn insert_job(
        &self,
        project: &str,
        location: &str,
        job: &JobSpec,
    ) -> ClientResult<JobHandle> {
        let job_id = format!("costpipe_{}", Uuid::new_v4().simple());
        let token = self.tokens.token().await?;

        let response = self
            .client
            .post(format!("{}/jobs", self.project_url(project)))
            .bearer_auth(token)
            .json(&job_body(project, &job_id, location, job))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error("bigquery", response).await);
        }

        let resource: JobResource = response
            .json()
            .await
            .map_err(|e| ClientError::decode(format!("job resource: {}", e)))?;

        debug!("Submitted job {}", resource.job_reference.job_id);

        Ok(JobHandle {
            project: resource.job_reference.project_id,
            job_id: resource.job_reference.job_id,
            location: resource
                .job_reference
                .location
                .unwrap_or_else(|| location.to_string()),
        })
    }

    #[instrument(skip(self))]
    async fn get_job(&self, handle: &JobHandle) -> ClientResult<JobStatus> {
        let token = self.tokens.token().await?;
        let response = self
            .client
            .get(format!(
                "{}/jobs/{}",
                self.project_url(&handle.project),
                urlencoding::encode(&handle.job_id)
            ))
            .bearer_auth(token)
            .query(&[("location", handle.location.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error("bigquery", response).await);
        }

        let resource: JobResource = response
            .json()
            .await
            .map_err(|e| ClientError::decode(format!("job resource: {}", e)))?;

        resource.to_status()
    }

    #[instrument(skip(self))]
    async fn table_row_count(&self, table: &TableRef) -> ClientResult<Option<i64>> {
        let dataset = DatasetRef::new(&table.project, &table.dataset);
        let token = self.tokens.token().await?;
        let response = self
            .client
            .get(format!(
                "{}/tables/{}",
                self.dataset_url(&dataset),
                urlencoding::encode(&table.table)
            ))
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error("bigquery", response).await);
        }

        let resource: TableResource = response
            .json()
            .await
            .map_err(|e| ClientError::decode(format!("table resource: {}", e)))?;

        Ok(resource.num_rows.and_then(|n| n.parse().ok()))
    }

    #[instrument(skip(self))]
    async fn list_tables(&self, dataset: &DatasetRef) -> ClientResult<Vec<String>> {
        let url = format!("{}/tables", self.dataset_url(dataset));
        let mut tables = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let token = self.tokens.token().await?;
            let mut request = self.client.get(&url).bearer_auth(token);
            if let Some(ref page) = page_token {
                request = request.query(&[("pageToken", page.as_str())]);
            }

            let response = request.send().await?;
            if !response.status().is_success() {
                return Err(status_error("bigquery", response).await);
            }

            let page: TableList = response
                .json()
                .await
                .map_err(|e| ClientError::decode(format!("table list: {}", e)))?;

            tables.extend(page.tables.into_iter().map(|t| t.table_reference.table_id));

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        Ok(tables)
    }
}
