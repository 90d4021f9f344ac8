//! BigQuery adapter against a mock REST API

use costpipe_ingest::clients::auth::StaticTokenProvider;
use costpipe_ingest::clients::bigquery::BigQueryClient;
use costpipe_ingest::clients::{DatasetRef, JobHandle, JobSpec, JobState, LoadJobSpec, Warehouse};
use costpipe_ingest::config::WarehouseConfig;
use costpipe_ingest::pipeline::warehouse::WarehouseLoader;
use serde_json::json;
use std::sync::Arc;
use wiremock::{
    matchers::{method, path, query_param, query_param_is_missing},
    Mock, MockServer, ResponseTemplate,
};

const PROJECT: &str = "acme-analytics";

fn client(server: &MockServer) -> BigQueryClient {
    BigQueryClient::new(
        reqwest::Client::new(),
        Some(server.uri()),
        Arc::new(StaticTokenProvider::new("test-token")),
    )
}

fn dataset() -> DatasetRef {
    DatasetRef::new(PROJECT, "billing")
}

fn job_resource(job_id: &str, state: &str) -> serde_json::Value {
    json!({
        "jobReference": {"projectId": PROJECT, "jobId": job_id, "location": "US"},
        "status": {"state": state}
    })
}

// ============================================================================
// Datasets
// ============================================================================

#[tokio::test]
async fn test_dataset_exists() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/bigquery/v2/projects/acme-analytics/datasets/billing"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "acme-analytics:billing"})))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/bigquery/v2/projects/acme-analytics/datasets/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let bq = client(&server);
    assert!(bq.dataset_exists(&dataset()).await.unwrap());
    assert!(!bq.dataset_exists(&DatasetRef::new(PROJECT, "missing")).await.unwrap());
}

#[tokio::test]
async fn test_create_dataset_conflict_is_already_exists() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/bigquery/v2/projects/acme-analytics/datasets"))
        .respond_with(ResponseTemplate::new(409).set_body_string("Already Exists: Dataset acme-analytics:billing"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).create_dataset(&dataset(), "US").await.unwrap_err();
    assert!(err.is_already_exists());

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["datasetReference"]["datasetId"], "billing");
    assert_eq!(body["location"], "US");
}

// ============================================================================
// Jobs
// ============================================================================

#[tokio::test]
async fn test_insert_and_poll_job() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/bigquery/v2/projects/acme-analytics/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_resource("costpipe_abc", "PENDING")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/bigquery/v2/projects/acme-analytics/jobs/costpipe_abc"))
        .and(query_param("location", "US"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobReference": {"projectId": PROJECT, "jobId": "costpipe_abc", "location": "US"},
            "status": {"state": "DONE"},
            "statistics": {"load": {"outputRows": "17", "inputFiles": "2"}}
        })))
        .mount(&server)
        .await;

    let bq = client(&server);
    let job = JobSpec::Load(LoadJobSpec::csv_append(
        dataset().table("oci_costs"),
        "gs://acme-cost-landing/staging/*",
    ));

    let handle = bq.insert_job(PROJECT, "US", &job).await.unwrap();
    assert_eq!(
        handle,
        JobHandle {
            project: PROJECT.to_string(),
            job_id: "costpipe_abc".to_string(),
            location: "US".to_string(),
        }
    );

    let status = bq.get_job(&handle).await.unwrap();
    assert_eq!(status.state, JobState::Done);
    assert_eq!(status.error, None);
    assert_eq!(status.output_rows, Some(17));

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body["jobReference"]["jobId"].as_str().unwrap().starts_with("costpipe_"));
    assert_eq!(body["configuration"]["load"]["writeDisposition"], "WRITE_APPEND");
}

#[tokio::test]
async fn test_loader_polls_rest_api_until_done() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/bigquery/v2/projects/acme-analytics/datasets/billing"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/bigquery/v2/projects/acme-analytics/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_resource("costpipe_load", "RUNNING")))
        .expect(1)
        .mount(&server)
        .await;

    // First poll still running, then done with an error
    Mock::given(method("GET"))
        .and(path("/bigquery/v2/projects/acme-analytics/jobs/costpipe_load"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_resource("costpipe_load", "RUNNING")))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/bigquery/v2/projects/acme-analytics/jobs/costpipe_load"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobReference": {"projectId": PROJECT, "jobId": "costpipe_load", "location": "US"},
            "status": {
                "state": "DONE",
                "errorResult": {"reason": "invalid", "message": "CSV table references column position 3, but line contains only 2 columns."}
            }
        })))
        .mount(&server)
        .await;

    let config = WarehouseConfig {
        project: PROJECT.to_string(),
        dataset: "billing".to_string(),
        table: "oci_costs".to_string(),
        location: "US".to_string(),
        load_timeout_secs: 30,
        poll_interval_secs: 1,
        endpoint: Some(server.uri()),
    };
    let loader = WarehouseLoader::new(Arc::new(client(&server)), config);

    let err = loader.load("gs://acme-cost-landing/staging/*").await.unwrap_err();

    let message = err.to_string();
    assert!(message.contains("costpipe_load"), "{}", message);
    assert!(message.contains("invalid: CSV table references column position 3"), "{}", message);
}

// ============================================================================
// Tables
// ============================================================================

#[tokio::test]
async fn test_table_row_count() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/bigquery/v2/projects/acme-analytics/datasets/billing/tables/oci_costs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"numRows": "1280"})))
        .mount(&server)
        .await;

    let rows = client(&server)
        .table_row_count(&dataset().table("oci_costs"))
        .await
        .unwrap();
    assert_eq!(rows, Some(1280));
}

#[tokio::test]
async fn test_list_tables_follows_page_tokens() {
    let server = MockServer::start().await;
    let tables_path = "/bigquery/v2/projects/acme-analytics/datasets/billing/tables";

    Mock::given(method("GET"))
        .and(path(tables_path))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tables": [{"tableReference": {"projectId": PROJECT, "datasetId": "billing", "tableId": "oci_costs"}}],
            "nextPageToken": "t2"
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(tables_path))
        .and(query_param("pageToken", "t2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tables": [{"tableReference": {"projectId": PROJECT, "datasetId": "billing", "tableId": "fx_rates"}}]
        })))
        .mount(&server)
        .await;

    let tables = client(&server).list_tables(&dataset()).await.unwrap();
    assert_eq!(tables, vec!["oci_costs".to_string(), "fx_rates".to_string()]);
}
