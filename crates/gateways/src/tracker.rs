//! Experiment tracker gateway
//!
//! This module provides the [`ExperimentTracker`] interface used to record
//! training runs, their metrics and the resulting registered model versions,
//! with an HTTP client implementation and a no-op one for when tracking is
//! disabled.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use common::HyperparameterBag;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{GatewayError, GatewayResult};

/// What a tracked run is doing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRequest {
    /// Model being trained
    pub model_id: String,
    /// Model family
    pub model_type: String,
    /// Dataset the job trains on
    pub dataset_id: String,
    /// Version the job will produce if it succeeds
    pub version: u64,
    /// Fully-populated hyperparameters
    pub hyperparameters: HyperparameterBag,
    /// `train` or `retrain`
    pub job: String,
}

/// Handle of a run opened on the tracker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunHandle {
    pub run_id: String,
}

/// Final state of a run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// Records runs, metrics and registered models
#[async_trait]
pub trait ExperimentTracker: Send + Sync {
    /// Whether calls reach a real tracker
    fn is_enabled(&self) -> bool;

    /// Opens a run for a training job
    async fn start_run(&self, request: &RunRequest) -> GatewayResult<RunHandle>;

    /// Records evaluation metrics on a run
    async fn log_metrics(&self, run: &RunHandle, metrics: &BTreeMap<String, f64>) -> GatewayResult<()>;

    /// Closes a run
    async fn finish_run(&self, run: &RunHandle, status: RunStatus) -> GatewayResult<()>;

    /// Registers the fitted model as a new version
    async fn register_model(&self, run: &RunHandle, model_id: &str, version: u64) -> GatewayResult<()>;

    /// Checks that the tracker is reachable
    async fn ping(&self) -> GatewayResult<()>;
}

/// Tracker used when no endpoint is configured; every call succeeds
#[derive(Debug, Default, Clone)]
pub struct NoopTracker;

#[async_trait]
impl ExperimentTracker for NoopTracker {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn start_run(&self, request: &RunRequest) -> GatewayResult<RunHandle> {
        Ok(RunHandle {
            run_id: format!("local-{}-v{}", request.model_id, request.version),
        })
    }

    async fn log_metrics(&self, _run: &RunHandle, _metrics: &BTreeMap<String, f64>) -> GatewayResult<()> {
        Ok(())
    }

    async fn finish_run(&self, _run: &RunHandle, _status: RunStatus) -> GatewayResult<()> {
        Ok(())
    }

    async fn register_model(&self, _run: &RunHandle, _model_id: &str, _version: u64) -> GatewayResult<()> {
        Ok(())
    }

    async fn ping(&self) -> GatewayResult<()> {
        Ok(())
    }
}

#[derive(Serialize)]
struct StartRunBody<'a> {
    project: &'a str,
    name: String,
    #[serde(flatten)]
    request: &'a RunRequest,
}

#[derive(Deserialize)]
struct StartRunResponse {
    run_id: String,
}

#[derive(Serialize)]
struct RegisterModelBody<'a> {
    project: &'a str,
    name: &'a str,
    version: u64,
    run_id: &'a str,
}

/// JSON-over-HTTP experiment tracker client
///
/// Endpoints, relative to the configured base URL:
/// `POST /api/runs`, `POST /api/runs/{id}/metrics`, `POST /api/runs/{id}/finish`,
/// `POST /api/models` and `GET /health`.
pub struct HttpExperimentTracker {
    /// HTTP client
    client: Client,
    /// Base URL without trailing slash
    endpoint: String,
    /// Project runs are filed under
    project: String,
    /// Bearer token
    api_key: Option<String>,
}

impl HttpExperimentTracker {
    /// Creates a client; `timeout` bounds every request
    pub fn new(endpoint: &str, project: &str, api_key: Option<String>, timeout: Duration) -> GatewayResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("mlops-service/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable(format!("cannot build HTTP client: {}", e)))?;

        info!(endpoint, project, "Experiment tracker client configured");
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            project: project.to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> GatewayResult<reqwest::Response> {
        let response = self
            .authorize(self.client.post(self.url(path)).json(body))
            .send()
            .await?;
        check_status(path, response)
    }
}

fn check_status(path: &str, response: reqwest::Response) -> GatewayResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(GatewayError::Unavailable(format!(
            "tracker returned {} for {}",
            status, path
        )))
    }
}

#[async_trait]
impl ExperimentTracker for HttpExperimentTracker {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn start_run(&self, request: &RunRequest) -> GatewayResult<RunHandle> {
        let body = StartRunBody {
            project: &self.project,
            name: format!("{}-{}-v{}", request.model_id, request.job, request.version),
            request,
        };
        let response: StartRunResponse = self.post("/api/runs", &body).await?.json().await?;
        debug!(run_id = %response.run_id, model_id = %request.model_id, "Tracker run started");
        Ok(RunHandle { run_id: response.run_id })
    }

    async fn log_metrics(&self, run: &RunHandle, metrics: &BTreeMap<String, f64>) -> GatewayResult<()> {
        let path = format!("/api/runs/{}/metrics", run.run_id);
        self.post(&path, &serde_json::json!({ "metrics": metrics })).await?;
        Ok(())
    }

    async fn finish_run(&self, run: &RunHandle, status: RunStatus) -> GatewayResult<()> {
        let path = format!("/api/runs/{}/finish", run.run_id);
        self.post(&path, &serde_json::json!({ "status": status })).await?;
        Ok(())
    }

    async fn register_model(&self, run: &RunHandle, model_id: &str, version: u64) -> GatewayResult<()> {
        let body = RegisterModelBody {
            project: &self.project,
            name: model_id,
            version,
            run_id: &run.run_id,
        };
        self.post("/api/models", &body).await?;
        Ok(())
    }

    async fn ping(&self) -> GatewayResult<()> {
        let response = self.authorize(self.client.get(self.url("/health"))).send().await?;
        check_status("/health", response)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RunRequest {
        RunRequest {
            model_id: "iris-lr".into(),
            model_type: "logistic_regression".into(),
            dataset_id: "iris".into(),
            version: 1,
            hyperparameters: HyperparameterBag::new(),
            job: "train".into(),
        }
    }

    #[tokio::test]
    async fn test_noop_tracker() {
        let tracker = NoopTracker;
        assert!(!tracker.is_enabled());
        let run = tracker.start_run(&request()).await.unwrap();
        assert_eq!(run.run_id, "local-iris-lr-v1");
        tracker.log_metrics(&run, &BTreeMap::new()).await.unwrap();
        tracker.finish_run(&run, RunStatus::Completed).await.unwrap();
        tracker.register_model(&run, "iris-lr", 1).await.unwrap();
        tracker.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_http_tracker_unreachable() {
        let tracker = HttpExperimentTracker::new(
            "http://127.0.0.1:9",
            "MLOps",
            None,
            Duration::from_millis(500),
        )
        .unwrap();
        assert!(tracker.is_enabled());
        assert!(matches!(tracker.ping().await, Err(GatewayError::Unavailable(_))));
        assert!(matches!(tracker.start_run(&request()).await, Err(GatewayError::Unavailable(_))));
    }

    #[test]
    fn test_start_run_body_is_flat() {
        let req = request();
        let body = StartRunBody {
            project: "MLOps",
            name: "iris-lr-train-v1".into(),
            request: &req,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["project"], "MLOps");
        assert_eq!(value["model_id"], "iris-lr");
        assert_eq!(value["dataset_id"], "iris");
    }
}
