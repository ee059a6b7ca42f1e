//! Model lifecycle service implementation
//!
//! [`ModelService`] is the one object both transports share. It validates
//! requests, owns the registry, runs training jobs on tokio's blocking pool
//! bounded by job slots and timeouts, and publishes results atomically.
//! Calls to the experiment tracker and the model archive are best-effort:
//! their failures are logged and recorded as warnings on the model, never
//! returned to the caller.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::utils::{execute_with_timeout, format_duration, generate_model_id, validate_identifier};
use common::{ClassLabel, DataTable, DatasetDescriptor, DatasetFormat, Error, HyperparameterBag, Result};
use estimators::{
    CancellationToken, EstimatorRegistry, EstimatorSpec, ModelTypeInfo, PredictInput, TrainedModel, TrainingData,
};
use gateways::{DatasetStore, ExperimentTracker, GatewayResult, RunHandle, RunRequest, RunStatus};
use serde::{Deserialize, Serialize};
use service_config::LifecycleConfig;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::archive::ModelArchive;
use crate::record::{FailureReason, ModelRecord, ModelStatus};
use crate::registry::{JobGuard, ModelEntry, ModelRegistry};

/// How long `shutdown` waits for running jobs to wind down
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Limits and timeouts of the lifecycle service
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleSettings {
    /// Training jobs allowed to run at once
    pub max_concurrent_jobs: usize,
    /// Default bound on a fit
    pub training_timeout: Duration,
    /// Default bound on a predict
    pub prediction_timeout: Duration,
    /// Bound on dataset store calls
    pub dataset_timeout: Duration,
    /// Bound on each tracker call and archive write
    pub gateway_timeout: Duration,
    /// Serve the previous estimator while retraining
    pub serve_stale_during_retrain: bool,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self::from(&LifecycleConfig::default())
    }
}

impl From<&LifecycleConfig> for LifecycleSettings {
    fn from(config: &LifecycleConfig) -> Self {
        Self {
            max_concurrent_jobs: config.max_concurrent_jobs.max(1),
            training_timeout: config.training_timeout(),
            prediction_timeout: config.prediction_timeout(),
            dataset_timeout: config.dataset_timeout(),
            gateway_timeout: config.gateway_timeout(),
            serve_stale_during_retrain: config.serve_stale_during_retrain,
        }
    }
}

/// Request to create and train a model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainRequest {
    /// Caller-chosen id; generated when absent
    pub model_id: Option<String>,
    /// Model type name or alias
    pub model_type: String,
    /// Hyperparameter bag, defaults fill missing keys
    #[serde(default)]
    pub hyperparameters: HyperparameterBag,
    /// Dataset to train on
    pub dataset_id: String,
    /// Column to predict; the dataset's last column when absent
    pub target_column: Option<String>,
    /// Bound on the fit, the configured default when absent
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

/// Request to refit an existing model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrainRequest {
    /// New hyperparameters; the stored ones when absent
    pub hyperparameters: Option<HyperparameterBag>,
    /// New dataset; the stored one when absent
    pub dataset_id: Option<String>,
    /// New target column; the stored one when absent
    pub target_column: Option<String>,
    /// Bound on the fit
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

/// Predictions for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub model_id: String,
    /// Version of the estimator that answered
    pub version: u64,
    pub predictions: Vec<ClassLabel>,
}

/// Reachability of one gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayHealth {
    pub name: String,
    pub enabled: bool,
    pub reachable: bool,
    pub detail: Option<String>,
}

/// Service health snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// `healthy`, `degraded` or `shutting_down`
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    /// Number of models per status
    pub models: BTreeMap<String, usize>,
    pub active_jobs: usize,
    pub max_concurrent_jobs: usize,
    pub dataset_store: GatewayHealth,
    pub tracker: GatewayHealth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobKind {
    Train,
    Retrain,
}

impl JobKind {
    fn as_str(&self) -> &'static str {
        match self {
            JobKind::Train => "train",
            JobKind::Retrain => "retrain",
        }
    }
}

/// Everything a training job needs, fixed before it starts
struct JobPlan {
    kind: JobKind,
    model_id: String,
    spec: EstimatorSpec,
    dataset_id: String,
    target_column: Option<String>,
    timeout: Duration,
}

/// Model lifecycle service shared by the transports
pub struct ModelService {
    registry: ModelRegistry,
    estimators: Arc<EstimatorRegistry>,
    datasets: Arc<dyn DatasetStore>,
    tracker: Arc<dyn ExperimentTracker>,
    archive: Option<ModelArchive>,
    job_slots: Arc<Semaphore>,
    settings: LifecycleSettings,
    shutdown: CancellationToken,
    started_at: Instant,
}

impl ModelService {
    /// Creates a service with an empty registry
    pub fn new(
        settings: LifecycleSettings,
        datasets: Arc<dyn DatasetStore>,
        tracker: Arc<dyn ExperimentTracker>,
    ) -> Self {
        info!(
            max_concurrent_jobs = settings.max_concurrent_jobs,
            dataset_store = datasets.name(),
            tracking = tracker.is_enabled(),
            "Model service created"
        );
        Self {
            registry: ModelRegistry::new(),
            estimators: Arc::new(EstimatorRegistry::new()),
            job_slots: Arc::new(Semaphore::new(settings.max_concurrent_jobs.max(1))),
            datasets,
            tracker,
            archive: None,
            settings,
            shutdown: CancellationToken::new(),
            started_at: Instant::now(),
        }
    }

    /// Attaches a model archive and restores the models it holds as `Ready`
    pub fn with_archive(mut self, archive: ModelArchive) -> Result<Self> {
        let mut restored = 0;
        for archived in archive.load_all()? {
            let mut record = archived.record;
            let model_id = record.model_id.clone();
            record.status = ModelStatus::Ready;
            record.last_error = None;
            record.warnings.clear();
            let entry = Arc::new(ModelEntry::with_estimator(record, Some(Arc::new(archived.model))));
            match self.registry.insert_new(&model_id, entry) {
                Ok(()) => restored += 1,
                Err(e) => warn!("Skipping archived model {}: {}", model_id, e),
            }
        }
        info!("Restored {} archived models from {:?}", restored, archive.dir());
        self.archive = Some(archive);
        Ok(self)
    }

    /// Configured limits
    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            Err(Error::Unavailable("service is shutting down".to_string()))
        } else {
            Ok(())
        }
    }

    fn acquire_slot(&self) -> Result<tokio::sync::OwnedSemaphorePermit> {
        Arc::clone(&self.job_slots).try_acquire_owned().map_err(|_| {
            Error::Unavailable(format!(
                "all {} training slots are busy; retry later",
                self.settings.max_concurrent_jobs
            ))
        })
    }

    /// Supported model types and their hyperparameter schemas
    pub fn model_types(&self) -> Vec<ModelTypeInfo> {
        self.estimators.list_types().to_vec()
    }

    /// Creates a model and trains it to completion
    pub async fn train(self: &Arc<Self>, request: TrainRequest) -> Result<ModelRecord> {
        self.ensure_running()?;
        let model_id = match request.model_id.filter(|id| !id.is_empty()) {
            Some(id) => {
                validate_identifier("model_id", &id)?;
                id
            }
            None => generate_model_id(),
        };
        if self.registry.is_taken(&model_id) {
            return Err(if self.registry.is_retired(&model_id) {
                Error::AlreadyExists(format!(
                    "model id '{}' belonged to a deleted model and cannot be reused",
                    model_id
                ))
            } else {
                Error::AlreadyExists(format!("model '{}'", model_id))
            });
        }
        let spec = self.estimators.validate(&request.model_type, &request.hyperparameters)?;
        if request.dataset_id.trim().is_empty() {
            return Err(Error::InvalidArgument("dataset_id must not be empty".to_string()));
        }

        let permit = self.acquire_slot()?;
        let record = ModelRecord::new(
            model_id.clone(),
            spec.clone(),
            request.dataset_id.clone(),
            request.target_column.clone(),
        );
        let entry = Arc::new(ModelEntry::new(record));
        let mut guard = entry.try_begin_job()?;
        guard.attach_permit(permit);
        self.registry.insert_new(&model_id, Arc::clone(&entry))?;

        info!(model_id = %model_id, model_type = %spec.model_type(), dataset_id = %request.dataset_id, "Training requested");

        let plan = JobPlan {
            kind: JobKind::Train,
            model_id,
            spec,
            dataset_id: request.dataset_id,
            target_column: request.target_column,
            timeout: request.timeout.unwrap_or(self.settings.training_timeout),
        };
        self.spawn_job(entry, guard, plan).await
    }

    /// Refits an existing model; `version` increases by one on success
    pub async fn retrain(self: &Arc<Self>, model_id: &str, request: RetrainRequest) -> Result<ModelRecord> {
        self.ensure_running()?;
        let entry = self.registry.require(model_id)?;
        let mut guard = entry.try_begin_job()?;

        let current = entry.snapshot();
        if current.status == ModelStatus::Deleted {
            return Err(Error::NotFound(format!("model '{}'", model_id)));
        }

        let spec = match &request.hyperparameters {
            Some(bag) => EstimatorSpec::from_bag(current.model_type(), bag)?,
            None => current.spec.clone(),
        };
        let dataset_id = request
            .dataset_id
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| current.dataset_id.clone());
        let target_column = request.target_column.or_else(|| current.target_column.clone());

        guard.attach_permit(self.acquire_slot()?);

        info!(model_id = %model_id, version = current.version, dataset_id = %dataset_id, "Retraining requested");

        let plan = JobPlan {
            kind: JobKind::Retrain,
            model_id: model_id.to_string(),
            spec,
            dataset_id,
            target_column,
            timeout: request.timeout.unwrap_or(self.settings.training_timeout),
        };
        self.spawn_job(entry, guard, plan).await
    }

    /// Runs the job on its own task so a dropped caller cannot strand the
    /// model in a busy state
    async fn spawn_job(self: &Arc<Self>, entry: Arc<ModelEntry>, guard: JobGuard, plan: JobPlan) -> Result<ModelRecord> {
        let model_id = plan.model_id.clone();
        let handle = tokio::spawn(Arc::clone(self).run_job(guard, plan));
        match handle.await {
            Ok(result) => result,
            Err(join_error) => {
                let err = Error::Internal(format!("training task aborted: {}", join_error));
                error!(model_id = %model_id, error = %err, "Training task did not complete");
                entry.update(|state| {
                    state.record.status = ModelStatus::Failed;
                    state.record.last_error = Some(FailureReason {
                        kind: err.kind(),
                        message: err.to_string(),
                    });
                });
                Err(err)
            }
        }
    }

    async fn run_job(self: Arc<Self>, guard: JobGuard, plan: JobPlan) -> Result<ModelRecord> {
        let entry = Arc::clone(guard.entry());
        let started = Instant::now();

        let (previous_version, busy_status) = entry.update(|state| {
            let busy = if state.record.version > 0 {
                ModelStatus::Retraining
            } else {
                ModelStatus::Training
            };
            state.record.transition(busy);
            (state.record.version, busy)
        });
        let target_version = previous_version + 1;
        debug!(model_id = %plan.model_id, status = %busy_status, "Job started");

        let mut warnings = Vec::new();
        let run = self.start_tracker_run(&plan, target_version, &mut warnings).await;

        let outcome = self.fit(&plan).await;

        let result = match outcome {
            Ok((model, metrics)) => {
                if let Some(run) = &run {
                    self.best_effort("tracker log_metrics", &plan.model_id, &mut warnings, self.tracker.log_metrics(run, &metrics))
                        .await;
                    self.best_effort(
                        "tracker register_model",
                        &plan.model_id,
                        &mut warnings,
                        self.tracker.register_model(run, &plan.model_id, target_version),
                    )
                    .await;
                    self.best_effort("tracker finish_run", &plan.model_id, &mut warnings, self.tracker.finish_run(run, RunStatus::Completed))
                        .await;
                }

                let mut record = entry.snapshot();
                record.spec = plan.spec.clone();
                record.dataset_id = plan.dataset_id.clone();
                record.target_column = Some(model.target_column.clone());
                record.feature_names = model.feature_names.clone();
                record.classes = model.classes.clone();
                record.metrics = metrics;
                record.version = target_version;
                record.last_error = None;
                record.tracker_run_id = run.as_ref().map(|r| r.run_id.clone());
                record.transition(ModelStatus::Ready);

                if let Some(archive) = &self.archive {
                    let save = execute_with_timeout(archive.save(&record, &model), self.settings.gateway_timeout, "archive save");
                    if let Err(e) = save.await {
                        warn!(model_id = %plan.model_id, error = %e, "Model archive write failed");
                        warnings.push(format!("archive save failed: {}", e));
                    }
                }
                record.warnings = warnings;

                let model = Arc::new(model);
                entry.update(|state| {
                    state.record = record;
                    state.estimator = Some(model);
                });
                let record = entry.snapshot();

                info!(
                    model_id = %plan.model_id,
                    version = target_version,
                    job = plan.kind.as_str(),
                    accuracy = record.metrics.get("accuracy").copied().unwrap_or_default(),
                    elapsed = %format_duration(started.elapsed()),
                    "Model ready"
                );
                Ok(record)
            }
            Err(err) => {
                if let Some(run) = &run {
                    self.best_effort("tracker finish_run", &plan.model_id, &mut warnings, self.tracker.finish_run(run, RunStatus::Failed))
                        .await;
                }
                error!(model_id = %plan.model_id, job = plan.kind.as_str(), error = %err, "Training job failed");
                entry.update(|state| {
                    state.record.transition(ModelStatus::Failed);
                    state.record.last_error = Some(FailureReason {
                        kind: err.kind(),
                        message: err.to_string(),
                    });
                    state.record.warnings = warnings;
                    state.record.tracker_run_id = run.as_ref().map(|r| r.run_id.clone());
                });
                Err(err)
            }
        };

        drop(guard);
        result
    }

    /// Loads the dataset and fits on the blocking pool
    async fn fit(&self, plan: &JobPlan) -> Result<(TrainedModel, BTreeMap<String, f64>)> {
        let datasets = Arc::clone(&self.datasets);
        let dataset_id = plan.dataset_id.clone();
        let table = execute_with_timeout(
            async move { datasets.load(&dataset_id).await.map_err(Error::from) },
            self.settings.dataset_timeout,
            "dataset load",
        )
        .await?;

        let token = self.shutdown.child_token();
        let estimators = Arc::clone(&self.estimators);
        let spec = plan.spec.clone();
        let target = plan.target_column.clone();
        let fit_token = token.clone();
        let task = tokio::task::spawn_blocking(move || {
            let data = TrainingData::from_table(&table, target.as_deref())?;
            estimators.fit(&spec, &data, &fit_token)
        });

        let joined = match tokio::time::timeout(plan.timeout, task).await {
            Ok(joined) => joined,
            Err(_) => {
                token.cancel();
                return Err(Error::Timeout(format!(
                    "training '{}' exceeded {}",
                    plan.model_id,
                    format_duration(plan.timeout)
                )));
            }
        };

        match joined {
            Ok(Ok(outcome)) => Ok((outcome.model, outcome.metrics)),
            Ok(Err(_)) if self.shutdown.is_cancelled() => {
                Err(Error::Unavailable("training cancelled by shutdown".to_string()))
            }
            Ok(Err(e)) => Err(e),
            Err(join_error) => Err(Error::Internal(format!("fit task failed: {}", join_error))),
        }
    }

    async fn start_tracker_run(&self, plan: &JobPlan, version: u64, warnings: &mut Vec<String>) -> Option<RunHandle> {
        if !self.tracker.is_enabled() {
            return None;
        }
        let request = RunRequest {
            model_id: plan.model_id.clone(),
            model_type: plan.spec.model_type().to_string(),
            dataset_id: plan.dataset_id.clone(),
            version,
            hyperparameters: plan.spec.hyperparameters(),
            job: plan.kind.as_str().to_string(),
        };
        self.best_effort("tracker start_run", &plan.model_id, warnings, self.tracker.start_run(&request))
            .await
    }

    /// Awaits a gateway call bounded by the gateway timeout; failures become
    /// warnings
    async fn best_effort<T, F>(&self, what: &str, model_id: &str, warnings: &mut Vec<String>, call: F) -> Option<T>
    where
        F: Future<Output = GatewayResult<T>>,
    {
        match tokio::time::timeout(self.settings.gateway_timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(model_id, call = what, error = %e, "Best-effort call failed");
                warnings.push(format!("{} failed: {}", what, e));
                None
            }
            Err(_) => {
                warn!(model_id, call = what, "Best-effort call timed out");
                warnings.push(format!(
                    "{} timed out after {}",
                    what,
                    format_duration(self.settings.gateway_timeout)
                ));
                None
            }
        }
    }

    /// Predicts with the published estimator of a model
    pub async fn predict(&self, model_id: &str, input: PredictInput, timeout: Option<Duration>) -> Result<PredictResponse> {
        let entry = self.registry.require(model_id)?;
        let stale_ok = self.settings.serve_stale_during_retrain;

        let (model, version) = entry.read(|state| match (state.record.status, &state.estimator) {
            (ModelStatus::Ready, Some(model)) => Ok((Arc::clone(model), state.record.version)),
            (ModelStatus::Retraining, Some(model)) if stale_ok => Ok((Arc::clone(model), state.record.version)),
            (ModelStatus::Deleted, _) => Err(Error::NotFound(format!("model '{}'", model_id))),
            (status, _) => Err(Error::NotReady(format!(
                "model '{}' is {} and cannot serve predictions",
                model_id, status
            ))),
        })?;

        let estimators = Arc::clone(&self.estimators);
        let task = tokio::task::spawn_blocking(move || estimators.predict(&model, &input));
        let predictions = execute_with_timeout(
            async move {
                task.await
                    .map_err(|e| Error::Internal(format!("predict task failed: {}", e)))?
            },
            timeout.unwrap_or(self.settings.prediction_timeout),
            "predict",
        )
        .await?;

        debug!(model_id, version, rows = predictions.len(), "Predictions served");
        Ok(PredictResponse {
            model_id: model_id.to_string(),
            version,
            predictions,
        })
    }

    /// Deletes a model and retires its id
    pub async fn delete(&self, model_id: &str) -> Result<ModelRecord> {
        self.ensure_running()?;
        let entry = self.registry.require(model_id)?;
        let guard = entry.try_begin_job()?;

        let record = entry.update(|state| {
            state.record.transition(ModelStatus::Deleted);
            state.estimator = None;
            state.record.clone()
        });
        self.registry.remove_and_retire(model_id);
        drop(guard);

        if let Some(archive) = &self.archive {
            if let Err(e) = archive.remove(model_id).await {
                warn!(model_id, error = %e, "Failed to remove archived model");
            }
        }

        info!(model_id, version = record.version, "Model deleted");
        Ok(record)
    }

    /// Record of one model in any status
    pub fn get_model(&self, model_id: &str) -> Result<ModelRecord> {
        Ok(self.registry.require(model_id)?.snapshot())
    }

    /// Models ordered by creation time; only `Ready` ones unless
    /// `include_unready`
    pub fn list_models(&self, include_unready: bool) -> Vec<ModelRecord> {
        let mut records: Vec<ModelRecord> = self
            .registry
            .entries()
            .into_iter()
            .map(|entry| entry.snapshot())
            .filter(|r| include_unready || r.status == ModelStatus::Ready)
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.model_id.cmp(&b.model_id)));
        records
    }

    /// Datasets in the dataset store
    pub async fn list_datasets(&self) -> Result<Vec<DatasetDescriptor>> {
        let datasets = Arc::clone(&self.datasets);
        execute_with_timeout(
            async move { datasets.list().await.map_err(Error::from) },
            self.settings.dataset_timeout,
            "dataset list",
        )
        .await
    }

    /// One dataset's descriptor
    pub async fn get_dataset(&self, dataset_id: &str) -> Result<DatasetDescriptor> {
        let datasets = Arc::clone(&self.datasets);
        let id = dataset_id.to_string();
        execute_with_timeout(
            async move { datasets.describe(&id).await.map_err(Error::from) },
            self.settings.dataset_timeout,
            "dataset describe",
        )
        .await
    }

    /// Stores a dataset after checking its shape
    pub async fn upload_dataset(&self, dataset_id: &str, table: DataTable, format: DatasetFormat) -> Result<DatasetDescriptor> {
        self.ensure_running()?;
        table.validate()?;
        if table.row_count() == 0 {
            return Err(Error::InvalidArgument("dataset has no rows".to_string()));
        }
        let datasets = Arc::clone(&self.datasets);
        let id = dataset_id.to_string();
        let descriptor = execute_with_timeout(
            async move { datasets.put(&id, &table, format).await.map_err(Error::from) },
            self.settings.dataset_timeout,
            "dataset put",
        )
        .await?;
        info!(dataset_id = %descriptor.dataset_id, rows = descriptor.row_count, version = %descriptor.version, "Dataset uploaded");
        Ok(descriptor)
    }

    /// Removes a dataset from the store; models trained on it keep working
    pub async fn delete_dataset(&self, dataset_id: &str) -> Result<()> {
        self.ensure_running()?;
        let datasets = Arc::clone(&self.datasets);
        let id = dataset_id.to_string();
        execute_with_timeout(
            async move { datasets.delete(&id).await.map_err(Error::from) },
            self.settings.dataset_timeout,
            "dataset delete",
        )
        .await?;
        info!(dataset_id, "Dataset deleted");
        Ok(())
    }

    /// Health snapshot; never fails
    pub async fn health(&self) -> HealthReport {
        let mut models: BTreeMap<String, usize> = BTreeMap::new();
        for entry in self.registry.entries() {
            let status = entry.read(|s| s.record.status);
            *models.entry(status.to_string()).or_default() += 1;
        }

        let store_ping = tokio::time::timeout(self.settings.gateway_timeout, self.datasets.ping()).await;
        let dataset_store = gateway_health(self.datasets.name(), true, store_ping);

        let tracker = if self.tracker.is_enabled() {
            let ping = tokio::time::timeout(self.settings.gateway_timeout, self.tracker.ping()).await;
            gateway_health("experiment_tracker", true, ping)
        } else {
            GatewayHealth {
                name: "experiment_tracker".to_string(),
                enabled: false,
                reachable: false,
                detail: Some("tracking disabled".to_string()),
            }
        };

        let status = if self.shutdown.is_cancelled() {
            "shutting_down"
        } else if !dataset_store.reachable || (tracker.enabled && !tracker.reachable) {
            "degraded"
        } else {
            "healthy"
        };

        let max = self.settings.max_concurrent_jobs;
        HealthReport {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            models,
            active_jobs: max.saturating_sub(self.job_slots.available_permits()),
            max_concurrent_jobs: max,
            dataset_store,
            tracker,
        }
    }

    /// Cancels running jobs and refuses new mutations, then waits briefly
    /// for jobs to release their slots
    pub async fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        info!("Model service shutting down");
        self.shutdown.cancel();

        let max = self.settings.max_concurrent_jobs as u32;
        match tokio::time::timeout(SHUTDOWN_GRACE, self.job_slots.acquire_many(max)).await {
            Ok(Ok(permits)) => drop(permits),
            Ok(Err(_)) => {}
            Err(_) => warn!("Training jobs still running after {}", format_duration(SHUTDOWN_GRACE)),
        }
    }

    /// Whether `shutdown` has been called
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

fn gateway_health(
    name: &str,
    enabled: bool,
    ping: std::result::Result<GatewayResult<()>, tokio::time::error::Elapsed>,
) -> GatewayHealth {
    let (reachable, detail) = match ping {
        Ok(Ok(())) => (true, None),
        Ok(Err(e)) => (false, Some(e.to_string())),
        Err(_) => (false, Some("ping timed out".to_string())),
    };
    GatewayHealth {
        name: name.to_string(),
        enabled,
        reachable,
        detail,
    }
}
