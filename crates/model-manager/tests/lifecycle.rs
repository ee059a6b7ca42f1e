use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{ClassLabel, DataTable, DatasetDescriptor, DatasetFormat, Error, ErrorKind, HyperparameterBag};
use estimators::PredictInput;
use gateways::{
    DatasetStore, ExperimentTracker, GatewayError, GatewayResult, InMemoryDatasetStore, NoopTracker, RunHandle,
    RunRequest, RunStatus,
};
use model_manager::{
    LifecycleSettings, ModelArchive, ModelService, ModelStatus, RetrainRequest, TrainRequest,
};
use serde_json::{json, Value};
use tokio::sync::Notify;

fn blobs() -> DataTable {
    let mut rows = Vec::new();
    for i in 0..10 {
        let f = i as f64 * 0.1;
        rows.push(vec![json!(f), json!(1.0 - f), json!("low")]);
        rows.push(vec![json!(10.0 + f), json!(9.0 + f), json!("high")]);
    }
    DataTable::new(vec!["x1".into(), "x2".into(), "band".into()], rows).unwrap()
}

fn bag(value: Value) -> HyperparameterBag {
    value.as_object().cloned().unwrap()
}

fn settings() -> LifecycleSettings {
    LifecycleSettings {
        max_concurrent_jobs: 4,
        training_timeout: Duration::from_secs(60),
        prediction_timeout: Duration::from_secs(10),
        dataset_timeout: Duration::from_secs(10),
        gateway_timeout: Duration::from_secs(2),
        serve_stale_during_retrain: false,
    }
}

fn memory_store() -> Arc<InMemoryDatasetStore> {
    let store = Arc::new(InMemoryDatasetStore::new());
    store.insert("bands", blobs()).unwrap();
    store
}

fn service_with(store: Arc<dyn DatasetStore>, settings: LifecycleSettings) -> Arc<ModelService> {
    Arc::new(ModelService::new(settings, store, Arc::new(NoopTracker)))
}

fn train_request(model_id: &str, model_type: &str) -> TrainRequest {
    TrainRequest {
        model_id: Some(model_id.to_string()),
        model_type: model_type.to_string(),
        hyperparameters: HyperparameterBag::new(),
        dataset_id: "bands".to_string(),
        target_column: Some("band".to_string()),
        timeout: None,
    }
}

fn probe() -> PredictInput {
    PredictInput::Rows(vec![vec![0.2, 0.8], vec![10.5, 9.5]])
}

/// Dataset store whose `load` blocks until released
struct GatedStore {
    inner: InMemoryDatasetStore,
    entered: Notify,
    release: Notify,
    gate_open: AtomicBool,
}

impl GatedStore {
    fn new() -> Arc<Self> {
        let inner = InMemoryDatasetStore::new();
        inner.insert("bands", blobs()).unwrap();
        Arc::new(Self {
            inner,
            entered: Notify::new(),
            release: Notify::new(),
            gate_open: AtomicBool::new(false),
        })
    }

    fn open(&self) {
        self.gate_open.store(true, Ordering::SeqCst);
        self.release.notify_waiters();
    }
}

#[async_trait]
impl DatasetStore for GatedStore {
    fn name(&self) -> &str {
        "gated"
    }

    async fn load(&self, dataset_id: &str) -> GatewayResult<DataTable> {
        if !self.gate_open.load(Ordering::SeqCst) {
            let released = self.release.notified();
            self.entered.notify_one();
            if !self.gate_open.load(Ordering::SeqCst) {
                released.await;
            }
        }
        self.inner.load(dataset_id).await
    }

    async fn describe(&self, dataset_id: &str) -> GatewayResult<DatasetDescriptor> {
        self.inner.describe(dataset_id).await
    }

    async fn list(&self) -> GatewayResult<Vec<DatasetDescriptor>> {
        self.inner.list().await
    }

    async fn put(&self, dataset_id: &str, table: &DataTable, format: DatasetFormat) -> GatewayResult<DatasetDescriptor> {
        self.inner.put(dataset_id, table, format).await
    }

    async fn delete(&self, dataset_id: &str) -> GatewayResult<()> {
        self.inner.delete(dataset_id).await
    }

    async fn ping(&self) -> GatewayResult<()> {
        Ok(())
    }
}

/// Tracker that accepts runs but rejects metrics
#[derive(Default)]
struct FlakyTracker {
    finished: parking_lot::Mutex<Vec<RunStatus>>,
}

#[async_trait]
impl ExperimentTracker for FlakyTracker {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn start_run(&self, request: &RunRequest) -> GatewayResult<RunHandle> {
        Ok(RunHandle {
            run_id: format!("run-{}-{}", request.model_id, request.version),
        })
    }

    async fn log_metrics(&self, _run: &RunHandle, _metrics: &BTreeMap<String, f64>) -> GatewayResult<()> {
        Err(GatewayError::Unavailable("metrics endpoint down".to_string()))
    }

    async fn finish_run(&self, _run: &RunHandle, status: RunStatus) -> GatewayResult<()> {
        self.finished.lock().push(status);
        Ok(())
    }

    async fn register_model(&self, _run: &RunHandle, _model_id: &str, _version: u64) -> GatewayResult<()> {
        Ok(())
    }

    async fn ping(&self) -> GatewayResult<()> {
        Err(GatewayError::Unavailable("tracker offline".to_string()))
    }
}

#[tokio::test]
async fn test_train_then_predict() {
    let service = service_with(memory_store(), settings());

    let record = service.train(train_request("bands-lr", "logistic_regression")).await.unwrap();
    assert_eq!(record.status, ModelStatus::Ready);
    assert_eq!(record.version, 1);
    assert_eq!(record.feature_names, vec!["x1".to_string(), "x2".to_string()]);
    assert_eq!(record.target_column.as_deref(), Some("band"));
    assert!(record.metrics.contains_key("accuracy"));
    assert!(record.last_error.is_none());

    let response = service.predict("bands-lr", probe(), None).await.unwrap();
    assert_eq!(response.version, 1);
    assert_eq!(
        response.predictions,
        vec![ClassLabel::Text("low".into()), ClassLabel::Text("high".into())]
    );

    let mut named = HashMap::new();
    named.insert("x2".to_string(), 9.0);
    named.insert("x1".to_string(), 11.0);
    let response = service.predict("bands-lr", PredictInput::Records(vec![named]), None).await.unwrap();
    assert_eq!(response.predictions, vec![ClassLabel::Text("high".into())]);
}

#[tokio::test]
async fn test_generated_id_and_defaults() {
    let service = service_with(memory_store(), settings());
    let mut request = train_request("unused", "random-forest");
    request.model_id = None;
    request.target_column = None;
    request.hyperparameters = bag(json!({"n_estimators": 5}));

    let record = service.train(request).await.unwrap();
    assert!(record.model_id.starts_with("model-"));
    assert_eq!(record.target_column.as_deref(), Some("band"));
    assert_eq!(record.spec.hyperparameters()["n_estimators"], 5);
    assert_eq!(record.spec.hyperparameters()["bootstrap"], true);
}

#[tokio::test]
async fn test_invalid_hyperparameters_never_touch_the_dataset_store() {
    let store = memory_store();
    let service = service_with(store.clone(), settings());

    let mut request = train_request("bad", "logistic_regression");
    request.hyperparameters = bag(json!({"C": -1.0}));
    assert!(matches!(service.train(request).await, Err(Error::InvalidHyperparameters(_))));

    let mut request = train_request("bad", "random_forest");
    request.hyperparameters = bag(json!({"n_trees": 10}));
    assert!(matches!(service.train(request).await, Err(Error::InvalidHyperparameters(_))));

    let request = train_request("bad", "svm");
    assert!(matches!(service.train(request).await, Err(Error::InvalidHyperparameters(_))));

    assert_eq!(store.load_calls(), 0);
    assert!(matches!(service.get_model("bad"), Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_duplicate_and_malformed_ids() {
    let service = service_with(memory_store(), settings());
    service.train(train_request("dup", "logistic_regression")).await.unwrap();

    let err = service.train(train_request("dup", "random_forest")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    let mut request = train_request("dup", "logistic_regression");
    request.hyperparameters = bag(json!({"C": -1.0}));
    let err = service.train(request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    let err = service.train(train_request("bad id!", "random_forest")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn test_missing_dataset_marks_model_failed() {
    let service = service_with(memory_store(), settings());
    let mut request = train_request("orphan", "logistic_regression");
    request.dataset_id = "nope".to_string();

    let err = service.train(request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let record = service.get_model("orphan").unwrap();
    assert_eq!(record.status, ModelStatus::Failed);
    assert_eq!(record.version, 0);
    assert_eq!(record.last_error.unwrap().kind, ErrorKind::NotFound);

    let err = service.predict("orphan", probe(), None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotReady);
}

#[tokio::test]
async fn test_unknown_target_column_fails_training() {
    let service = service_with(memory_store(), settings());
    let mut request = train_request("no-target", "logistic_regression");
    request.target_column = Some("colour".to_string());

    let err = service.train(request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(service.get_model("no-target").unwrap().status, ModelStatus::Failed);
}

#[tokio::test]
async fn test_busy_model_rejects_predict_retrain_and_delete() {
    let store = GatedStore::new();
    let service = service_with(store.clone(), settings());

    let job = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.train(train_request("slow", "logistic_regression")).await })
    };
    store.entered.notified().await;

    assert_eq!(service.get_model("slow").unwrap().status, ModelStatus::Training);
    assert!(!service.list_models(false).iter().any(|r| r.model_id == "slow"));
    assert_eq!(service.list_models(true).len(), 1);

    let err = service.predict("slow", probe(), None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotReady);
    let err = service.retrain("slow", RetrainRequest::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    let err = service.delete("slow").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    store.open();
    let record = job.await.unwrap().unwrap();
    assert_eq!(record.status, ModelStatus::Ready);
    assert!(service.delete("slow").await.is_ok());
}

#[tokio::test]
async fn test_concurrent_retrains_one_wins() {
    let store = GatedStore::new();
    store.open();
    let service = service_with(store.clone(), settings());
    service.train(train_request("shared", "random_forest")).await.unwrap();

    store.gate_open.store(false, Ordering::SeqCst);
    let first = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.retrain("shared", RetrainRequest::default()).await })
    };
    store.entered.notified().await;

    let second = service.retrain("shared", RetrainRequest::default()).await;
    assert_eq!(second.unwrap_err().kind(), ErrorKind::Conflict);
    assert_eq!(service.predict("shared", probe(), None).await.unwrap_err().kind(), ErrorKind::NotReady);

    store.open();
    let record = first.await.unwrap().unwrap();
    assert_eq!(record.model_id, "shared");
    assert_eq!(record.version, 2);
}

#[tokio::test]
async fn test_job_slots_bound_concurrent_training() {
    let store = GatedStore::new();
    let mut limits = settings();
    limits.max_concurrent_jobs = 1;
    let service = service_with(store.clone(), limits);

    let first = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.train(train_request("first", "logistic_regression")).await })
    };
    store.entered.notified().await;
    assert_eq!(service.health().await.active_jobs, 1);

    let err = service.train(train_request("second", "logistic_regression")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert!(matches!(service.get_model("second"), Err(Error::NotFound(_))));

    store.open();
    first.await.unwrap().unwrap();
    assert_eq!(service.health().await.active_jobs, 0);
    service.train(train_request("second", "logistic_regression")).await.unwrap();
}

#[tokio::test]
async fn test_dataset_timeout_fails_the_job() {
    let store = GatedStore::new();
    let mut limits = settings();
    limits.dataset_timeout = Duration::from_millis(50);
    let service = service_with(store, limits);

    let err = service.train(train_request("stuck", "logistic_regression")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);

    let record = service.get_model("stuck").unwrap();
    assert_eq!(record.status, ModelStatus::Failed);
    assert_eq!(record.last_error.unwrap().kind, ErrorKind::Timeout);
}

/// Four noisy features, two interleaved classes; deep trees, slow to grow
fn noisy(n: usize) -> DataTable {
    let rows = (0..n)
        .map(|i| {
            let f = i as f64;
            vec![
                json!((f * 0.618).fract()),
                json!((f * 0.414).fract()),
                json!((f * 0.732).fract()),
                json!((f * 0.236).fract()),
                json!(if (i * 7919) % 13 < 6 { "a" } else { "b" }),
            ]
        })
        .collect();
    DataTable::new(
        vec!["f1".into(), "f2".into(), "f3".into(), "f4".into(), "class".into()],
        rows,
    )
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fit_timeout_fails_the_job() {
    let store = memory_store();
    store.insert("noisy", noisy(2000)).unwrap();
    let service = service_with(store, settings());

    let mut request = train_request("slow-rf", "random_forest");
    request.dataset_id = "noisy".to_string();
    request.target_column = Some("class".to_string());
    request.hyperparameters = bag(json!({"n_estimators": 5000, "max_features": "all", "bootstrap": false}));
    request.timeout = Some(Duration::from_millis(20));

    let err = service.train(request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);

    let record = service.get_model("slow-rf").unwrap();
    assert_eq!(record.status, ModelStatus::Failed);
    assert_eq!(record.version, 0);
    assert_eq!(record.last_error.unwrap().kind, ErrorKind::Timeout);

    let record = service
        .retrain(
            "slow-rf",
            RetrainRequest {
                hyperparameters: Some(bag(json!({"n_estimators": 3}))),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(record.status, ModelStatus::Ready);
    assert_eq!(record.version, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_prediction_timeout_leaves_the_model_ready() {
    let service = service_with(memory_store(), settings());
    let mut request = train_request("big-rf", "random_forest");
    request.hyperparameters = bag(json!({"n_estimators": 200, "bootstrap": false}));
    service.train(request).await.unwrap();

    let rows: Vec<Vec<f64>> = (0..200_000).map(|i| vec![(i % 11) as f64, (i % 7) as f64]).collect();
    let err = service
        .predict("big-rf", PredictInput::Rows(rows), Some(Duration::from_micros(1)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);

    assert_eq!(service.get_model("big-rf").unwrap().status, ModelStatus::Ready);
    let response = service.predict("big-rf", probe(), None).await.unwrap();
    assert_eq!(response.predictions.len(), 2);
}

#[tokio::test]
async fn test_retrain_bumps_version_and_keeps_settings() {
    let service = service_with(memory_store(), settings());
    service.train(train_request("rf", "random_forest")).await.unwrap();

    let record = service
        .retrain(
            "rf",
            RetrainRequest {
                hyperparameters: Some(bag(json!({"n_estimators": 7, "max_depth": 3}))),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(record.version, 2);
    assert_eq!(record.status, ModelStatus::Ready);
    assert_eq!(record.dataset_id, "bands");
    assert_eq!(record.target_column.as_deref(), Some("band"));
    assert_eq!(record.spec.hyperparameters()["n_estimators"], 7);

    let record = service.retrain("rf", RetrainRequest::default()).await.unwrap();
    assert_eq!(record.version, 3);
    assert_eq!(record.spec.hyperparameters()["max_depth"], 3);

    let response = service.predict("rf", probe(), None).await.unwrap();
    assert_eq!(response.version, 3);

    let err = service
        .retrain(
            "rf",
            RetrainRequest {
                hyperparameters: Some(bag(json!({"C": 1.0}))),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidHyperparameters);
    assert_eq!(service.get_model("rf").unwrap().status, ModelStatus::Ready);
}

#[tokio::test]
async fn test_failed_retrain_keeps_version_and_can_recover() {
    let service = service_with(memory_store(), settings());
    service.train(train_request("lr", "logistic_regression")).await.unwrap();

    let err = service
        .retrain(
            "lr",
            RetrainRequest {
                dataset_id: Some("missing".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let record = service.get_model("lr").unwrap();
    assert_eq!(record.status, ModelStatus::Failed);
    assert_eq!(record.version, 1);
    assert_eq!(record.dataset_id, "bands");

    let record = service.retrain("lr", RetrainRequest::default()).await.unwrap();
    assert_eq!(record.status, ModelStatus::Ready);
    assert_eq!(record.version, 2);
    assert!(record.last_error.is_none());
}

#[tokio::test]
async fn test_stale_serving_during_retrain() {
    let store = GatedStore::new();
    store.open();
    let mut limits = settings();
    limits.serve_stale_during_retrain = true;
    let service = service_with(store.clone(), limits);
    service.train(train_request("stale", "logistic_regression")).await.unwrap();

    store.gate_open.store(false, Ordering::SeqCst);
    let job = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.retrain("stale", RetrainRequest::default()).await })
    };
    store.entered.notified().await;

    assert_eq!(service.get_model("stale").unwrap().status, ModelStatus::Retraining);
    let response = service.predict("stale", probe(), None).await.unwrap();
    assert_eq!(response.version, 1);

    store.open();
    assert_eq!(job.await.unwrap().unwrap().version, 2);
}

#[tokio::test]
async fn test_delete_retires_the_id() {
    let service = service_with(memory_store(), settings());
    service.train(train_request("gone", "logistic_regression")).await.unwrap();

    let record = service.delete("gone").await.unwrap();
    assert_eq!(record.status, ModelStatus::Deleted);

    assert_eq!(service.get_model("gone").unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(service.predict("gone", probe(), None).await.unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(service.delete("gone").await.unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(
        service.retrain("gone", RetrainRequest::default()).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );

    let err = service.train(train_request("gone", "logistic_regression")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
}

#[tokio::test]
async fn test_tracker_failures_become_warnings() {
    let tracker = Arc::new(FlakyTracker::default());
    let service = Arc::new(ModelService::new(settings(), memory_store(), tracker.clone()));

    let record = service.train(train_request("tracked", "logistic_regression")).await.unwrap();
    assert_eq!(record.status, ModelStatus::Ready);
    assert_eq!(record.tracker_run_id.as_deref(), Some("run-tracked-1"));
    assert_eq!(record.warnings.len(), 1);
    assert!(record.warnings[0].contains("log_metrics"));
    assert_eq!(tracker.finished.lock().clone(), vec![RunStatus::Completed]);

    let health = service.health().await;
    assert_eq!(health.status, "degraded");
    assert!(health.tracker.enabled);
    assert!(!health.tracker.reachable);
}

#[tokio::test]
async fn test_list_models_is_ordered_by_creation() {
    let service = service_with(memory_store(), settings());
    for id in ["c", "a", "b"] {
        service.train(train_request(id, "logistic_regression")).await.unwrap();
    }
    let mut request = train_request("broken", "logistic_regression");
    request.dataset_id = "missing".into();
    let _ = service.train(request).await;

    let ids: Vec<String> = service.list_models(false).into_iter().map(|r| r.model_id).collect();
    assert_eq!(ids, vec!["c", "a", "b"]);
    assert_eq!(service.list_models(true).len(), 4);
}

#[tokio::test]
async fn test_archive_restores_models_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store = memory_store();

    {
        let service = Arc::new(
            ModelService::new(settings(), store.clone(), Arc::new(NoopTracker))
                .with_archive(ModelArchive::open(dir.path()).unwrap())
                .unwrap(),
        );
        service.train(train_request("kept", "random_forest")).await.unwrap();
        service.train(train_request("dropped", "logistic_regression")).await.unwrap();
        service.delete("dropped").await.unwrap();
    }

    let service = ModelService::new(settings(), store, Arc::new(NoopTracker))
        .with_archive(ModelArchive::open(dir.path()).unwrap())
        .unwrap();
    let ids: Vec<String> = service.list_models(false).into_iter().map(|r| r.model_id).collect();
    assert_eq!(ids, vec!["kept"]);

    let response = service.predict("kept", probe(), None).await.unwrap();
    assert_eq!(response.version, 1);
    assert_eq!(response.predictions[1], ClassLabel::Text("high".into()));
}

#[tokio::test]
async fn test_datasets_round_trip_through_the_service() {
    let service = service_with(Arc::new(InMemoryDatasetStore::new()), settings());

    let descriptor = service.upload_dataset("bands", blobs(), DatasetFormat::Memory).await.unwrap();
    assert_eq!(descriptor.row_count, 20);
    assert_eq!(service.list_datasets().await.unwrap().len(), 1);
    assert_eq!(service.get_dataset("bands").await.unwrap().version, descriptor.version);

    let empty = DataTable::new(vec!["x".into()], Vec::new()).unwrap();
    let err = service.upload_dataset("empty", empty, DatasetFormat::Memory).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    service.train(train_request("from-upload", "logistic_regression")).await.unwrap();
    service.delete_dataset("bands").await.unwrap();
    assert_eq!(service.get_dataset("bands").await.unwrap_err().kind(), ErrorKind::NotFound);
    assert!(service.predict("from-upload", probe(), None).await.is_ok());
}

#[tokio::test]
async fn test_health_reports_store_outage() {
    let store = memory_store();
    let service = service_with(store.clone(), settings());
    service.train(train_request("h", "logistic_regression")).await.unwrap();

    let health = service.health().await;
    assert_eq!(health.status, "healthy");
    assert_eq!(health.models.get("ready"), Some(&1));
    assert!(health.dataset_store.reachable);
    assert!(!health.tracker.enabled);

    store.set_offline(true);
    let health = service.health().await;
    assert_eq!(health.status, "degraded");
    assert!(!health.dataset_store.reachable);
}

#[tokio::test]
async fn test_shutdown_refuses_new_work() {
    let service = service_with(memory_store(), settings());
    service.train(train_request("before", "logistic_regression")).await.unwrap();

    service.shutdown().await;
    assert!(service.is_shutting_down());
    assert_eq!(service.health().await.status, "shutting_down");

    let err = service.train(train_request("after", "logistic_regression")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert!(service.predict("before", probe(), None).await.is_ok());
}
