//! Model registry implementation
//!
//! Records live in a concurrent map of `Arc<ModelEntry>`. Each entry guards
//! its record and published estimator with one lock and carries an atomic
//! job flag, so at most one mutating job runs per model.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use common::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use estimators::TrainedModel;
use parking_lot::RwLock;
use tokio::sync::OwnedSemaphorePermit;

use crate::record::ModelRecord;

/// Record plus the estimator snapshot published with it
#[derive(Debug, Clone)]
pub struct EntryState {
    /// Committed record
    pub record: ModelRecord,
    /// Estimator served for predictions, replaced together with the record
    pub estimator: Option<Arc<TrainedModel>>,
}

/// One model in the registry
#[derive(Debug)]
pub struct ModelEntry {
    state: RwLock<EntryState>,
    job_active: AtomicBool,
}

impl ModelEntry {
    /// Creates an entry with no published estimator
    pub fn new(record: ModelRecord) -> Self {
        Self::with_estimator(record, None)
    }

    /// Creates an entry with an already fitted estimator
    pub fn with_estimator(record: ModelRecord, estimator: Option<Arc<TrainedModel>>) -> Self {
        Self {
            state: RwLock::new(EntryState { record, estimator }),
            job_active: AtomicBool::new(false),
        }
    }

    /// Clone of the committed record
    pub fn snapshot(&self) -> ModelRecord {
        self.state.read().record.clone()
    }

    /// Runs `f` under the read lock
    pub fn read<R>(&self, f: impl FnOnce(&EntryState) -> R) -> R {
        f(&self.state.read())
    }

    /// Runs `f` under the write lock and stamps `updated_at`
    pub fn update<R>(&self, f: impl FnOnce(&mut EntryState) -> R) -> R {
        let mut state = self.state.write();
        let out = f(&mut state);
        state.record.updated_at = Utc::now();
        out
    }

    /// Claims the model for a job, failing fast with `Conflict` if another
    /// job holds it
    pub fn try_begin_job(self: &Arc<Self>) -> Result<JobGuard> {
        self.job_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                let record = self.snapshot();
                Error::Conflict(format!(
                    "model '{}' is busy ({}); retry when the current job finishes",
                    record.model_id, record.status
                ))
            })?;
        Ok(JobGuard {
            entry: Arc::clone(self),
            permit: None,
        })
    }
}

/// Exclusive claim on a model for the duration of a job
///
/// Dropping the guard clears the job flag and then frees the job slot.
#[derive(Debug)]
pub struct JobGuard {
    entry: Arc<ModelEntry>,
    permit: Option<OwnedSemaphorePermit>,
}

impl JobGuard {
    /// Ties a job slot to this guard
    pub fn attach_permit(&mut self, permit: OwnedSemaphorePermit) {
        self.permit = Some(permit);
    }

    /// The claimed entry
    pub fn entry(&self) -> &Arc<ModelEntry> {
        &self.entry
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.entry.job_active.store(false, Ordering::Release);
    }
}

/// Registry of models plus the ids of deleted ones
#[derive(Debug, Default)]
pub struct ModelRegistry {
    entries: DashMap<String, Arc<ModelEntry>>,
    retired: DashSet<String>,
}

impl ModelRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for `model_id`
    pub fn get(&self, model_id: &str) -> Option<Arc<ModelEntry>> {
        self.entries.get(model_id).map(|e| Arc::clone(e.value()))
    }

    /// Entry for `model_id`, or `NotFound`
    pub fn require(&self, model_id: &str) -> Result<Arc<ModelEntry>> {
        self.get(model_id)
            .ok_or_else(|| Error::NotFound(format!("model '{}'", model_id)))
    }

    /// Whether `model_id` was deleted earlier in this process
    pub fn is_retired(&self, model_id: &str) -> bool {
        self.retired.contains(model_id)
    }

    /// Whether `model_id` is taken, live or retired
    pub fn is_taken(&self, model_id: &str) -> bool {
        self.entries.contains_key(model_id) || self.is_retired(model_id)
    }

    /// Inserts an entry under a fresh id
    pub fn insert_new(&self, model_id: &str, entry: Arc<ModelEntry>) -> Result<()> {
        if self.is_retired(model_id) {
            return Err(Error::AlreadyExists(format!(
                "model id '{}' belonged to a deleted model and cannot be reused",
                model_id
            )));
        }
        match self.entries.entry(model_id.to_string()) {
            Entry::Occupied(_) => Err(Error::AlreadyExists(format!("model '{}'", model_id))),
            Entry::Vacant(slot) => {
                slot.insert(entry);
                Ok(())
            }
        }
    }

    /// Removes `model_id` and retires the id
    pub fn remove_and_retire(&self, model_id: &str) -> Option<Arc<ModelEntry>> {
        self.retired.insert(model_id.to_string());
        self.entries.remove(model_id).map(|(_, entry)| entry)
    }

    /// Handles to every entry; each is read under its own lock afterwards
    pub fn entries(&self) -> Vec<Arc<ModelEntry>> {
        self.entries.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Number of live models
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry holds no models
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{HyperparameterBag, ModelType};
    use estimators::EstimatorSpec;

    fn entry(id: &str) -> Arc<ModelEntry> {
        let spec = EstimatorSpec::from_bag(ModelType::LogisticRegression, &HyperparameterBag::new()).unwrap();
        Arc::new(ModelEntry::new(ModelRecord::new(id.into(), spec, "iris".into(), None)))
    }

    #[test]
    fn test_job_guard_is_exclusive() {
        let e = entry("m");
        let guard = e.try_begin_job().unwrap();
        assert!(matches!(e.try_begin_job(), Err(Error::Conflict(_))));
        drop(guard);
        assert!(e.try_begin_job().is_ok());
    }

    #[tokio::test]
    async fn test_guard_releases_permit_on_drop() {
        let slots = Arc::new(tokio::sync::Semaphore::new(1));
        let e = entry("m");
        let mut guard = e.try_begin_job().unwrap();
        guard.attach_permit(Arc::clone(&slots).try_acquire_owned().unwrap());
        assert_eq!(slots.available_permits(), 0);
        drop(guard);
        assert_eq!(slots.available_permits(), 1);
    }

    #[test]
    fn test_insert_remove_retire() {
        let registry = ModelRegistry::new();
        registry.insert_new("a", entry("a")).unwrap();
        assert!(matches!(registry.insert_new("a", entry("a")), Err(Error::AlreadyExists(_))));
        assert_eq!(registry.len(), 1);

        assert!(registry.remove_and_retire("a").is_some());
        assert!(registry.get("a").is_none());
        assert!(matches!(registry.require("a"), Err(Error::NotFound(_))));
        assert!(registry.is_taken("a"));
        assert!(matches!(registry.insert_new("a", entry("a")), Err(Error::AlreadyExists(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_update_stamps_time() {
        let e = entry("m");
        let before = e.snapshot().updated_at;
        std::thread::sleep(std::time::Duration::from_millis(2));
        e.update(|s| s.record.warnings.push("w".into()));
        let after = e.snapshot();
        assert!(after.updated_at > before);
        assert_eq!(after.warnings, vec!["w".to_string()]);
    }
}
