//! Model lifecycle management for the MLOps service
//!
//! This crate owns the model registry and everything that changes it:
//! training and retraining jobs, predictions against published estimators,
//! deletion, and the on-disk archive that lets models survive restarts.

pub mod archive;
pub mod record;
pub mod registry;
pub mod service;

// Re-export commonly used types
pub use archive::{ArchivedModel, ModelArchive};
pub use record::{FailureReason, ModelRecord, ModelStatus};
pub use registry::ModelRegistry;
pub use service::{
    GatewayHealth, HealthReport, LifecycleSettings, ModelService, PredictResponse, RetrainRequest, TrainRequest,
};
