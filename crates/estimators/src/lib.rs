//! Estimator registry for the model lifecycle service
//!
//! This crate owns everything that is specific to a model family: the
//! catalogue of supported model types, their hyperparameter schemas, the
//! validation of loosely-typed hyperparameter bags into a typed
//! [`EstimatorSpec`], and the fit / predict / evaluate contract.

pub mod data;
pub mod forest;
pub mod logistic;
pub mod metrics;
pub mod registry;
pub mod schema;
pub mod spec;

// Re-export commonly used types
pub use data::{PredictInput, TrainingData};
pub use registry::{EstimatorRegistry, FitOutcome, FittedEstimator, TrainedModel};
pub use schema::{ModelTypeInfo, ParamSpec};
pub use spec::{EstimatorSpec, LogisticRegressionParams, MaxFeatures, RandomForestParams};
pub use tokio_util::sync::CancellationToken;
