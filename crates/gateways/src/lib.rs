//! Gateways to the services around the model lifecycle service
//!
//! This crate provides the [`DatasetStore`] and [`ExperimentTracker`]
//! interfaces the lifecycle service talks to, with a filesystem and an
//! in-memory dataset store, and an HTTP and a no-op tracker.

pub mod dataset;
pub mod error;
pub mod table_codec;
pub mod tracker;

// Re-export commonly used types
pub use dataset::{DatasetStore, FsDatasetStore, InMemoryDatasetStore};
pub use error::{GatewayError, GatewayResult};
pub use tracker::{
    ExperimentTracker, HttpExperimentTracker, NoopTracker, RunHandle, RunRequest, RunStatus,
};
