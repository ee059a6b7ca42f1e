//! External API implementation for the MLOps service
//!
//! This crate provides the REST and gRPC front ends. Both are thin adapters
//! over one shared [`model_manager::ModelService`], so every operation is
//! reachable through either transport.

pub mod dto;
pub mod error;
pub mod grpc;
pub mod rest;

/// Generated `mlops.v1` protobuf types and service stubs
pub mod proto {
    tonic::include_proto!("mlops.v1");
}

// Re-export commonly used types
pub use error::{grpc_status, http_status, ApiError, ErrorBody};
pub use grpc::LifecycleGrpc;
pub use rest::router;
