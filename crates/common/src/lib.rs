//! Common utilities and types for the model lifecycle service
//!
//! This crate provides the error taxonomy, tabular dataset types and small
//! helpers shared by every other crate in the workspace.

pub mod error;
pub mod models;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use error::{Error, ErrorKind, Result};
pub use models::*;
pub use types::*;
