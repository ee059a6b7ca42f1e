//! Common data models for the model lifecycle service
//!
//! Tabular datasets and their descriptors, shared by the dataset store
//! gateway, the estimator registry and the transports.

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// In-memory tabular dataset
///
/// Cells are JSON scalars; numeric columns are used as features and the
/// target column may hold numbers or text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    /// Column names, in order
    pub columns: Vec<String>,
    /// Row-major cell values
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl DataTable {
    /// Creates a table, checking that every row matches the header width
    pub fn new(columns: Vec<String>, rows: Vec<Vec<serde_json::Value>>) -> Result<Self> {
        let table = Self { columns, rows };
        table.validate()?;
        Ok(table)
    }

    /// Checks header uniqueness and row widths
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(Error::InvalidArgument("dataset has no columns".to_string()));
        }
        for (i, name) in self.columns.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(Error::InvalidArgument(format!("column {} has an empty name", i)));
            }
            if self.columns[..i].contains(name) {
                return Err(Error::InvalidArgument(format!("duplicate column: {}", name)));
            }
        }
        for (i, row) in self.rows.iter().enumerate() {
            if row.len() != self.columns.len() {
                return Err(Error::InvalidArgument(format!(
                    "row {} has {} cells, expected {}",
                    i,
                    row.len(),
                    self.columns.len()
                )));
            }
        }
        Ok(())
    }

    /// Number of data rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Position of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Storage format of a dataset file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetFormat {
    Csv,
    Json,
    /// Held in memory only
    Memory,
}

impl DatasetFormat {
    /// Stable name used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetFormat::Csv => "csv",
            DatasetFormat::Json => "json",
            DatasetFormat::Memory => "memory",
        }
    }
}

impl std::str::FromStr for DatasetFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(DatasetFormat::Csv),
            "json" => Ok(DatasetFormat::Json),
            "memory" => Ok(DatasetFormat::Memory),
            other => Err(Error::InvalidArgument(format!(
                "unknown dataset format '{}', expected csv or json",
                other
            ))),
        }
    }
}

/// Description of a dataset held by the dataset store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    /// Dataset identifier
    pub dataset_id: String,
    /// Column names
    pub columns: Vec<String>,
    /// Number of data rows
    pub row_count: usize,
    /// Stored size in bytes
    pub size_bytes: u64,
    /// Content version tag
    pub version: String,
    /// Storage format
    pub format: DatasetFormat,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}
