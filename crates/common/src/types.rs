//! Common types for the model lifecycle service
//!
//! This module defines small value types shared by the estimator registry,
//! the lifecycle service and the transport adapters.

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

/// Loosely-typed hyperparameter bag as accepted from the transports
pub type HyperparameterBag = serde_json::Map<String, serde_json::Value>;

/// Supported estimator families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Multinomial logistic regression
    LogisticRegression,
    /// Random forest classifier
    RandomForest,
}

impl ModelType {
    /// All registered model types, in listing order
    pub const ALL: [ModelType; 2] = [ModelType::LogisticRegression, ModelType::RandomForest];

    /// Canonical identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::LogisticRegression => "logistic_regression",
            ModelType::RandomForest => "random_forest",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "logistic_regression" | "logisticregression" => Ok(ModelType::LogisticRegression),
            "random_forest" | "randomforest" => Ok(ModelType::RandomForest),
            _ => Err(format!("Unknown model type: {}", s)),
        }
    }
}

/// Class label produced by a classifier
///
/// Integral numeric targets keep their integer value, everything else is
/// carried as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClassLabel {
    /// Integer class
    Int(i64),
    /// Text class
    Text(String),
}

impl ClassLabel {
    /// Builds a label from a dataset cell, `None` for nulls and nested values
    pub fn from_cell(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(ClassLabel::Int(i))
                } else {
                    let f = n.as_f64()?;
                    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                        Some(ClassLabel::Int(f as i64))
                    } else {
                        Some(ClassLabel::Text(n.to_string()))
                    }
                }
            }
            serde_json::Value::String(s) => Some(ClassLabel::Text(s.clone())),
            serde_json::Value::Bool(b) => Some(ClassLabel::Int(i64::from(*b))),
            _ => None,
        }
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassLabel::Int(i) => write!(f, "{}", i),
            ClassLabel::Text(s) => f.write_str(s),
        }
    }
}
