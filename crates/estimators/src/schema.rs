//! Hyperparameter schemas
//!
//! Describes, per model type, which hyperparameters are accepted, their
//! value kind, the allowed range and the default used when a key is absent.

use common::ModelType;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One hyperparameter in a schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Key in the hyperparameter bag
    pub name: String,
    /// Value kind: `float`, `integer`, `boolean`, `integer_or_null` or `string_or_integer`
    pub kind: String,
    /// Human-readable range constraint
    pub constraint: String,
    /// Value used when the key is absent
    pub default: Value,
    /// What the parameter controls
    pub description: String,
}

impl ParamSpec {
    fn new(name: &str, kind: &str, constraint: &str, default: Value, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            constraint: constraint.to_string(),
            default,
            description: description.to_string(),
        }
    }
}

/// Catalogue entry for a supported model type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTypeInfo {
    /// Canonical identifier
    pub name: String,
    /// Accepted alternative spellings
    pub aliases: Vec<String>,
    /// Short description
    pub description: String,
    /// Hyperparameter schema
    pub hyperparameters: Vec<ParamSpec>,
}

impl ModelTypeInfo {
    /// Schema entry by key
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.hyperparameters.iter().find(|p| p.name == name)
    }
}

/// Schema for one model type
pub fn describe(model_type: ModelType) -> ModelTypeInfo {
    match model_type {
        ModelType::LogisticRegression => ModelTypeInfo {
            name: model_type.as_str().to_string(),
            aliases: vec!["LogisticRegression".to_string()],
            description: "Multinomial logistic regression trained by gradient descent on standardized features".to_string(),
            hyperparameters: vec![
                ParamSpec::new("C", "float", "> 0", json!(1.0), "Inverse of L2 regularization strength"),
                ParamSpec::new("max_iter", "integer", ">= 1", json!(100), "Maximum gradient descent iterations"),
                ParamSpec::new("learning_rate", "float", "> 0", json!(0.5), "Gradient descent step size"),
                ParamSpec::new("tol", "float", ">= 0", json!(1e-4), "Stop when the largest gradient component falls below this"),
                ParamSpec::new("fit_intercept", "boolean", "", json!(true), "Learn a per-class bias term"),
                ParamSpec::new("random_state", "integer", ">= 0", json!(42), "Seed for the train/test shuffle"),
            ],
        },
        ModelType::RandomForest => ModelTypeInfo {
            name: model_type.as_str().to_string(),
            aliases: vec!["RandomForest".to_string()],
            description: "Ensemble of Gini CART trees grown on bootstrap samples, majority vote".to_string(),
            hyperparameters: vec![
                ParamSpec::new("n_estimators", "integer", ">= 1", json!(100), "Number of trees"),
                ParamSpec::new("max_depth", "integer_or_null", ">= 1, null or \"unbounded\"", Value::Null, "Maximum tree depth"),
                ParamSpec::new("min_samples_split", "integer", ">= 2", json!(2), "Minimum samples required to split a node"),
                ParamSpec::new("min_samples_leaf", "integer", ">= 1", json!(1), "Minimum samples required in each leaf"),
                ParamSpec::new("max_features", "string_or_integer", "\"sqrt\", \"log2\", \"all\" or >= 1", json!("sqrt"), "Features considered per split"),
                ParamSpec::new("bootstrap", "boolean", "", json!(true), "Sample rows with replacement for each tree"),
                ParamSpec::new("random_state", "integer", ">= 0", json!(42), "Seed for shuffling, bootstrap and feature sampling"),
            ],
        },
    }
}

/// Schemas for every supported model type, in listing order
pub fn catalogue() -> Vec<ModelTypeInfo> {
    ModelType::ALL.iter().copied().map(describe).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_lists_both_families() {
        let types = catalogue();
        let names: Vec<&str> = types.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["logistic_regression", "random_forest"]);
        assert_eq!(types[0].param("C").unwrap().default, json!(1.0));
        assert_eq!(types[1].param("max_features").unwrap().default, json!("sqrt"));
        assert!(types[1].param("C").is_none());
    }
}
