//! Typed estimator specifications
//!
//! A hyperparameter bag is accepted at the transport boundary and turned into
//! an [`EstimatorSpec`] here. Nothing past this point handles untyped
//! hyperparameters, so a stored spec always satisfies its schema.

use std::fmt;

use common::{Error, HyperparameterBag, ModelType, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema;

/// Validated estimator configuration, tagged by model type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model_type", content = "hyperparameters", rename_all = "snake_case")]
pub enum EstimatorSpec {
    /// Logistic regression
    LogisticRegression(LogisticRegressionParams),
    /// Random forest
    RandomForest(RandomForestParams),
}

impl EstimatorSpec {
    /// Validates a bag against the schema of `model_type`
    ///
    /// Missing keys take schema defaults; unknown keys, wrong value kinds and
    /// out-of-range values are rejected with [`Error::InvalidHyperparameters`].
    pub fn from_bag(model_type: ModelType, bag: &HyperparameterBag) -> Result<Self> {
        let reader = BagReader::new(model_type, bag)?;
        match model_type {
            ModelType::LogisticRegression => Ok(EstimatorSpec::LogisticRegression(LogisticRegressionParams {
                c: reader.positive_f64("C", 1.0)?,
                max_iter: reader.int_at_least("max_iter", 100, 1)?,
                learning_rate: reader.positive_f64("learning_rate", 0.5)?,
                tol: reader.non_negative_f64("tol", 1e-4)?,
                fit_intercept: reader.boolean("fit_intercept", true)?,
                random_state: reader.int_at_least("random_state", 42, 0)? as u64,
            })),
            ModelType::RandomForest => Ok(EstimatorSpec::RandomForest(RandomForestParams {
                n_estimators: reader.int_at_least("n_estimators", 100, 1)?,
                max_depth: reader.max_depth("max_depth")?,
                min_samples_split: reader.int_at_least("min_samples_split", 2, 2)?,
                min_samples_leaf: reader.int_at_least("min_samples_leaf", 1, 1)?,
                max_features: reader.max_features("max_features")?,
                bootstrap: reader.boolean("bootstrap", true)?,
                random_state: reader.int_at_least("random_state", 42, 0)? as u64,
            })),
        }
    }

    /// Model family of this spec
    pub fn model_type(&self) -> ModelType {
        match self {
            EstimatorSpec::LogisticRegression(_) => ModelType::LogisticRegression,
            EstimatorSpec::RandomForest(_) => ModelType::RandomForest,
        }
    }

    /// Seed used for the train/test shuffle
    pub fn random_state(&self) -> u64 {
        match self {
            EstimatorSpec::LogisticRegression(p) => p.random_state,
            EstimatorSpec::RandomForest(p) => p.random_state,
        }
    }

    /// Fully-populated hyperparameters as a bag, for responses and the tracker
    pub fn hyperparameters(&self) -> HyperparameterBag {
        let value = match self {
            EstimatorSpec::LogisticRegression(p) => serde_json::to_value(p),
            EstimatorSpec::RandomForest(p) => serde_json::to_value(p),
        };
        match value {
            Ok(Value::Object(map)) => map,
            _ => HyperparameterBag::new(),
        }
    }
}

/// Logistic regression hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegressionParams {
    /// Inverse regularization strength
    #[serde(rename = "C")]
    pub c: f64,
    /// Iteration cap
    pub max_iter: usize,
    /// Step size
    pub learning_rate: f64,
    /// Gradient tolerance
    pub tol: f64,
    /// Learn intercepts
    pub fit_intercept: bool,
    /// Shuffle seed
    pub random_state: u64,
}

/// Random forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestParams {
    /// Number of trees
    pub n_estimators: usize,
    /// Depth cap, `None` for unbounded
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
    /// Features considered per split
    pub max_features: MaxFeatures,
    /// Bootstrap rows per tree
    pub bootstrap: bool,
    /// Base seed
    pub random_state: u64,
}

/// Number of features considered at each split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum MaxFeatures {
    Sqrt,
    Log2,
    All,
    Count(usize),
}

impl MaxFeatures {
    /// Resolves to a concrete count for `n_features` columns, never zero and
    /// never more than the number of columns
    pub fn resolve(&self, n_features: usize) -> usize {
        let n = n_features.max(1);
        let k = match self {
            MaxFeatures::Sqrt => (n as f64).sqrt().floor() as usize,
            MaxFeatures::Log2 => (n as f64).log2().floor() as usize,
            MaxFeatures::All => n,
            MaxFeatures::Count(k) => *k,
        };
        k.clamp(1, n)
    }
}

impl TryFrom<Value> for MaxFeatures {
    type Error = String;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        match &value {
            Value::String(s) => match s.to_lowercase().as_str() {
                "sqrt" | "auto" => Ok(MaxFeatures::Sqrt),
                "log2" => Ok(MaxFeatures::Log2),
                "all" => Ok(MaxFeatures::All),
                other => Err(format!("expected \"sqrt\", \"log2\", \"all\" or a positive integer, got \"{}\"", other)),
            },
            Value::Number(n) => match integral(n) {
                Some(k) if k >= 1 => Ok(MaxFeatures::Count(k as usize)),
                _ => Err(format!("expected a positive integer, got {}", n)),
            },
            other => Err(format!("expected a string or integer, got {}", kind_of(other))),
        }
    }
}

impl From<MaxFeatures> for Value {
    fn from(value: MaxFeatures) -> Self {
        match value {
            MaxFeatures::Sqrt => Value::from("sqrt"),
            MaxFeatures::Log2 => Value::from("log2"),
            MaxFeatures::All => Value::from("all"),
            MaxFeatures::Count(k) => Value::from(k),
        }
    }
}

impl fmt::Display for MaxFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxFeatures::Sqrt => f.write_str("sqrt"),
            MaxFeatures::Log2 => f.write_str("log2"),
            MaxFeatures::All => f.write_str("all"),
            MaxFeatures::Count(k) => write!(f, "{}", k),
        }
    }
}

/// Reads typed values out of a bag, reporting schema violations
struct BagReader<'a> {
    model_type: ModelType,
    bag: &'a HyperparameterBag,
}

impl<'a> BagReader<'a> {
    fn new(model_type: ModelType, bag: &'a HyperparameterBag) -> Result<Self> {
        let info = schema::describe(model_type);
        let mut unknown: Vec<&str> = bag
            .keys()
            .filter(|k| info.param(k).is_none())
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            return Err(Error::InvalidHyperparameters(format!(
                "unknown hyperparameter(s) for {}: {}",
                model_type,
                unknown.join(", ")
            )));
        }
        Ok(Self { model_type, bag })
    }

    fn invalid(&self, key: &str, reason: impl fmt::Display) -> Error {
        Error::InvalidHyperparameters(format!("{}.{}: {}", self.model_type, key, reason))
    }

    fn number(&self, key: &str) -> Result<Option<f64>> {
        match self.bag.get(key) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_f64()
                .filter(|v| v.is_finite())
                .map(Some)
                .ok_or_else(|| self.invalid(key, "expected a finite number")),
            Some(other) => Err(self.invalid(key, format!("expected a number, got {}", kind_of(other)))),
        }
    }

    fn positive_f64(&self, key: &str, default: f64) -> Result<f64> {
        match self.number(key)? {
            None => Ok(default),
            Some(v) if v > 0.0 => Ok(v),
            Some(v) => Err(self.invalid(key, format!("must be > 0, got {}", v))),
        }
    }

    fn non_negative_f64(&self, key: &str, default: f64) -> Result<f64> {
        match self.number(key)? {
            None => Ok(default),
            Some(v) if v >= 0.0 => Ok(v),
            Some(v) => Err(self.invalid(key, format!("must be >= 0, got {}", v))),
        }
    }

    fn int_at_least(&self, key: &str, default: usize, min: i64) -> Result<usize> {
        match self.bag.get(key) {
            None => Ok(default),
            Some(Value::Number(n)) => match integral(n) {
                Some(v) if v >= min => usize::try_from(v).map_err(|_| self.invalid(key, "value is too large")),
                Some(v) => Err(self.invalid(key, format!("must be >= {}, got {}", min, v))),
                None => Err(self.invalid(key, format!("expected an integer, got {}", n))),
            },
            Some(other) => Err(self.invalid(key, format!("expected an integer, got {}", kind_of(other)))),
        }
    }

    fn boolean(&self, key: &str, default: bool) -> Result<bool> {
        match self.bag.get(key) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(self.invalid(key, format!("expected a boolean, got {}", kind_of(other)))),
        }
    }

    fn max_depth(&self, key: &str) -> Result<Option<usize>> {
        match self.bag.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("unbounded") || s.eq_ignore_ascii_case("none") => Ok(None),
            Some(_) => self.int_at_least(key, 0, 1).map(Some),
        }
    }

    fn max_features(&self, key: &str) -> Result<MaxFeatures> {
        match self.bag.get(key) {
            None => Ok(MaxFeatures::Sqrt),
            Some(value) => MaxFeatures::try_from(value.clone()).map_err(|reason| self.invalid(key, reason)),
        }
    }
}

/// Integer value of a JSON number, accepting floats with no fractional part
fn integral(n: &serde_json::Number) -> Option<i64> {
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    if n.is_u64() {
        return Some(i64::MAX);
    }
    n.as_f64()
        .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15)
        .map(|f| f as i64)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
