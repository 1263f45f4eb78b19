//! Query Result Parsing
//!
//! Converts a decoded Prometheus HTTP API response into [`QueryResults`].
//!
//! # Response Shape
//!
//! ```json
//! {
//!   "status": "success",
//!   "data": {
//!     "resultType": "vector",
//!     "result": [
//!       { "metric": { "__name__": "up", "job": "node" }, "value": [1700000000.0, "1"] }
//!     ]
//!   },
//!   "warnings": ["..."]
//! }
//! ```
//!
//! `matrix` results carry `values` (a list of samples) instead of `value`, and
//! `scalar` results carry a single bare sample in `result`.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// Prefix kube-state-metrics puts in front of Kubernetes object labels
const LABEL_PREFIX: &str = "label_";

// ============================================================================
// Parse Errors
// ============================================================================

/// A response that is valid JSON but not a recognizable query response
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Top level is not a JSON object
    #[error("response is not a JSON object")]
    NotAnObject,

    /// A required field is absent
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// A field holds the wrong JSON type
    #[error("field `{field}` is not {expected}")]
    UnexpectedType {
        /// Path of the offending field
        field: &'static str,
        /// What was expected there
        expected: &'static str,
    },

    /// The backend reported `"status": "error"`
    #[error("backend error ({error_type}): {message}")]
    BackendError {
        /// Prometheus `errorType`
        error_type: String,
        /// Prometheus `error`
        message: String,
    },

    /// `status` is neither `success` nor `error`
    #[error("unknown response status {0:?}")]
    UnknownStatus(String),

    /// `resultType` is not one this parser understands
    #[error("unsupported result type {0:?}")]
    UnsupportedResultType(String),

    /// A sample is not a `[timestamp, "value"]` pair
    #[error("invalid sample: {0}")]
    InvalidSample(String),

    /// A metric label looked up by name does not exist
    #[error("metric has no label {0:?}")]
    MissingLabel(String),
}

// ============================================================================
// Result Types
// ============================================================================

/// Kind of data carried by a query response
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    /// Instant vector: one sample per series
    Vector,
    /// Range vector: many samples per series
    Matrix,
    /// Single numeric sample
    Scalar,
}

impl ResultType {
    fn from_name(s: &str) -> Result<Self, ParseError> {
        match s {
            "vector" => Ok(Self::Vector),
            "matrix" => Ok(Self::Matrix),
            "scalar" => Ok(Self::Scalar),
            other => Err(ParseError::UnsupportedResultType(other.to_string())),
        }
    }
}

/// One sample of a series
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Sample {
    /// Unix timestamp in seconds
    pub timestamp: f64,
    /// Sample value (may be NaN or infinite)
    #[serde(serialize_with = "serialize_value")]
    pub value: f64,
}

/// Write a sample value the way Prometheus does: as a string, so that
/// `NaN`, `+Inf` and `-Inf` survive JSON
fn serialize_value<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_nan() {
        serializer.serialize_str("NaN")
    } else if value.is_infinite() {
        serializer.serialize_str(if value.is_sign_positive() { "+Inf" } else { "-Inf" })
    } else {
        serializer.collect_str(value)
    }
}

/// One series of a query response
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct QueryResult {
    /// Series labels
    pub metric: BTreeMap<String, String>,
    /// Samples, oldest first
    pub values: Vec<Sample>,
}

impl QueryResult {
    /// Value of the label `field`
    pub fn get_string(&self, field: &str) -> Result<&str, ParseError> {
        self.metric
            .get(field)
            .map(String::as_str)
            .ok_or_else(|| ParseError::MissingLabel(field.to_string()))
    }

    /// Labels exported with the `label_` prefix, keyed without it
    #[must_use]
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.metric
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(LABEL_PREFIX)
                    .map(|name| (name.to_string(), value.clone()))
            })
            .collect()
    }
}

/// Parsed response for one query
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct QueryResults {
    /// The query that produced these results
    pub query: String,
    /// Result type reported by the backend; `None` for an empty placeholder
    pub result_type: Option<ResultType>,
    /// Series in backend order
    pub results: Vec<QueryResult>,
}

impl QueryResults {
    /// Placeholder published when a query failed
    #[must_use]
    pub fn empty(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Whether no series were returned
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Parse a decoded response body
    pub fn parse(query: &str, raw: &Value) -> Result<Self, ParseError> {
        let body = raw.as_object().ok_or(ParseError::NotAnObject)?;
        check_status(body)?;

        let data = object_field(body, "data")?;
        let result_type =
            ResultType::from_name(string_field(data, "data.resultType", "resultType")?)?;
        let result = data
            .get("result")
            .ok_or(ParseError::MissingField("data.result"))?;

        let results = match result_type {
            ResultType::Vector => series_list(result, "value", |v| Ok(vec![parse_sample(v)?]))?,
            ResultType::Matrix => series_list(result, "values", |v| {
                v.as_array()
                    .ok_or(ParseError::UnexpectedType {
                        field: "values",
                        expected: "an array",
                    })?
                    .iter()
                    .map(parse_sample)
                    .collect()
            })?,
            ResultType::Scalar => vec![QueryResult {
                metric: BTreeMap::new(),
                values: vec![parse_sample(result)?],
            }],
        };

        Ok(Self {
            query: query.to_string(),
            result_type: Some(result_type),
            results,
        })
    }
}

// ============================================================================
// Field Helpers
// ============================================================================

fn check_status(body: &Map<String, Value>) -> Result<(), ParseError> {
    match string_field(body, "status", "status")? {
        "success" => Ok(()),
        "error" => Err(ParseError::BackendError {
            error_type: body
                .get("errorType")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            message: body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }),
        other => Err(ParseError::UnknownStatus(other.to_string())),
    }
}

fn string_field<'a>(
    map: &'a Map<String, Value>,
    path: &'static str,
    key: &str,
) -> Result<&'a str, ParseError> {
    map.get(key)
        .ok_or(ParseError::MissingField(path))?
        .as_str()
        .ok_or(ParseError::UnexpectedType {
            field: path,
            expected: "a string",
        })
}

fn object_field<'a>(
    map: &'a Map<String, Value>,
    key: &'static str,
) -> Result<&'a Map<String, Value>, ParseError> {
    map.get(key)
        .ok_or(ParseError::MissingField(key))?
        .as_object()
        .ok_or(ParseError::UnexpectedType {
            field: key,
            expected: "an object",
        })
}

fn series_list<F>(
    result: &Value,
    samples_key: &'static str,
    parse_samples: F,
) -> Result<Vec<QueryResult>, ParseError>
where
    F: Fn(&Value) -> Result<Vec<Sample>, ParseError>,
{
    let series = result.as_array().ok_or(ParseError::UnexpectedType {
        field: "data.result",
        expected: "an array",
    })?;

    series
        .iter()
        .map(|entry| {
            let entry = entry.as_object().ok_or(ParseError::UnexpectedType {
                field: "data.result[]",
                expected: "an object",
            })?;
            let metric = parse_metric(entry.get("metric"))?;
            let samples = entry
                .get(samples_key)
                .ok_or(ParseError::MissingField(samples_key))?;
            Ok(QueryResult {
                metric,
                values: parse_samples(samples)?,
            })
        })
        .collect()
}

fn parse_metric(metric: Option<&Value>) -> Result<BTreeMap<String, String>, ParseError> {
    // An absent metric is legal for series produced by aggregations
    let Some(metric) = metric else {
        return Ok(BTreeMap::new());
    };

    metric
        .as_object()
        .ok_or(ParseError::UnexpectedType {
            field: "metric",
            expected: "an object",
        })?
        .iter()
        .map(|(name, value)| {
            value
                .as_str()
                .map(|v| (name.clone(), v.to_string()))
                .ok_or(ParseError::UnexpectedType {
                    field: "metric",
                    expected: "a map of string labels",
                })
        })
        .collect()
}

fn parse_sample(sample: &Value) -> Result<Sample, ParseError> {
    let pair = match sample.as_array() {
        Some(pair) if pair.len() == 2 => pair,
        _ => return Err(ParseError::InvalidSample(sample.to_string())),
    };

    let timestamp = pair[0]
        .as_f64()
        .ok_or_else(|| ParseError::InvalidSample(format!("timestamp {} is not a number", pair[0])))?;
    let value = pair[1]
        .as_str()
        .and_then(|v| v.parse::<f64>().ok())
        .ok_or_else(|| ParseError::InvalidSample(format!("value {} is not numeric", pair[1])))?;

    Ok(Sample { timestamp, value })
}
