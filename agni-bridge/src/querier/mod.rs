//! Query evaluation
//!
//! A [`Querier`] turns a query expression evaluated at one instant into a
//! single scalar. Backend results are modelled as [`QueryData`] and reduced
//! by [`reduce`]: scalars pass through, vectors are summed, anything else is
//! an error.

pub mod prometheus;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

pub use prometheus::PrometheusQuerier;

/// Failure of one query evaluation
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("{error_type}: {message}")]
    Api { error_type: String, message: String },
    #[error("cannot decode response: {0}")]
    Decode(String),
    #[error("invalid sample value '{0}'")]
    InvalidSample(String),
    #[error("unknown result type: {0}")]
    UnknownResultType(String),
    #[error("{0}")]
    Other(String),
}

/// Capability shared by every polling task
#[async_trait]
pub trait Querier: Send + Sync {
    /// Evaluate `query` at `at` and reduce the result to one value
    async fn query(&self, at: DateTime<Utc>, query: &str) -> Result<f64, QueryError>;
}

/// `[<unix seconds>, "<value>"]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SamplePair(pub f64, pub String);

impl SamplePair {
    pub fn value(&self) -> Result<f64, QueryError> {
        parse_sample(&self.1)
    }
}

/// One element of an instant vector
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VectorSample {
    #[serde(default)]
    pub metric: serde_json::Map<String, serde_json::Value>,
    pub value: SamplePair,
}

/// One element of a range vector
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MatrixSeries {
    #[serde(default)]
    pub metric: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub values: Vec<SamplePair>,
}

/// Result of an instant query, tagged by `resultType`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
pub enum QueryData {
    Scalar(SamplePair),
    Vector(Vec<VectorSample>),
    Matrix(Vec<MatrixSeries>),
    String(SamplePair),
}

impl QueryData {
    pub fn result_type(&self) -> &'static str {
        match self {
            QueryData::Scalar(_) => "scalar",
            QueryData::Vector(_) => "vector",
            QueryData::Matrix(_) => "matrix",
            QueryData::String(_) => "string",
        }
    }
}

/// Reduce a query result to one scalar.
///
/// Vector samples are summed, whatever their labels. An empty vector is `0`.
pub fn reduce(data: &QueryData) -> Result<f64, QueryError> {
    match data {
        QueryData::Scalar(pair) => pair.value(),
        QueryData::Vector(samples) => samples
            .iter()
            .try_fold(0.0, |sum, sample| -> Result<f64, QueryError> {
                Ok(sum + sample.value.value()?)
            }),
        QueryData::Matrix(_) | QueryData::String(_) => {
            Err(QueryError::UnknownResultType(data.result_type().to_string()))
        }
    }
}

/// Prometheus encodes sample values as strings (`"1.5"`, `"NaN"`, `"+Inf"`)
fn parse_sample(raw: &str) -> Result<f64, QueryError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| QueryError::InvalidSample(raw.to_string()))
}
