use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("unknown metric: {0}")]
    UnknownMetric(String),

    #[error("unsupported score shape for `{key}`: {shape}")]
    UnsupportedScoreShape { key: String, shape: String },

    #[error("inconsistent per-instance scores: {0}")]
    InconsistentScores(String),

    #[error("metric `{0}` is configured in both the expensive and the cheap group")]
    MetricGroupConflict(String),

    #[error(
        "length mismatch in dataset `{dataset}`: {predictions} predictions, \
         {references:?} references, {sources:?} sources"
    )]
    LengthMismatch {
        dataset: String,
        predictions: usize,
        references: Option<usize>,
        sources: Option<usize>,
    },

    #[error("id `{id}` not found in collection `{collection}`")]
    MissingId { id: String, collection: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("metric `{metric}` broke its contract: {message}")]
    MetricContract { metric: String, message: String },

    #[error("metric `{metric}` failed: {message}")]
    Metric { metric: String, message: String },

    #[error("cache error: {0}")]
    Cache(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("runtime error: {0}")]
    Runtime(String),
}

impl Error {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    pub fn metric(metric: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Metric {
            metric: metric.into(),
            message: message.into(),
        }
    }

    pub fn contract(metric: impl Into<String>, message: impl Into<String>) -> Self {
        Error::MetricContract {
            metric: metric.into(),
            message: message.into(),
        }
    }
}
