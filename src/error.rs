use crate::config::ConfigError;
use crate::progress::Stage;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeviationError {
    /// Malformed input; the job fails before any stage runs.
    #[error("invalid input in {dataset}: {reason}")]
    InvalidInput { dataset: String, reason: String },
    #[error("invalid map id '{0}'")]
    InvalidMapId(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("feature store error: {0}")]
    Store(#[from] StoreError),
    /// The progress consumer went away; the job stopped at a stage boundary.
    #[error("job cancelled before {0}")]
    Cancelled(Stage),
    #[error("I/O error accessing '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DeviationError {
    pub fn invalid_input(dataset: impl Into<String>, reason: impl Into<String>) -> Self {
        DeviationError::InvalidInput {
            dataset: dataset.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = DeviationError> = std::result::Result<T, E>;
