//! Error taxonomy for the forecast pipeline
//!
//! Every stage has its own error type so callers can tell an unreachable
//! data source apart from a bad request or a broken artifact.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a [`crate::source::SalesDataSource`]
#[derive(Debug, Error)]
pub enum SourceError {
    /// The backing store could not be reached or opened
    #[error("data source unavailable: {0}")]
    Unavailable(String),
    /// The store was reachable but the query failed
    #[error("query failed: {0}")]
    Query(String),
}

impl From<rusqlite::Error> for SourceError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref code, _)
                if matches!(
                    code.code,
                    rusqlite::ErrorCode::CannotOpen
                        | rusqlite::ErrorCode::NotADatabase
                        | rusqlite::ErrorCode::DatabaseBusy
                        | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                SourceError::Unavailable(err.to_string())
            }
            other => SourceError::Query(other.to_string()),
        }
    }
}

/// Errors raised while pulling and cleaning historical order lines
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("extraction failed, source unreachable")]
    SourceUnavailable(#[source] SourceError),
    #[error("column '{0}' has no observed values to impute from")]
    EmptyColumn(&'static str),
    #[error("no order date falls inside the valid window")]
    NoValidDates,
}

/// Errors raised while encoding aggregates into a feature table
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("column '{column}' holds non-numeric value '{value}'")]
    NonNumeric { column: &'static str, value: String },
}

/// Errors raised by the fitted pipeline itself
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("expected {expected} features, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("cannot fit on an empty training set")]
    EmptyTrainingSet,
    #[error("model produced a non-finite prediction")]
    NonFinite,
    #[error("design matrix is singular even after regularization")]
    Singular,
}

/// Errors raised by a training run
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("unknown model type '{0}', expected one of: decision_tree, linear, knn, logistic")]
    UnknownModelType(String),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error("insufficient training data: {rows} aggregate rows, need at least {required}")]
    InsufficientData { rows: usize, required: usize },
    #[error("model fit failed: {0}")]
    Fit(#[from] ModelError),
    #[error("trained model could not be persisted")]
    Persist(#[source] RegistryError),
}

/// Errors raised by the model registry
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no model artifact at {0}")]
    NotFound(PathBuf),
    #[error("model artifact at {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("i/o error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode model artifact: {0}")]
    Encode(String),
}

/// Errors raised while serving a prediction
#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("model is not trained yet, run a training first")]
    ModelNotTrained,
    #[error("product {0} not found")]
    ProductNotFound(i64),
    #[error("could not prepare prediction features: {0}")]
    FeaturePreparation(String),
    #[error("data source error")]
    Source(#[source] SourceError),
    #[error("inference failed: {0}")]
    Inference(#[from] ModelError),
}

/// Coarse classification used by the API layer to pick a status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No usable model, the service is not ready
    NotTrained,
    /// A referenced entity does not exist
    NotFound,
    /// The request cannot be served as given
    BadRequest,
    /// Unexpected failure inside the pipeline
    Internal,
}

impl PredictionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PredictionError::ModelNotTrained => ErrorKind::NotTrained,
            PredictionError::ProductNotFound(_) => ErrorKind::NotFound,
            PredictionError::FeaturePreparation(_) => ErrorKind::BadRequest,
            PredictionError::Source(_) | PredictionError::Inference(_) => ErrorKind::Internal,
        }
    }
}

impl TrainingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TrainingError::UnknownModelType(_) | TrainingError::InsufficientData { .. } => {
                ErrorKind::BadRequest
            }
            TrainingError::Feature(_) => ErrorKind::BadRequest,
            TrainingError::Extraction(_) | TrainingError::Fit(_) | TrainingError::Persist(_) => {
                ErrorKind::Internal
            }
        }
    }
}
