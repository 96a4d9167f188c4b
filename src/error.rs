//! Error taxonomy for a review run.

use thiserror::Error;

use crate::cli::{EXIT_CANCELLED, EXIT_ERROR};

/// Errors that abort or annotate a review.
///
/// `ScopeResolution`, `ConfigParse` and `Config` are fatal and raised before
/// any agent runs. `AgentExecution` and `SchemaValidation` never escape the
/// runner/normalizer: they are recorded on the run instead.
#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("scope resolution failed: {0}")]
    ScopeResolution(String),
    #[error("invalid config {path}: {detail}")]
    ConfigParse { path: String, detail: String },
    #[error("{0}")]
    Config(String),
    #[error("agent {agent} failed: {detail}")]
    AgentExecution { agent: String, detail: String },
    #[error("finding {index} from {agent} rejected: {detail}")]
    SchemaValidation {
        agent: String,
        index: usize,
        detail: String,
    },
    #[error("review cancelled")]
    Cancelled,
}

impl ReviewError {
    /// Process exit code for a run that ended with this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            ReviewError::Cancelled => EXIT_CANCELLED,
            ReviewError::ScopeResolution(_)
            | ReviewError::ConfigParse { .. }
            | ReviewError::Config(_)
            | ReviewError::AgentExecution { .. }
            | ReviewError::SchemaValidation { .. } => EXIT_ERROR,
        }
    }

    pub fn config_parse(path: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        ReviewError::ConfigParse {
            path: path.into(),
            detail: detail.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReviewError>;
