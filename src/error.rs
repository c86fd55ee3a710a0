//! Error Types
//!
//! Lookups that simply find nothing (no adjacent tuple sets, no directed
//! connection) are ordinary negative results and never surface here.

use thiserror::Error;

/// Keyword search errors
#[derive(Error, Debug)]
pub enum SearchError {
    /// An argument failed validation before any work began
    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    /// No foreign key connects any base table of the two join sides
    #[error("No join candidate found between {left} and {right}")]
    JoinCandidateNotFound { left: String, right: String },

    /// A workload references a relation the schema does not declare
    #[error("Unknown relation: {0}")]
    UnknownRelation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Worker pool for parallel expansion could not be built
    #[error("Failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl SearchError {
    pub(crate) fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        SearchError::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }
}

impl From<figment::Error> for SearchError {
    fn from(err: figment::Error) -> Self {
        SearchError::Config(Box::new(err))
    }
}

/// Result type for keyword search operations
pub type SearchResult<T> = Result<T, SearchError>;
