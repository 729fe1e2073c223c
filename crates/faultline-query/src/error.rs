//! Query failure taxonomy.
//!
//! Every stage failure ends the request; [`QueryError::kind`] tells a
//! transport whether the caller's input was at fault.

use faultline_dsl::ParseError;
use faultline_engine::EvalError;
use faultline_ingest::{Cancellation, ConfigError, SourceError};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request text was unusable.
    InvalidInput,
    /// The system could not complete a well-formed request.
    Internal,
}

#[derive(Debug, Error)]
pub enum QueryShapeError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("query is empty")]
    EmptyQuery,
    #[error("last clause must be a plain atom, not a rule: `{clause}`")]
    InvalidQueryShape { clause: String },
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid query: {0}")]
    QueryShape(#[from] QueryShapeError),
    #[error("fact source `{source_name}` failed: {error}")]
    SourceFetch {
        source_name: String,
        #[source]
        error: SourceError,
    },
    #[error("evaluation failed: {0}")]
    Evaluation(#[from] EvalError),
    #[error("evaluation worker failed: {0}")]
    Worker(String),
    #[error("result projection failed: {0}")]
    Projection(String),
    #[error(transparent)]
    Canceled(#[from] Cancellation),
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::QueryShape(_) => ErrorKind::InvalidInput,
            _ => ErrorKind::Internal,
        }
    }

    /// `true` for cancellations, including ones reported by a source.
    pub fn is_canceled(&self) -> bool {
        match self {
            QueryError::Canceled(_) => true,
            QueryError::SourceFetch { error, .. } => error.is_canceled(),
            _ => false,
        }
    }

    /// Message safe to hand back to a caller. Internal failures are not
    /// described beyond their category.
    pub fn public_message(&self) -> String {
        match self {
            QueryError::QueryShape(e) => e.to_string(),
            QueryError::Canceled(c) => c.to_string(),
            QueryError::SourceFetch { error, .. } if error.is_canceled() => error.to_string(),
            _ => "internal server error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_shape_errors_are_invalid_input() {
        assert_eq!(
            QueryError::from(QueryShapeError::EmptyQuery).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(QueryError::from(EvalError::Interrupted).kind(), ErrorKind::Internal);
        assert_eq!(
            QueryError::from(ConfigError::NotLoaded).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn wrapped_source_cancellation_counts_as_canceled() {
        let err = QueryError::SourceFetch {
            source_name: "jaeger".into(),
            error: SourceError::Canceled(Cancellation::DeadlineExceeded),
        };
        assert!(err.is_canceled());
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.public_message(), "request deadline exceeded");
    }
}
