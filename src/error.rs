//! Failure taxonomy for the linking and synteny phases.
//!
//! The class of an error decides how much work is skipped: a configuration
//! error skips a sub-phase, a connectivity error skips one alignment
//! direction, a data error skips one feed row. Store errors abort the
//! resolver or fail one synteny pair.

use thiserror::Error;

/// Errors raised while reading external feeds or writing the warehouse.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed column mapping, missing required configuration fields
    #[error("Configuration error: {0}")]
    Config(String),

    /// An external alignment source could not be reached or opened
    #[error("Cannot reach alignment source {source_name}: {message}")]
    Connectivity {
        source_name: String,
        message: String,
    },

    /// A single malformed feed row
    #[error("Data error: {0}")]
    Data(String),

    /// Relational store failure
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Delimited input error: {0}")]
    Csv(#[from] csv::Error),
}

/// Coarse classification used when logging skip decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Config,
    Connectivity,
    Data,
    Store,
}

impl EngineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Config(_) => ErrorClass::Config,
            Self::Connectivity { .. } => ErrorClass::Connectivity,
            Self::Data(_) => ErrorClass::Data,
            Self::Store(_) => ErrorClass::Store,
            // Feed files that cannot be read are treated like an unreachable source
            Self::Io(_) | Self::Csv(_) => ErrorClass::Connectivity,
        }
    }
}

/// Result type alias for feed and engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn display_includes_context() {
        let err = EngineError::Connectivity {
            source_name: "hg38.netMm10".to_string(),
            message: "no such file".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot reach alignment source hg38.netMm10: no such file"
        );
    }

    #[test]
    fn classes_follow_taxonomy() {
        assert_eq!(EngineError::Config("x".into()).class(), ErrorClass::Config);
        assert_eq!(EngineError::Data("x".into()).class(), ErrorClass::Data);
        assert_eq!(
            EngineError::Io(io::Error::new(io::ErrorKind::NotFound, "gone")).class(),
            ErrorClass::Connectivity
        );
        assert_eq!(
            EngineError::from(rusqlite::Error::QueryReturnedNoRows).class(),
            ErrorClass::Store
        );
    }
}
