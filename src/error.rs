use thiserror::Error;

use crate::detect::Format;

#[derive(Error, Debug)]
pub enum DiffCovError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed {format} report at {location}: {message}")]
    MalformedReport {
        format: Format,
        /// Byte position (XML) or line number (LCOV) of the defect.
        location: String,
        message: String,
    },

    #[error("Malformed diff at line {line}: {message}")]
    MalformedDiff { line: usize, message: String },

    #[error("Unknown coverage format")]
    UnknownFormat,

    #[error("Invalid exclusion pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: globset::Error,
    },

    #[error("Invalid {metric} threshold {value}: expected a percentage between 0 and 100")]
    InvalidThreshold { metric: &'static str, value: f64 },
}

impl DiffCovError {
    pub(crate) fn malformed_report(
        format: Format,
        location: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        DiffCovError::MalformedReport {
            format,
            location: location.into(),
            message: message.into(),
        }
    }

    pub(crate) fn malformed_diff(line: usize, message: impl Into<String>) -> Self {
        DiffCovError::MalformedDiff {
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DiffCovError>;
