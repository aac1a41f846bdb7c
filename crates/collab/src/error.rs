//! Error types for the collaborative-filtering engine

use std::fmt;

/// Result type alias for collaborative-filtering operations
pub type Result<T> = std::result::Result<T, CollabError>;

/// Which side of the rating matrix an index refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixAxis {
    User,
    Item,
}

impl fmt::Display for MatrixAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatrixAxis::User => write!(f, "user"),
            MatrixAxis::Item => write!(f, "item"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CollabError {
    #[error("{axis} index {index} out of range (len {len})")]
    OutOfRange {
        axis: MatrixAxis,
        index: usize,
        len: usize,
    },

    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
        key: Option<String>,
    },

    #[error("Rating {value} for user {user}, item {item} is outside the valid scale")]
    InvalidRating { user: usize, item: usize, value: f64 },

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Model not trained yet")]
    NotTrained,

    #[error("Configuration source error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Logging error: {0}")]
    Logging(String),
}

impl CollabError {
    pub(crate) fn invalid_config(message: impl Into<String>, key: &str) -> Self {
        CollabError::InvalidConfiguration {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}
