//! Error types emitted while building mask sets or applying them.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, MasksemblesError>;

/// Failure categories for mask construction and the forward pass.
#[derive(Debug, Error)]
pub enum MasksemblesError {
    /// Construction parameters are invalid or the generator broke its contract.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// An input tensor does not satisfy the forward-pass preconditions.
    #[error("invalid shape for {context}: {message}")]
    Shape {
        context: &'static str,
        message: String,
    },

    /// A tensor backend failure propagated to the caller.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

impl MasksemblesError {
    pub(crate) fn config<S: Into<String>>(msg: S) -> Self {
        MasksemblesError::Configuration(msg.into())
    }

    pub(crate) fn shape<S: Into<String>>(context: &'static str, msg: S) -> Self {
        MasksemblesError::Shape {
            context,
            message: msg.into(),
        }
    }

    /// Returns `true` for construction-time errors.
    pub fn is_configuration(&self) -> bool {
        matches!(self, MasksemblesError::Configuration(_))
    }

    /// Returns `true` for forward-pass precondition violations.
    pub fn is_shape(&self) -> bool {
        matches!(self, MasksemblesError::Shape { .. })
    }
}
