use thiserror::Error;

/// Failures raised while building or driving a single episode.
///
/// Everything here is recoverable at the harness boundary: a failing run
/// scores [`crate::harness::WORST_FITNESS`] instead of taking the
/// generation down.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("data unavailable for {pair}: {reason}")]
    DataUnavailable { pair: String, reason: String },

    #[error("controller returned {got} action values, expected {expected}")]
    InvalidActionShape { expected: usize, got: usize },

    #[error("observation at row {index} needs {needed} prior rows")]
    InsufficientHistory { index: usize, needed: usize },

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("invalid episode parameter: {0}")]
    InvalidParameter(String),
}

impl SimError {
    pub(crate) fn unavailable(pair: &str, reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            pair: pair.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
