use thiserror::Error;

/// Hard failures of a conversion. Estimator-level trouble never shows up here;
/// a frame that cannot be analyzed is simply treated as unpitched.
#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("delta time of {ticks} ticks does not fit in a 4-byte variable-length quantity")]
    EncodingOverflow { ticks: u64 },

    #[error("conversion worker terminated without a result")]
    WorkerLost,
}

pub type Result<T> = std::result::Result<T, TranscribeError>;

pub(crate) fn invalid(msg: impl Into<String>) -> TranscribeError {
    TranscribeError::InvalidInput(msg.into())
}
