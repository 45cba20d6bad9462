use thiserror::Error;

/// Errors surfaced by the slider engine and its collaborators.
///
/// `Fsm` and `Sampler` are produced by `ChannelFsm` / `RawChannelSampler`
/// implementations; the engine hands them back to the caller as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SliderError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("out of memory")]
    NoMemory,
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    #[error("channel {0} not found")]
    NotFound(u32),
    #[error("channel fsm: {0}")]
    Fsm(String),
    #[error("raw sampler: {0}")]
    Sampler(String),
}

impl SliderError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        SliderError::InvalidArgument(msg.into())
    }
}

impl From<std::collections::TryReserveError> for SliderError {
    fn from(_: std::collections::TryReserveError) -> Self {
        SliderError::NoMemory
    }
}

pub type Result<T> = std::result::Result<T, SliderError>;
