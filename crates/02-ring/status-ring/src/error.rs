use status_store::StoreError;
use thiserror::Error;

pub type RingResult<T> = Result<T, RingError>;

#[derive(Debug, Error)]
pub enum RingError {
    #[error("status store allocation failed: {0}")]
    Allocation(#[from] StoreError),

    #[error("missing required configuration: {0}")]
    NullConfiguration(&'static str),

    #[error("invalid ring configuration: {0}")]
    InvalidConfig(String),

    #[error("submission {sequence} is no longer held by the ring")]
    StaleSlot { sequence: u64 },

    #[error("status ring `{0}` has been destroyed")]
    Destroyed(String),
}

impl RingError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        RingError::InvalidConfig(msg.into())
    }
}
