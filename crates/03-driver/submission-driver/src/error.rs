use status_ring::RingError;
use thiserror::Error;

pub type DriverResult<T, E = DriverError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Ring(#[from] RingError),

    #[error("kick of submission {sequence} failed: {reason}")]
    KickFailed { sequence: u64, reason: String },

    #[error("submission {sequence} still failing after {attempts} kicks: {reason}")]
    RetriesExhausted {
        sequence: u64,
        attempts: u32,
        reason: String,
    },
}
