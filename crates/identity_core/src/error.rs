use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    /// Caller supplied neither value, or a malformed one.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Stored state breaks a cluster invariant (e.g. no primary at all).
    /// Never repaired in place.
    #[error("integrity fault: {0}")]
    IntegrityFault(String),

    /// The unit of work could not be opened, run or committed by storage.
    /// Nothing was written; the whole request may be retried.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IdentityError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::IntegrityFault(_) => 500,
            Self::StorageUnavailable(_) => 503,
            Self::Internal(_) => 500,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}
