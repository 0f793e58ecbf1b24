/// Errors reported by buffer and view operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufError {
    /// A parameter was outside the accepted range.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The buffer is the invalid sentinel left by a rejected construction.
    #[error("buffer is in the invalid state")]
    InvalidState,

    /// The buffer holds no allocation, so there is nothing to release.
    #[error("buffer is already empty")]
    AlreadyEmpty,

    /// The allocator could not provide the requested capacity.
    #[error("failed to allocate {requested} bytes")]
    AllocationFailed { requested: usize },
}

impl BufError {
    /// Returns true for errors caused by calling code rather than the environment.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            BufError::InvalidArgument(_) | BufError::InvalidState | BufError::AlreadyEmpty
        )
    }
}

pub type Result<T> = std::result::Result<T, BufError>;
