//! Error types and error support code.

/// Error type returned when acquiring a resource from a pool.
///
/// `E` is the error type of the pool's [`ResourceFactory`](crate::ResourceFactory).
#[derive(Debug, thiserror::Error)]
pub enum Error<E> {
    /// All resource slots are taken, and non-blocking operation was requested.
    #[error("pool is exhausted")]
    PoolExhausted,
    /// Resource acquisition took longer than the specified timeout.
    #[error("resource acquisition timeout")]
    AcquireTimeout,
    /// Factory failed to create a new resource.
    ///
    /// Contains the factory error unchanged.
    #[error("resource creation failed: {0}")]
    Create(#[source] E),
}

impl<E> Error<E> {
    /// Get factory error, if this error was caused by a failed resource creation.
    pub fn creation_error(&self) -> Option<&E> {
        match self {
            Self::Create(err) => Some(err),
            _ => None,
        }
    }
}
