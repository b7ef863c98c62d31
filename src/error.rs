//! Error types for the pool.

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors that can occur while creating or allocating from a pool.
///
/// Releasing memory never fails and cleanup handlers report their own problems
/// through the pool's [`Diagnostics`](crate::Diagnostics), so neither shows up here.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PoolError {
    /// The raw memory provider could not satisfy the request.
    #[error("out of memory: {size} bytes could not be allocated")]
    OutOfMemory { size: usize },

    /// The requested alignment is not a power of two.
    #[error("invalid alignment: {alignment} is not a power of two")]
    InvalidAlignment { alignment: usize },

    /// The pool configuration cannot be used.
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        assert_eq!(
            "out of memory: 64 bytes could not be allocated",
            PoolError::OutOfMemory { size: 64 }.to_string()
        );
        assert_eq!(
            "invalid alignment: 3 is not a power of two",
            PoolError::InvalidAlignment { alignment: 3 }.to_string()
        );
    }
}
