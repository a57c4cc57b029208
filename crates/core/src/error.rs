//! Engine error taxonomy.

use thiserror::Error;

/// Result type used by every public engine operation.
pub type EngineResult<T> = Result<T, EngineError>;

/// Error taxonomy shared across the engine.
///
/// Transient failures are retryable under the configured bound; permanent
/// failures are recorded immediately and never retried. Callers never see a
/// raw transport error; everything is mapped into one of these variants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Malformed schedule, recipient, or parameter input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown report or execution.
    #[error("not found: {0}")]
    NotFound(String),

    /// A non-terminal execution already exists for the report.
    #[error("execution already in flight: {0}")]
    Concurrency(String),

    /// The execution backlog is at capacity.
    #[error("queue backlog full: {0}")]
    ResourceExhausted(String),

    /// Network/timeout class failure, retryable under the attempt bound.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Never-retry failure (e.g. a 4xx webhook response).
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// A signed URL whose embedded expiry has passed.
    #[error("token expired")]
    TokenExpired,

    /// A signed URL whose signature does not match its contents.
    #[error("invalid signature")]
    InvalidSignature,
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn concurrency(msg: impl Into<String>) -> Self {
        Self::Concurrency(msg.into())
    }

    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    /// Stable machine-readable code, for logs and API surfaces.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation_error",
            EngineError::NotFound(_) => "not_found",
            EngineError::Concurrency(_) => "concurrency_error",
            EngineError::ResourceExhausted(_) => "resource_exhausted",
            EngineError::Transient(_) => "transient_error",
            EngineError::Permanent(_) => "permanent_error",
            EngineError::TokenExpired => "token_expired",
            EngineError::InvalidSignature => "invalid_signature",
        }
    }

    /// Whether the local retry policy may re-attempt after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(EngineError::validation("x").kind(), "validation_error");
        assert_eq!(EngineError::TokenExpired.kind(), "token_expired");
        assert_eq!(EngineError::InvalidSignature.kind(), "invalid_signature");
    }

    #[test]
    fn only_transient_is_retryable() {
        assert!(EngineError::transient("socket reset").is_retryable());
        assert!(!EngineError::permanent("400 bad request").is_retryable());
        assert!(!EngineError::concurrency("in flight").is_retryable());
    }
}
