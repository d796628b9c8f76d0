//! Error types shared by the breaker, retry and fallback layers.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Classifies an error as a transient availability failure.
///
/// Breakers only count transient failures, and retries only repeat them.
/// Anything else (bad requests, missing configuration) is handed back to
/// the caller untouched on first occurrence.
pub trait Transient {
    /// Whether this failure is expected to resolve on its own.
    fn is_transient(&self) -> bool;
}

/// The breaker refused to attempt a call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("circuit open for '{operation}', next trial in {retry_in:?}")]
pub struct CircuitOpenError {
    /// Guarded operation that was refused
    pub operation: String,

    /// Time left until the breaker admits a trial call
    pub retry_in: Duration,
}

impl Transient for CircuitOpenError {
    fn is_transient(&self) -> bool {
        true
    }
}

/// Outcome of a failed guarded call.
#[derive(Debug)]
pub enum GuardError<E> {
    /// The breaker rejected the call without running it.
    Open(CircuitOpenError),

    /// The operation ran and failed with its own error.
    Inner(E),
}

impl<E> GuardError<E> {
    /// Whether the breaker short-circuited the call.
    pub fn is_open(&self) -> bool {
        matches!(self, GuardError::Open(_))
    }

    /// The operation's own error, if it ran.
    pub fn into_inner(self) -> Option<E> {
        match self {
            GuardError::Open(_) => None,
            GuardError::Inner(e) => Some(e),
        }
    }
}

impl<E: Transient> Transient for GuardError<E> {
    fn is_transient(&self) -> bool {
        match self {
            GuardError::Open(_) => true,
            GuardError::Inner(e) => e.is_transient(),
        }
    }
}

impl<E: fmt::Display> fmt::Display for GuardError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardError::Open(e) => e.fmt(f),
            GuardError::Inner(e) => e.fmt(f),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for GuardError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GuardError::Open(e) => Some(e),
            GuardError::Inner(e) => Some(e),
        }
    }
}

impl<E> From<CircuitOpenError> for GuardError<E> {
    fn from(e: CircuitOpenError) -> Self {
        GuardError::Open(e)
    }
}

/// Outcome of a failed retried call.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed; carries the last error observed.
    Exhausted {
        operation: String,
        attempts: u32,
        last_error: E,
    },

    /// A non-transient error stopped the retry loop on first occurrence.
    Permanent(E),
}

impl<E> RetryError<E> {
    /// The underlying error, whichever way the call ended.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
            RetryError::Permanent(e) => e,
        }
    }

    /// Borrow the underlying error.
    pub fn inner(&self) -> &E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
            RetryError::Permanent(e) => e,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted {
                operation,
                attempts,
                last_error,
            } => write!(
                f,
                "'{}' failed after {} attempts: {}",
                operation, attempts, last_error
            ),
            RetryError::Permanent(e) => e.fmt(f),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn test_guard_error_display_passes_through() {
        let open: GuardError<Boom> = CircuitOpenError {
            operation: "generate_text:groq".to_string(),
            retry_in: Duration::from_secs(5),
        }
        .into();
        assert!(open.is_open());
        assert!(open.to_string().contains("generate_text:groq"));

        let inner = GuardError::Inner(Boom);
        assert_eq!(inner.to_string(), "boom");
        assert!(inner.into_inner().is_some());
    }

    #[test]
    fn test_retry_error_keeps_last_error() {
        let err = RetryError::Exhausted {
            operation: "events.delete".to_string(),
            attempts: 3,
            last_error: Boom,
        };
        let msg = err.to_string();
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("boom"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
