//! Result and error types for Holdfast.
//!
//! Primitives report "not yet" conditions through typed outcomes
//! ([`Resolution`](crate::Resolution), [`PollOutcome`](crate::PollOutcome),
//! [`ActionOutcome`](crate::ActionOutcome)). A [`HoldfastError`] is only
//! produced for programmer errors, "must resolve" calls, or when a caller
//! explicitly converts an outcome with `into_result()`.

use thiserror::Error;

use crate::driver::DriverError;

/// Result type for Holdfast operations
pub type HoldfastResult<T> = Result<T, HoldfastError>;

/// Errors that can occur in Holdfast
#[derive(Debug, Error)]
pub enum HoldfastError {
    /// No candidate of a chain resolved before the deadline
    #[error("{target}: not found after trying {candidates_tried} candidate(s) in {elapsed_ms}ms")]
    NotFound {
        /// Semantic target name
        target: String,
        /// Number of candidates queried
        candidates_tried: usize,
        /// Time spent resolving
        elapsed_ms: u64,
    },

    /// A query or poll ran out of time without a definitive answer
    #[error("{target}: timed out after {elapsed_ms}ms")]
    Timeout {
        /// Semantic target or condition description
        target: String,
        /// Time spent before giving up
        elapsed_ms: u64,
    },

    /// Multiple elements matched where exactly one was required
    #[error("{target}: {matches} elements matched, expected exactly one")]
    Ambiguous {
        /// Semantic target name
        target: String,
        /// Number of matching elements
        matches: usize,
    },

    /// Every tier of the action ladder failed
    #[error("{action} exhausted after tiers [{tiers}]: {reason}")]
    ActionExhausted {
        /// Action name
        action: String,
        /// Tiers that were attempted, in order
        tiers: String,
        /// Last failure reason
        reason: String,
    },

    /// No extraction pattern matched the text
    #[error("no pattern matched {text:?}")]
    ExtractionFailed {
        /// Text that was inspected
        text: String,
    },

    /// A strategy chain was built without any candidate
    #[error("strategy chain for {target} has no candidates")]
    EmptyChain {
        /// Semantic target name
        target: String,
    },

    /// An extraction pattern failed to compile or lacks capture groups
    #[error("invalid extraction pattern {pattern:?}: {message}")]
    InvalidPattern {
        /// Offending pattern source
        pattern: String,
        /// Compiler or validation message
        message: String,
    },

    /// A pattern set was built without any pattern
    #[error("pattern set is empty")]
    EmptyPatternSet,

    /// Verification failed at the test-report layer
    #[error("Assertion failed: {message}")]
    AssertionFailed {
        /// Error message
        message: String,
    },

    /// Invalid engine configuration
    #[error("Invalid configuration: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Page driver error
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl HoldfastError {
    /// Whether a later retry of the same step could succeed
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Timeout { .. }
                | Self::Ambiguous { .. }
                | Self::ActionExhausted { .. }
                | Self::ExtractionFailed { .. }
        )
    }
}
