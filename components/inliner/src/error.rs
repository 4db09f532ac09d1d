//! Error types for the inlining pass
//!
//! Only failures that abort the whole compilation unit are errors. Expected
//! outcomes such as a callee being too large, or its body being unavailable,
//! are recorded per candidate in the diagnostic log instead.

use core_types::MethodId;
use thiserror::Error;

/// Fatal failure of an inlining pass
#[derive(Debug, Error)]
pub enum InlinerError {
    /// An IR invariant was broken after all speculative checks had passed
    #[error("internal consistency failure while inlining into {method}: {message}")]
    InternalConsistency {
        /// Method being compiled
        method: MethodId,
        /// What was found broken
        message: String,
    },

    /// Reinstated must-inline candidates pushed the unit past the hard ceiling
    #[error("inlined node count {nodes} exceeds the hard ceiling of {ceiling}")]
    NodeCeilingExceeded {
        /// Estimated node count after reinstatement
        nodes: u32,
        /// Configured ceiling
        ceiling: u32,
    },

    /// Configuration values are inconsistent
    #[error("invalid inliner configuration: {0}")]
    InvalidConfig(String),

    /// Configuration text could not be parsed
    #[error("failed to parse inliner configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl InlinerError {
    /// Build an internal consistency error
    pub fn consistency(method: MethodId, message: impl Into<String>) -> Self {
        InlinerError::InternalConsistency {
            method,
            message: message.into(),
        }
    }

    /// Check if this error came from a broken IR invariant
    pub fn is_internal(&self) -> bool {
        matches!(self, InlinerError::InternalConsistency { .. })
    }
}

/// Result type for inliner operations
pub type InlinerResult<T> = Result<T, InlinerError>;
