//! Normalized error types for content session operations.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The context already bound isolated storage for another profile.
    /// Fatal to the context: it must be destroyed and recreated.
    #[error("context already bound to {bound_profile:?}; cannot bind {requested_profile:?}")]
    DirtyContext {
        bound_profile: String,
        requested_profile: String,
    },

    /// A page load failed. The session stays alive and can reload.
    #[error("load {url:?} failed: {message}")]
    ContentLoad { url: String, message: String },

    /// The session is in a state that does not allow the operation.
    #[error("session in state {current_state:?} does not support {operation:?}")]
    InvalidState {
        current_state: String,
        operation: String,
    },

    /// The host could not provide a fresh execution context.
    #[error("execution context unavailable: {message}")]
    ContextUnavailable { message: String },
}

impl SessionError {
    /// Whether the error poisons the whole execution context.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DirtyContext { .. })
    }

    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ContentLoad { .. } | Self::ContextUnavailable { .. }
        )
    }
}
