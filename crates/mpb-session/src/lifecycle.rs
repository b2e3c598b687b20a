//! Storage binding transitions and operation guardrails.
//!
//! `Uninitialized -> Bound -> Terminated`. `Bound` is reachable once per
//! context; rebinding to a different profile is `DirtyContext`.

use std::sync::Mutex;

use crate::error::SessionError;
use crate::types::BindingState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionOperation {
    Initialize,
    Load,
    Navigate,
    Stop,
    Flush,
    Terminate,
}

impl SessionOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Load => "load",
            Self::Navigate => "navigate",
            Self::Stop => "stop",
            Self::Flush => "flush",
            Self::Terminate => "terminate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: BindingState,
    pub to: BindingState,
}

impl TransitionError {
    pub fn to_session_error(&self) -> SessionError {
        match (&self.from, &self.to) {
            (
                BindingState::Bound { profile_id: bound },
                BindingState::Bound {
                    profile_id: requested,
                },
            ) => SessionError::DirtyContext {
                bound_profile: bound.clone(),
                requested_profile: requested.clone(),
            },
            _ => SessionError::InvalidState {
                current_state: self.from.to_string(),
                operation: format!("transition_to_{}", self.to),
            },
        }
    }
}

pub fn is_valid_transition(from: &BindingState, to: &BindingState) -> bool {
    if from == to {
        return true;
    }

    matches!(
        (from, to),
        (BindingState::Uninitialized, BindingState::Bound { .. })
            | (BindingState::Uninitialized, BindingState::Terminated)
            | (BindingState::Bound { .. }, BindingState::Terminated)
    )
}

pub fn validate_transition(from: &BindingState, to: &BindingState) -> Result<(), TransitionError> {
    if is_valid_transition(from, to) {
        Ok(())
    } else {
        Err(TransitionError {
            from: from.clone(),
            to: to.clone(),
        })
    }
}

pub fn operation_allows_state(operation: SessionOperation, state: &BindingState) -> bool {
    match operation {
        SessionOperation::Initialize => {
            matches!(state, BindingState::Uninitialized | BindingState::Bound { .. })
        }
        SessionOperation::Load
        | SessionOperation::Navigate
        | SessionOperation::Stop
        | SessionOperation::Flush => {
            matches!(state, BindingState::Bound { .. })
        }
        SessionOperation::Terminate => true,
    }
}

pub fn validate_operation_state(
    operation: SessionOperation,
    state: &BindingState,
) -> Result<(), SessionError> {
    if operation_allows_state(operation, state) {
        Ok(())
    } else {
        Err(SessionError::InvalidState {
            current_state: state.to_string(),
            operation: operation.as_str().to_string(),
        })
    }
}

/// One-shot storage binding shared by session implementations.
#[derive(Debug)]
pub struct StorageBinding {
    state: Mutex<BindingState>,
}

impl Default for StorageBinding {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBinding {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BindingState::Uninitialized),
        }
    }

    /// A context whose binding was already consumed before we got it.
    pub fn already_bound(profile_id: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(BindingState::Bound {
                profile_id: profile_id.into(),
            }),
        }
    }

    pub fn state(&self) -> BindingState {
        match self.state.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Binds the context to `profile_id`. Rebinding the same profile is a no-op.
    pub fn bind(&self, profile_id: &str) -> Result<(), SessionError> {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        validate_operation_state(SessionOperation::Initialize, &guard)?;
        let next = BindingState::Bound {
            profile_id: profile_id.to_string(),
        };
        validate_transition(&guard, &next).map_err(|err| err.to_session_error())?;
        *guard = next;
        Ok(())
    }

    /// Marks the context terminated. Idempotent.
    pub fn terminate(&self) {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = BindingState::Terminated;
    }

    pub fn require(&self, operation: SessionOperation) -> Result<(), SessionError> {
        validate_operation_state(operation, &self.state())
    }
}
