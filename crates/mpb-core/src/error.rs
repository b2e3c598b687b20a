//! Errors surfaced by the slot controller and slot hosts.

use mpb_db::DbError;
use mpb_session::error::SessionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    /// The requested profile does not exist. Nothing was mutated.
    #[error("profile {profile_id:?} not found")]
    ProfileNotFound { profile_id: String },

    /// The profile store or slot registry failed.
    #[error("store: {0}")]
    Store(#[from] DbError),

    /// The content session failed and could not be recovered.
    #[error("session: {0}")]
    Session(#[from] SessionError),

    /// The request was malformed (empty id, unknown slot).
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// The request was superseded or the controller shut down.
    #[error("request cancelled: {reason}")]
    Cancelled { reason: String },
}

impl ControllerError {
    pub fn not_found(profile_id: impl Into<String>) -> Self {
        Self::ProfileNotFound {
            profile_id: profile_id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ProfileNotFound { .. } | Self::Store(DbError::ProfileNotFound)
        )
    }

    /// Copy handed to callers that shared this request's switch. Keeps the
    /// variant; store failures without a plain counterpart become `Cancelled`.
    pub fn shared(&self) -> Self {
        match self {
            Self::ProfileNotFound { profile_id } => Self::not_found(profile_id.clone()),
            Self::Store(DbError::ProfileNotFound) => Self::Store(DbError::ProfileNotFound),
            Self::Store(err) => Self::Cancelled {
                reason: format!("shared switch failed: {err}"),
            },
            Self::Session(err) => Self::Session(err.clone()),
            Self::InvalidRequest { message } => Self::InvalidRequest {
                message: message.clone(),
            },
            Self::Cancelled { reason } => Self::Cancelled {
                reason: reason.clone(),
            },
        }
    }
}
