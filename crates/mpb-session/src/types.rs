//! Transport-agnostic session types.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

/// Storage binding state of one execution context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindingState {
    Uninitialized,
    Bound { profile_id: String },
    Terminated,
}

impl BindingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Bound { .. } => "bound",
            Self::Terminated => "terminated",
        }
    }

    pub fn bound_profile(&self) -> Option<&str> {
        match self {
            Self::Bound { profile_id } => Some(profile_id),
            _ => None,
        }
    }
}

impl std::fmt::Display for BindingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned by a successful `initialize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ready {
    pub profile_id: String,
    /// Generation of the context that accepted the binding.
    pub context_generation: u64,
}

/// Identifies one load request. Later requests carry larger tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadToken(pub u64);

impl std::fmt::Display for LoadToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "load#{}", self.0)
    }
}

/// Callback emitted by a content session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentEvent {
    Progress { token: LoadToken, percent: u8 },
    LoadFinished { token: LoadToken, url: String },
    LoadFailed {
        token: LoadToken,
        url: String,
        message: String,
    },
}

impl ContentEvent {
    pub fn token(&self) -> LoadToken {
        match self {
            Self::Progress { token, .. }
            | Self::LoadFinished { token, .. }
            | Self::LoadFailed { token, .. } => *token,
        }
    }
}

pub type ContentEventSender = mpsc::UnboundedSender<ContentEvent>;
pub type ContentEventReceiver = mpsc::UnboundedReceiver<ContentEvent>;

pub fn content_event_channel() -> (ContentEventSender, ContentEventReceiver) {
    mpsc::unbounded_channel()
}

/// Hands out monotonically increasing load tokens and remembers the newest.
///
/// Completion callbacks whose token is not current belong to a superseded
/// load and must be dropped.
#[derive(Debug, Default)]
pub struct LoadTracker {
    issued: AtomicU64,
    current: AtomicU64,
}

impl LoadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a new token and makes it current.
    pub fn begin(&self) -> LoadToken {
        let token = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        self.current.store(token, Ordering::SeqCst);
        LoadToken(token)
    }

    pub fn current(&self) -> Option<LoadToken> {
        match self.current.load(Ordering::SeqCst) {
            0 => None,
            v => Some(LoadToken(v)),
        }
    }

    pub fn is_current(&self, token: LoadToken) -> bool {
        self.current.load(Ordering::SeqCst) == token.0
    }

    /// Forgets the current load (after stop/terminate); every token goes stale.
    pub fn cancel(&self) {
        self.current.store(0, Ordering::SeqCst);
    }
}

/// Loading-indicator state derived from content events.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    Loading { url: String, percent: u8 },
    Finished { url: String },
    Failed { url: String, message: String },
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading { .. } => "loading",
            Self::Finished { .. } => "finished",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::Loading { url, .. } | Self::Finished { url } | Self::Failed { url, .. } => {
                Some(url)
            }
        }
    }
}
