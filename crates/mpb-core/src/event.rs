//! Slot operation events for audit and debugging.
//!
//! The controller and every slot host emit one event per decision
//! (open, smart hit, rotation, termination, recovery) so a run can be
//! reconstructed after the fact.

use chrono::{DateTime, Utc};
use mpb_db::slot_repository::Slot;

/// The kind of slot operation that generated an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEventKind {
    Open,
    SmartHit,
    Rotate,
    Bind,
    Recreate,
    Load,
    Focus,
    Blur,
    Teardown,
    Enforce,
    Terminate,
}

impl std::fmt::Display for SessionEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Open => "open",
            Self::SmartHit => "smart_hit",
            Self::Rotate => "rotate",
            Self::Bind => "bind",
            Self::Recreate => "recreate",
            Self::Load => "load",
            Self::Focus => "focus",
            Self::Blur => "blur",
            Self::Teardown => "teardown",
            Self::Enforce => "enforce",
            Self::Terminate => "terminate",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEventOutcome {
    Success,
    Skipped,
    Error(String),
}

impl std::fmt::Display for SessionEventOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Skipped => f.write_str("skipped"),
            Self::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub timestamp: DateTime<Utc>,
    pub slot: Option<Slot>,
    pub profile_id: Option<String>,
    pub kind: SessionEventKind,
    pub outcome: SessionEventOutcome,
    pub detail: String,
}

impl SessionEvent {
    pub fn new(
        slot: Option<Slot>,
        profile_id: Option<&str>,
        kind: SessionEventKind,
        outcome: SessionEventOutcome,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            slot,
            profile_id: profile_id.map(str::to_string),
            kind,
            outcome,
            detail: detail.into(),
        }
    }
}

pub trait SessionEventSink: Send + Sync {
    fn record(&self, event: SessionEvent);
}

/// In-memory event sink for testing.
#[derive(Default)]
pub struct InMemoryEventSink {
    events: std::sync::Mutex<Vec<SessionEvent>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self) -> usize {
        match self.events.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Events of one kind, in arrival order.
    pub fn of_kind(&self, kind: SessionEventKind) -> Vec<SessionEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.kind == kind)
            .collect()
    }
}

impl SessionEventSink for InMemoryEventSink {
    fn record(&self, event: SessionEvent) {
        match self.events.lock() {
            Ok(mut guard) => guard.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// No-op event sink that discards all events.
pub struct NullEventSink;

impl SessionEventSink for NullEventSink {
    fn record(&self, _event: SessionEvent) {}
}
