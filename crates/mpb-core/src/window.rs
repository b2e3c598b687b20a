//! Lifecycle window: keep the focused profile and its list neighbours,
//! ask every other resident slot to terminate.

use std::sync::Arc;

use mpb_db::slot_repository::SlotEntry;
use tracing::{debug, info};

use crate::bus::{SignalBus, TerminationRequest};
use crate::error::ControllerError;
use crate::event::{SessionEvent, SessionEventKind, SessionEventOutcome, SessionEventSink};
use crate::store::{ProfileStore, SlotRegistry};

/// Result of one enforcer pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowPlan {
    pub focused: String,
    /// Predecessor, focused, successor in list order.
    pub safe: Vec<String>,
    /// Registry residents outside the safe set, one per profile.
    pub doomed: Vec<String>,
}

impl WindowPlan {
    pub fn is_safe(&self, profile_id: &str) -> bool {
        self.safe.iter().any(|id| id == profile_id)
    }
}

/// `{list[i-1], list[i], list[i+1]}` around `focused`; just `{focused}`
/// when it is not in the list.
pub fn safe_set(ordered_ids: &[String], focused: &str) -> Vec<String> {
    let Some(index) = ordered_ids.iter().position(|id| id == focused) else {
        return vec![focused.to_string()];
    };
    let start = index.saturating_sub(1);
    let end = (index + 2).min(ordered_ids.len());
    ordered_ids[start..end].to_vec()
}

pub fn plan(ordered_ids: &[String], entries: &[SlotEntry], focused: &str) -> WindowPlan {
    let safe = safe_set(ordered_ids, focused);
    let mut doomed: Vec<String> = Vec::new();
    for entry in entries {
        let Some(profile_id) = entry.profile_id.as_deref() else {
            continue;
        };
        if safe.iter().any(|id| id == profile_id) || doomed.iter().any(|id| id == profile_id) {
            continue;
        }
        doomed.push(profile_id.to_string());
    }
    WindowPlan {
        focused: focused.to_string(),
        safe,
        doomed,
    }
}

#[derive(Clone)]
pub struct WindowEnforcer {
    profiles: Arc<dyn ProfileStore>,
    registry: Arc<dyn SlotRegistry>,
    bus: SignalBus,
    events: Arc<dyn SessionEventSink>,
}

impl WindowEnforcer {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        registry: Arc<dyn SlotRegistry>,
        bus: SignalBus,
        events: Arc<dyn SessionEventSink>,
    ) -> Self {
        Self {
            profiles,
            registry,
            bus,
            events,
        }
    }

    /// Computes the plan without signalling anyone.
    pub fn preview(&self, focused: &str) -> Result<WindowPlan, ControllerError> {
        let ordered: Vec<String> = self
            .profiles
            .list()?
            .into_iter()
            .map(|profile| profile.id)
            .collect();
        let entries = self.registry.entries()?;
        Ok(plan(&ordered, &entries, focused))
    }

    /// Recomputes the window around `focused` and broadcasts a termination
    /// request for every resident outside it.
    pub fn enforce(&self, focused: &str) -> Result<WindowPlan, ControllerError> {
        let plan = self.preview(focused)?;
        for profile_id in &plan.doomed {
            info!(profile_id = %profile_id, focused = %focused, "profile outside window; requesting termination");
            let listeners = self.bus.publish(TerminationRequest::new(profile_id.clone()));
            self.events.record(SessionEvent::new(
                None,
                Some(profile_id),
                SessionEventKind::Enforce,
                SessionEventOutcome::Success,
                format!("focused={focused} listeners={listeners}"),
            ));
        }
        debug!(focused = %focused, safe = ?plan.safe, doomed = plan.doomed.len(), "window enforced");
        Ok(plan)
    }
}
