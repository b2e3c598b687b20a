//! Slot controller: decides which slot hosts a requested profile.
//!
//! Selection order is explicit hint, then smart hit (registry already lists
//! the profile), then rotation. Switches are deferred by a short debounce;
//! repeated requests for the same profile inside that window share one switch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use mpb_db::slot_repository::Slot;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{RotationMode, SlotsConfig};
use crate::error::ControllerError;
use crate::event::{SessionEvent, SessionEventKind, SessionEventOutcome};
use crate::request::{OpenRequest, RequestSource};
use crate::slot_host::{Delivery, HostDeps, SlotHost};

/// How the target slot was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotDecision {
    Hint,
    SmartHit,
    Rotation,
}

impl SlotDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hint => "hint",
            Self::SmartHit => "smart_hit",
            Self::Rotation => "rotation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// The slot now hosts the profile and has focus.
    Switched {
        slot: Slot,
        decision: SlotDecision,
        /// Whether a context was bound. False for live residents.
        initialized: bool,
    },
    /// The focused slot already hosts the profile; nothing changed.
    AlreadyResident { slot: Slot },
    /// Shared the result of an identical request inside the debounce window.
    Coalesced { slot: Slot },
    /// Deep link naming an unknown profile; dropped.
    Ignored,
}

impl OpenOutcome {
    pub fn slot(&self) -> Option<Slot> {
        match self {
            Self::Switched { slot, .. }
            | Self::AlreadyResident { slot }
            | Self::Coalesced { slot } => Some(*slot),
            Self::Ignored => None,
        }
    }
}

type SharedResult = Option<Result<Option<Slot>, ControllerError>>;
type PendingSwitches = HashMap<String, watch::Receiver<SharedResult>>;

/// Leader's claim on a pending switch. Dropping it unsettled releases the
/// profile and wakes followers with `Cancelled`.
struct PendingSwitch<'a> {
    pending: &'a Mutex<PendingSwitches>,
    profile_id: String,
    tx: Option<watch::Sender<SharedResult>>,
}

impl PendingSwitch<'_> {
    fn settle(&mut self, shared: Result<Option<Slot>, ControllerError>) {
        if let Some(tx) = self.tx.take() {
            lock_pending(self.pending).remove(&self.profile_id);
            tx.send_replace(Some(shared));
        }
    }
}

impl Drop for PendingSwitch<'_> {
    fn drop(&mut self) {
        self.settle(Err(ControllerError::Cancelled {
            reason: "leading request dropped".to_string(),
        }));
    }
}

fn lock_pending(pending: &Mutex<PendingSwitches>) -> MutexGuard<'_, PendingSwitches> {
    match pending.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub struct SlotController {
    deps: HostDeps,
    hosts: HashMap<Slot, Arc<SlotHost>>,
    debounce: Duration,
    rotation: RotationMode,
    focused: Mutex<Option<Slot>>,
    pending: Mutex<PendingSwitches>,
    switch_lock: tokio::sync::Mutex<()>,
}

impl SlotController {
    /// Spawns one host per rotation slot. Delta is reserved and gets none.
    pub fn new(deps: HostDeps, cfg: &SlotsConfig) -> Self {
        let settle = Duration::from_millis(cfg.settle_delay_ms);
        let hosts = Slot::ROTATION
            .into_iter()
            .map(|slot| (slot, SlotHost::spawn(slot, deps.clone(), settle)))
            .collect();
        Self {
            deps,
            hosts,
            debounce: Duration::from_millis(cfg.switch_debounce_ms),
            rotation: cfg.rotation,
            focused: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            switch_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn host(&self, slot: Slot) -> Option<Arc<SlotHost>> {
        self.hosts.get(&slot).cloned()
    }

    pub fn focused(&self) -> Option<Slot> {
        match self.focused.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_focused(&self, slot: Option<Slot>) {
        match self.focused.lock() {
            Ok(mut guard) => *guard = slot,
            Err(poisoned) => *poisoned.into_inner() = slot,
        }
    }

    /// Opens `request.profile_id` in a slot and gives it focus.
    pub async fn request_open(&self, request: OpenRequest) -> Result<OpenOutcome, ControllerError> {
        request.validate()?;

        let leader = {
            let mut pending = lock_pending(&self.pending);
            match pending.get(&request.profile_id) {
                Some(rx) => Err(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    pending.insert(request.profile_id.clone(), rx);
                    Ok(tx)
                }
            }
        };

        let mut claim = match leader {
            Ok(tx) => PendingSwitch {
                pending: &self.pending,
                profile_id: request.profile_id.clone(),
                tx: Some(tx),
            },
            Err(mut rx) => {
                debug!(profile_id = %request.profile_id, "coalescing repeated open request");
                let dropped = || ControllerError::Cancelled {
                    reason: "pending switch dropped".to_string(),
                };
                let shared = rx.wait_for(Option::is_some).await.map_err(|_| dropped())?;
                return match &*shared {
                    Some(Ok(Some(slot))) => Ok(OpenOutcome::Coalesced { slot: *slot }),
                    Some(Ok(None)) => Ok(OpenOutcome::Ignored),
                    Some(Err(err)) => Err(err.shared()),
                    None => Err(dropped()),
                };
            }
        };

        if !self.debounce.is_zero() {
            tokio::time::sleep(self.debounce).await;
        }

        let result = {
            let _switch = self.switch_lock.lock().await;
            self.switch(&request).await
        };

        claim.settle(match &result {
            Ok(outcome) => Ok(outcome.slot()),
            Err(err) => Err(err.shared()),
        });

        let (outcome, detail) = match &result {
            Ok(outcome) => (SessionEventOutcome::Success, format!("{outcome:?}")),
            Err(err) => {
                warn!(profile_id = %request.profile_id, error = %err, "open request failed");
                (SessionEventOutcome::Error(err.to_string()), String::new())
            }
        };
        self.deps.events.record(SessionEvent::new(
            result.as_ref().ok().and_then(OpenOutcome::slot),
            Some(&request.profile_id),
            SessionEventKind::Open,
            outcome,
            detail,
        ));
        result
    }

    async fn switch(&self, request: &OpenRequest) -> Result<OpenOutcome, ControllerError> {
        let profile_id = request.profile_id.as_str();
        let profile = match self.deps.profiles.get(profile_id)? {
            Some(profile) => profile,
            None if request.source == RequestSource::ExternalDeepLink => {
                warn!(profile_id = %profile_id, "switch request for unknown profile dropped");
                return Ok(OpenOutcome::Ignored);
            }
            None => return Err(ControllerError::not_found(profile_id)),
        };

        let (slot, decision) = self.choose_slot(request)?;
        let host = self
            .hosts
            .get(&slot)
            .cloned()
            .ok_or_else(|| ControllerError::InvalidRequest {
                message: format!("slot {slot} is reserved"),
            })?;

        if host.is_resident(profile_id) && self.focused() == Some(slot) {
            debug!(slot = %slot, profile_id = %profile_id, "already resident in focused slot");
            return Ok(OpenOutcome::AlreadyResident { slot });
        }

        if let Some(previous) = self.focused().and_then(|s| self.hosts.get(&s)) {
            if previous.slot() != slot {
                if let Err(err) = previous.blur().await {
                    warn!(slot = %previous.slot(), error = %err, "blur failed");
                }
            }
        }

        let initialized = match host.deliver(&profile).await? {
            Delivery::AlreadyResident => false,
            Delivery::Bound { .. } => true,
        };
        if decision == SlotDecision::SmartHit && !initialized {
            self.deps.events.record(SessionEvent::new(
                Some(slot),
                Some(profile_id),
                SessionEventKind::SmartHit,
                SessionEventOutcome::Success,
                "",
            ));
        }

        self.set_focused(Some(slot));
        if let Err(err) = host.focus().await {
            warn!(slot = %slot, profile_id = %profile_id, error = %err, "enforcing window failed");
        }

        info!(
            slot = %slot,
            profile_id = %profile_id,
            decision = decision.as_str(),
            initialized,
            "profile opened"
        );
        Ok(OpenOutcome::Switched {
            slot,
            decision,
            initialized,
        })
    }

    fn choose_slot(&self, request: &OpenRequest) -> Result<(Slot, SlotDecision), ControllerError> {
        match request.slot_hint {
            Some(Slot::Delta) => {
                return Err(ControllerError::InvalidRequest {
                    message: format!("slot {} is reserved", Slot::Delta),
                })
            }
            Some(slot) => return Ok((slot, SlotDecision::Hint)),
            None => {}
        }
        match self.deps.registry.find_slot_for(&request.profile_id)? {
            Some(Slot::Delta) => {
                debug!(profile_id = %request.profile_id, "registry lists reserved slot; rotating");
            }
            Some(slot) => {
                debug!(slot = %slot, profile_id = %request.profile_id, "smart hit");
                return Ok((slot, SlotDecision::SmartHit));
            }
            None => {}
        }

        let origin = self.focused().unwrap_or(Slot::Main);
        let slot = match self.rotation {
            RotationMode::Shared => self.deps.registry.advance_rotation(origin)?,
            RotationMode::Relative => origin.next_in_rotation(),
        };
        info!(origin = %origin, slot = %slot, mode = self.rotation.as_str(), "rotating into slot");
        self.deps.events.record(SessionEvent::new(
            Some(slot),
            Some(&request.profile_id),
            SessionEventKind::Rotate,
            SessionEventOutcome::Success,
            format!("origin={origin}"),
        ));
        Ok((slot, SlotDecision::Rotation))
    }

    /// Flushes the focused slot and drops focus.
    pub async fn blur(&self) -> Result<(), ControllerError> {
        let Some(host) = self.focused().and_then(|slot| self.host(slot)) else {
            return Ok(());
        };
        host.blur().await
    }

    /// Tears every slot down and stops their listeners.
    pub async fn shutdown(&self) {
        for slot in Slot::ROTATION {
            if let Some(host) = self.hosts.get(&slot) {
                host.shutdown().await;
            }
        }
        self.set_focused(None);
    }
}
