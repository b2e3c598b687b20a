//! Runtime of one execution slot.
//!
//! A `SlotHost` owns at most one content session at a time. It binds the
//! session to a profile, recreates the context when the binding is dirty,
//! defers the first load by the settle delay, tracks load progress, and
//! terminates itself when a termination request names its resident.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use mpb_db::profile_repository::Profile;
use mpb_db::slot_repository::Slot;
use mpb_session::error::SessionError;
use mpb_session::session::{ContentSession, ContextFactory};
use mpb_session::types::{
    content_event_channel, BindingState, ContentEvent, ContentEventReceiver, LoadState, LoadToken,
    LoadTracker,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{SignalBus, TerminationRequest};
use crate::error::ControllerError;
use crate::event::{SessionEvent, SessionEventKind, SessionEventOutcome, SessionEventSink};
use crate::store::{ProfileStore, SlotRegistry};
use crate::window::{WindowEnforcer, WindowPlan};

/// Collaborators shared by every host and the controller.
#[derive(Clone)]
pub struct HostDeps {
    pub profiles: Arc<dyn ProfileStore>,
    pub registry: Arc<dyn SlotRegistry>,
    pub factory: Arc<dyn ContextFactory>,
    pub bus: SignalBus,
    pub events: Arc<dyn SessionEventSink>,
}

/// What `deliver` did with the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The live session already hosts the profile. Nothing was initialized.
    AlreadyResident,
    /// A context was bound to the profile and its first load scheduled.
    Bound { context_generation: u64 },
}

/// What a history navigation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// The session moved one entry; its events carry `token`.
    Moved { token: LoadToken },
    /// Back with no entry behind the current page closed the slot.
    TornDown,
    /// Forward with no entry ahead.
    Unchanged,
}

#[derive(Default)]
struct HostState {
    session: Option<Arc<dyn ContentSession>>,
    profile: Option<Profile>,
    pump: Option<CancellationToken>,
}

pub struct SlotHost {
    slot: Slot,
    deps: HostDeps,
    enforcer: WindowEnforcer,
    settle_delay: Duration,
    state: tokio::sync::Mutex<HostState>,
    resident: Mutex<Option<String>>,
    loads: Arc<LoadTracker>,
    load_state: Arc<watch::Sender<LoadState>>,
    shutdown: CancellationToken,
}

impl SlotHost {
    /// Creates the host and starts listening for termination requests.
    pub fn spawn(slot: Slot, deps: HostDeps, settle_delay: Duration) -> Arc<Self> {
        let enforcer = WindowEnforcer::new(
            deps.profiles.clone(),
            deps.registry.clone(),
            deps.bus.clone(),
            deps.events.clone(),
        );
        let (load_state, _) = watch::channel(LoadState::Idle);
        let host = Arc::new(Self {
            slot,
            deps,
            enforcer,
            settle_delay,
            state: tokio::sync::Mutex::new(HostState::default()),
            resident: Mutex::new(None),
            loads: Arc::new(LoadTracker::new()),
            load_state: Arc::new(load_state),
            shutdown: CancellationToken::new(),
        });
        host.listen();
        host
    }

    fn listen(self: &Arc<Self>) {
        let mut signals = self.deps.bus.subscribe();
        let weak: Weak<Self> = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        let slot = self.slot;
        tokio::spawn(async move {
            loop {
                let request = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    request = signals.recv() => request,
                };
                let Some(request) = request else { break };
                let Some(host) = weak.upgrade() else { break };
                host.handle_signal(request).await;
            }
            debug!(slot = %slot, "termination listener stopped");
        });
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    /// Profile bound to the live session, if any.
    pub fn resident(&self) -> Option<String> {
        match self.resident.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_resident(&self, profile_id: &str) -> bool {
        self.resident().as_deref() == Some(profile_id)
    }

    pub fn load_state(&self) -> LoadState {
        self.load_state.borrow().clone()
    }

    pub fn watch_load_state(&self) -> watch::Receiver<LoadState> {
        self.load_state.subscribe()
    }

    pub async fn binding(&self) -> BindingState {
        let state = self.state.lock().await;
        match &state.session {
            Some(session) => session.binding(),
            None => BindingState::Uninitialized,
        }
    }

    fn set_resident(&self, profile_id: Option<&str>) {
        let value = profile_id.map(str::to_string);
        match self.resident.lock() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }

    fn record(
        &self,
        profile_id: Option<&str>,
        kind: SessionEventKind,
        outcome: SessionEventOutcome,
        detail: impl Into<String>,
    ) {
        self.deps.events.record(SessionEvent::new(
            Some(self.slot),
            profile_id,
            kind,
            outcome,
            detail,
        ));
    }

    /// Hands `profile` to this slot.
    ///
    /// A live session already bound to the profile is left untouched. A live
    /// session bound to another profile is re-registered, destroyed and
    /// replaced. Otherwise the context is bound, and on `DirtyContext`
    /// recreated once and bound again. On failure no session is left running.
    pub async fn deliver(&self, profile: &Profile) -> Result<Delivery, ControllerError> {
        let mut state = self.state.lock().await;

        let bound = state
            .session
            .as_ref()
            .and_then(|session| session.binding().bound_profile().map(str::to_string));
        match bound {
            Some(bound) if bound == profile.id => {
                debug!(slot = %self.slot, profile_id = %profile.id, "profile already resident");
                state.profile = Some(profile.clone());
                return Ok(Delivery::AlreadyResident);
            }
            Some(bound) => {
                info!(
                    slot = %self.slot,
                    current = %bound,
                    profile_id = %profile.id,
                    "slot reused for another profile; recreating context"
                );
                if let Err(err) = self.deps.registry.assign(self.slot, &profile.id) {
                    warn!(slot = %self.slot, profile_id = %profile.id, error = %err, "re-registering slot failed");
                }
                self.discard_context(&mut state).await;
                self.record(
                    Some(&profile.id),
                    SessionEventKind::Recreate,
                    SessionEventOutcome::Success,
                    format!("replaced {bound}"),
                );
            }
            None => {}
        }

        let session = match state.session.clone() {
            Some(session) if session.binding() == BindingState::Uninitialized => session,
            _ => {
                self.discard_context(&mut state).await;
                self.create_context(&mut state).await?
            }
        };

        let ready = match session.initialize(&profile.id).await {
            Ok(ready) => ready,
            Err(err) if err.is_fatal() => {
                warn!(slot = %self.slot, profile_id = %profile.id, error = %err, "dirty context; recreating");
                self.record(
                    Some(&profile.id),
                    SessionEventKind::Recreate,
                    SessionEventOutcome::Error(err.to_string()),
                    "dirty context",
                );
                self.discard_context(&mut state).await;
                let fresh = self.create_context(&mut state).await?;
                match fresh.initialize(&profile.id).await {
                    Ok(ready) => ready,
                    Err(err) => return Err(self.abandon(&mut state, profile, err).await),
                }
            }
            Err(err) => return Err(self.abandon(&mut state, profile, err).await),
        };

        if let Err(err) = self.deps.registry.assign(self.slot, &profile.id) {
            warn!(slot = %self.slot, profile_id = %profile.id, error = %err, "registry assign failed; abandoning bind");
            self.discard_context(&mut state).await;
            return Err(err.into());
        }

        info!(
            slot = %self.slot,
            profile_id = %profile.id,
            generation = ready.context_generation,
            "profile bound"
        );
        self.record(
            Some(&profile.id),
            SessionEventKind::Bind,
            SessionEventOutcome::Success,
            format!("generation={}", ready.context_generation),
        );

        state.profile = Some(profile.clone());
        self.set_resident(Some(&profile.id));
        let session = state.session.clone();
        if let (Some(session), Some(pump)) = (session, state.pump.clone()) {
            self.schedule_load(session, pump, profile.url.clone(), self.settle_delay);
        }

        Ok(Delivery::Bound {
            context_generation: ready.context_generation,
        })
    }

    async fn abandon(
        &self,
        state: &mut HostState,
        profile: &Profile,
        err: SessionError,
    ) -> ControllerError {
        warn!(slot = %self.slot, profile_id = %profile.id, error = %err, "bind failed; no session left running");
        self.record(
            Some(&profile.id),
            SessionEventKind::Bind,
            SessionEventOutcome::Error(err.to_string()),
            "",
        );
        self.discard_context(state).await;
        ControllerError::Session(err)
    }

    async fn create_context(
        &self,
        state: &mut HostState,
    ) -> Result<Arc<dyn ContentSession>, ControllerError> {
        let (tx, rx) = content_event_channel();
        let session = self.deps.factory.create(tx).await?;
        let pump = self.shutdown.child_token();
        tokio::spawn(pump_events(
            self.slot,
            rx,
            session.clone(),
            self.loads.clone(),
            self.load_state.clone(),
            pump.clone(),
        ));
        debug!(slot = %self.slot, generation = session.generation(), "context created");
        state.session = Some(session.clone());
        state.pump = Some(pump);
        Ok(session)
    }

    /// Stops and destroys the current context. Storage stays on disk and the
    /// registry entry is kept.
    async fn discard_context(&self, state: &mut HostState) {
        self.loads.cancel();
        if let Some(pump) = state.pump.take() {
            pump.cancel();
        }
        if let Some(session) = state.session.take() {
            if session.binding().bound_profile().is_some() {
                if let Err(err) = session.stop().await {
                    debug!(slot = %self.slot, error = %err, "stop before terminate failed");
                }
            }
            if let Err(err) = session.terminate().await {
                warn!(slot = %self.slot, error = %err, "terminate failed");
            }
        }
        state.profile = None;
        self.set_resident(None);
        self.load_state.send_replace(LoadState::Idle);
    }

    fn schedule_load(
        &self,
        session: Arc<dyn ContentSession>,
        pump: CancellationToken,
        url: String,
        delay: Duration,
    ) -> LoadToken {
        let token = self.loads.begin();
        self.load_state.send_replace(LoadState::Loading {
            url: url.clone(),
            percent: 0,
        });
        let loads = self.loads.clone();
        let load_state = self.load_state.clone();
        let slot = self.slot;
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::select! {
                    _ = pump.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            if !loads.is_current(token) {
                debug!(slot = %slot, token = %token, "load superseded before start");
                return;
            }
            if let Err(err) = session.load(token, &url).await {
                warn!(slot = %slot, token = %token, url = %url, error = %err, "load rejected");
                if loads.is_current(token) {
                    load_state.send_replace(LoadState::Failed {
                        url,
                        message: err.to_string(),
                    });
                }
            }
        });
        token
    }

    /// Reloads the resident profile's url immediately. Supersedes any load
    /// in flight.
    pub async fn reload(&self) -> Result<LoadToken, ControllerError> {
        let state = self.state.lock().await;
        let (Some(session), Some(pump), Some(profile)) =
            (state.session.clone(), state.pump.clone(), state.profile.clone())
        else {
            return Err(ControllerError::InvalidRequest {
                message: format!("slot {} hosts no profile", self.slot),
            });
        };
        let url = match self.load_state().url() {
            Some(url) => url.to_string(),
            None => profile.url.clone(),
        };
        let token = self.schedule_load(session, pump, url, Duration::ZERO);
        self.record(
            Some(&profile.id),
            SessionEventKind::Load,
            SessionEventOutcome::Success,
            format!("reload {token}"),
        );
        Ok(token)
    }

    /// Goes back one history entry. With nothing behind the current page the
    /// slot is closed and torn down.
    pub async fn back(&self) -> Result<Navigation, ControllerError> {
        let mut state = self.state.lock().await;
        let session = self.navigable(&state)?;
        if !session.can_go_back() {
            self.teardown_locked(&mut state).await;
            return Ok(Navigation::TornDown);
        }
        self.navigate(&state, session, false).await
    }

    /// Goes forward one history entry, if there is one.
    pub async fn forward(&self) -> Result<Navigation, ControllerError> {
        let state = self.state.lock().await;
        let session = self.navigable(&state)?;
        if !session.can_go_forward() {
            return Ok(Navigation::Unchanged);
        }
        self.navigate(&state, session, true).await
    }

    fn navigable(&self, state: &HostState) -> Result<Arc<dyn ContentSession>, ControllerError> {
        match (&state.session, &state.profile) {
            (Some(session), Some(_)) => Ok(session.clone()),
            _ => Err(ControllerError::InvalidRequest {
                message: format!("slot {} hosts no profile", self.slot),
            }),
        }
    }

    async fn navigate(
        &self,
        state: &HostState,
        session: Arc<dyn ContentSession>,
        forward: bool,
    ) -> Result<Navigation, ControllerError> {
        let direction = if forward { "forward" } else { "back" };
        let profile_id = state.profile.as_ref().map(|p| p.id.as_str());
        let url = self
            .load_state()
            .url()
            .map(str::to_string)
            .or_else(|| state.profile.as_ref().map(|p| p.url.clone()))
            .unwrap_or_default();
        let token = self.loads.begin();
        self.load_state.send_replace(LoadState::Loading {
            url: url.clone(),
            percent: 0,
        });

        let result = if forward {
            session.go_forward(token).await
        } else {
            session.go_back(token).await
        };
        if let Err(err) = result {
            warn!(slot = %self.slot, token = %token, direction, error = %err, "history navigation rejected");
            if self.loads.is_current(token) {
                self.load_state.send_replace(LoadState::Failed {
                    url,
                    message: err.to_string(),
                });
            }
            self.record(
                profile_id,
                SessionEventKind::Load,
                SessionEventOutcome::Error(err.to_string()),
                direction,
            );
            return Err(err.into());
        }

        debug!(slot = %self.slot, token = %token, direction, "history navigation started");
        self.record(
            profile_id,
            SessionEventKind::Load,
            SessionEventOutcome::Success,
            format!("{direction} {token}"),
        );
        Ok(Navigation::Moved { token })
    }

    /// Marks the resident profile active and enforces the lifecycle window
    /// around it. Returns `None` when the slot hosts nothing.
    pub async fn focus(&self) -> Result<Option<WindowPlan>, ControllerError> {
        let Some(profile_id) = self.resident() else {
            return Ok(None);
        };
        self.deps.profiles.set_active(Some(&profile_id))?;
        let plan = self.enforcer.enforce(&profile_id)?;
        self.record(
            Some(&profile_id),
            SessionEventKind::Focus,
            SessionEventOutcome::Success,
            format!("doomed={}", plan.doomed.len()),
        );
        Ok(Some(plan))
    }

    /// Persists session data when the slot leaves the foreground.
    pub async fn blur(&self) -> Result<(), ControllerError> {
        let state = self.state.lock().await;
        let Some(session) = state.session.clone() else {
            return Ok(());
        };
        if session.binding().bound_profile().is_none() {
            return Ok(());
        }
        session.flush().await?;
        self.record(
            state.profile.as_ref().map(|p| p.id.as_str()),
            SessionEventKind::Blur,
            SessionEventOutcome::Success,
            "flushed",
        );
        Ok(())
    }

    /// Stops loading and destroys the session without clearing its storage.
    /// Clears the active marker when it names this slot's profile. Returns
    /// whether a session was torn down.
    pub async fn teardown(&self) -> bool {
        let mut state = self.state.lock().await;
        self.teardown_locked(&mut state).await
    }

    /// Tears down only while `profile_id` is still the resident. A delivery
    /// that won the state lock first keeps its new profile.
    pub async fn terminate_profile(&self, profile_id: &str) -> bool {
        let mut state = self.state.lock().await;
        let resident = state.profile.as_ref().map(|p| p.id.as_str());
        if resident != Some(profile_id) {
            return false;
        }
        self.teardown_locked(&mut state).await
    }

    async fn teardown_locked(&self, state: &mut HostState) -> bool {
        if state.session.is_none() {
            return false;
        }
        let profile_id = state.profile.as_ref().map(|p| p.id.clone());
        self.discard_context(state).await;

        if let Some(id) = profile_id.as_deref() {
            match self.deps.profiles.get_active() {
                Ok(active) if active.as_deref() == Some(id) => {
                    if let Err(err) = self.deps.profiles.set_active(None) {
                        warn!(slot = %self.slot, profile_id = %id, error = %err, "clearing active marker failed");
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(slot = %self.slot, profile_id = %id, error = %err, "reading active marker failed");
                }
            }
        }

        info!(slot = %self.slot, profile_id = ?profile_id, "slot torn down");
        self.record(
            profile_id.as_deref(),
            SessionEventKind::Teardown,
            SessionEventOutcome::Success,
            "",
        );
        true
    }

    async fn handle_signal(&self, request: TerminationRequest) {
        if !self.is_resident(&request.profile_id) {
            debug!(slot = %self.slot, profile_id = %request.profile_id, "termination request for another slot");
            return;
        }
        info!(slot = %self.slot, profile_id = %request.profile_id, "termination requested for resident profile");
        let outcome = if self.terminate_profile(&request.profile_id).await {
            SessionEventOutcome::Success
        } else {
            SessionEventOutcome::Skipped
        };
        self.record(
            Some(&request.profile_id),
            SessionEventKind::Terminate,
            outcome,
            "signal",
        );
    }

    /// Tears the slot down and stops listening for termination requests.
    pub async fn shutdown(&self) {
        self.teardown().await;
        self.shutdown.cancel();
    }
}

async fn pump_events(
    slot: Slot,
    mut rx: ContentEventReceiver,
    session: Arc<dyn ContentSession>,
    loads: Arc<LoadTracker>,
    load_state: Arc<watch::Sender<LoadState>>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv() => event,
        };
        let Some(event) = event else { break };
        let token = event.token();
        if !loads.is_current(token) {
            debug!(slot = %slot, token = %token, "dropping event from superseded load");
            continue;
        }
        match event {
            ContentEvent::Progress { percent, .. } => {
                load_state.send_modify(|state| {
                    if let LoadState::Loading { percent: current, .. } = state {
                        *current = percent.min(100);
                    }
                });
            }
            ContentEvent::LoadFinished { url, .. } => {
                debug!(slot = %slot, token = %token, url = %url, "load finished");
                load_state.send_replace(LoadState::Finished { url });
                if let Err(err) = session.flush().await {
                    warn!(slot = %slot, error = %err, "flush after load failed");
                }
            }
            ContentEvent::LoadFailed { url, message, .. } => {
                warn!(slot = %slot, token = %token, url = %url, message = %message, "load failed");
                load_state.send_replace(LoadState::Failed { url, message });
            }
        }
    }
}
