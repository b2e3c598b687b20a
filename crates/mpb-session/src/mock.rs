//! Mock content session and context factory for unit testing.
//!
//! Both record every call and can be configured to inject errors or to
//! hand out a context whose storage binding is already consumed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::SessionError;
use crate::lifecycle::{SessionOperation, StorageBinding};
use crate::session::{ContentSession, ContextFactory};
use crate::types::{BindingState, ContentEvent, ContentEventSender, LoadToken, Ready};

/// A recorded call to a mock session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Initialize(String),
    Load { token: LoadToken, url: String },
    GoBack { token: LoadToken },
    GoForward { token: LoadToken },
    Stop,
    Flush,
    Terminate,
}

/// How a mock session answers `load`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadBehavior {
    /// Emit progress and `LoadFinished` immediately.
    #[default]
    Complete,
    /// Emit `LoadFailed` with the message.
    Fail(String),
    /// Emit nothing; the test drives events with `emit`.
    Manual,
    /// Emit `LoadFinished` after the delay on a spawned task.
    Delayed(Duration),
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Visited urls and the position of the current page.
#[derive(Debug, Default)]
struct History {
    entries: Vec<String>,
    current: usize,
}

impl History {
    fn visit(&mut self, url: &str) {
        if !self.entries.is_empty() {
            self.entries.truncate(self.current + 1);
        }
        self.entries.push(url.to_string());
        self.current = self.entries.len() - 1;
    }

    fn can_go_back(&self) -> bool {
        self.current > 0
    }

    fn can_go_forward(&self) -> bool {
        self.current + 1 < self.entries.len()
    }

    fn step(&mut self, forward: bool) -> Option<String> {
        let allowed = if forward {
            self.can_go_forward()
        } else {
            self.can_go_back()
        };
        if !allowed {
            return None;
        }
        self.current = if forward {
            self.current + 1
        } else {
            self.current - 1
        };
        self.entries.get(self.current).cloned()
    }
}

/// Mock implementation of `ContentSession` for testing.
pub struct MockContentSession {
    generation: u64,
    binding: StorageBinding,
    events: ContentEventSender,
    calls: Mutex<Vec<MockCall>>,
    history: Mutex<History>,
    load_behavior: Mutex<LoadBehavior>,
    initialize_error: Mutex<Option<SessionError>>,
    load_error: Mutex<Option<SessionError>>,
}

impl MockContentSession {
    pub fn new(generation: u64, events: ContentEventSender) -> Self {
        Self::with_binding(generation, events, StorageBinding::new())
    }

    fn with_binding(generation: u64, events: ContentEventSender, binding: StorageBinding) -> Self {
        Self {
            generation,
            binding,
            events,
            calls: Mutex::new(Vec::new()),
            history: Mutex::new(History::default()),
            load_behavior: Mutex::new(LoadBehavior::default()),
            initialize_error: Mutex::new(None),
            load_error: Mutex::new(None),
        }
    }

    /// A context whose storage was bound to `profile_id` before hand-off.
    pub fn dirty(generation: u64, events: ContentEventSender, profile_id: &str) -> Self {
        Self::with_binding(generation, events, StorageBinding::already_bound(profile_id))
    }

    pub fn set_load_behavior(&self, behavior: LoadBehavior) {
        *lock(&self.load_behavior) = behavior;
    }

    /// Configure the next `initialize` to return an error.
    pub fn fail_next_initialize(&self, err: SessionError) {
        *lock(&self.initialize_error) = Some(err);
    }

    /// Configure the next `load` to return an error.
    pub fn fail_next_load(&self, err: SessionError) {
        *lock(&self.load_error) = Some(err);
    }

    /// Push a content event as if the renderer produced it.
    pub fn emit(&self, event: ContentEvent) {
        let _ = self.events.send(event);
    }

    /// Return all recorded calls.
    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.calls).clone()
    }

    pub fn initialize_count(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| matches!(call, MockCall::Initialize(_)))
            .count()
    }

    /// URLs passed to `load`, in call order.
    pub fn loaded_urls(&self) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                MockCall::Load { url, .. } => Some(url.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &MockCall) -> usize {
        lock(&self.calls).iter().filter(|c| *c == call).count()
    }

    /// Url of the current history entry.
    pub fn current_url(&self) -> Option<String> {
        let history = lock(&self.history);
        history.entries.get(history.current).cloned()
    }

    fn record(&self, call: MockCall) {
        lock(&self.calls).push(call);
    }

    fn navigate(&self, token: LoadToken, forward: bool) -> Result<(), SessionError> {
        self.binding.require(SessionOperation::Navigate)?;
        let Some(url) = lock(&self.history).step(forward) else {
            return Err(SessionError::InvalidState {
                current_state: "no history entry".to_string(),
                operation: if forward { "go_forward" } else { "go_back" }.to_string(),
            });
        };
        self.answer(token, url);
        Ok(())
    }

    fn answer(&self, token: LoadToken, url: String) {
        let behavior = lock(&self.load_behavior).clone();
        match behavior {
            LoadBehavior::Complete => {
                self.emit(ContentEvent::Progress {
                    token,
                    percent: 100,
                });
                self.emit(ContentEvent::LoadFinished { token, url });
            }
            LoadBehavior::Fail(message) => {
                self.emit(ContentEvent::LoadFailed {
                    token,
                    url,
                    message,
                });
            }
            LoadBehavior::Manual => {}
            LoadBehavior::Delayed(delay) => {
                let events = self.events.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(ContentEvent::LoadFinished { token, url });
                });
            }
        }
    }
}

#[async_trait]
impl ContentSession for MockContentSession {
    fn binding(&self) -> BindingState {
        self.binding.state()
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    async fn initialize(&self, profile_id: &str) -> Result<Ready, SessionError> {
        self.record(MockCall::Initialize(profile_id.to_string()));
        if let Some(err) = lock(&self.initialize_error).take() {
            return Err(err);
        }
        self.binding.bind(profile_id)?;
        Ok(Ready {
            profile_id: profile_id.to_string(),
            context_generation: self.generation,
        })
    }

    async fn load(&self, token: LoadToken, url: &str) -> Result<(), SessionError> {
        self.record(MockCall::Load {
            token,
            url: url.to_string(),
        });
        self.binding.require(SessionOperation::Load)?;
        if let Some(err) = lock(&self.load_error).take() {
            return Err(err);
        }

        lock(&self.history).visit(url);
        self.answer(token, url.to_string());
        Ok(())
    }

    fn can_go_back(&self) -> bool {
        lock(&self.history).can_go_back()
    }

    fn can_go_forward(&self) -> bool {
        lock(&self.history).can_go_forward()
    }

    async fn go_back(&self, token: LoadToken) -> Result<(), SessionError> {
        self.record(MockCall::GoBack { token });
        self.navigate(token, false)
    }

    async fn go_forward(&self, token: LoadToken) -> Result<(), SessionError> {
        self.record(MockCall::GoForward { token });
        self.navigate(token, true)
    }

    async fn stop(&self) -> Result<(), SessionError> {
        self.record(MockCall::Stop);
        self.binding.require(SessionOperation::Stop)
    }

    async fn flush(&self) -> Result<(), SessionError> {
        self.record(MockCall::Flush);
        self.binding.require(SessionOperation::Flush)
    }

    async fn terminate(&self) -> Result<(), SessionError> {
        self.record(MockCall::Terminate);
        self.binding.terminate();
        Ok(())
    }
}

/// Mock implementation of `ContextFactory` that keeps every context it made.
pub struct MockContextFactory {
    next_generation: AtomicU64,
    sessions: Mutex<Vec<Arc<MockContentSession>>>,
    dirty_first: Mutex<Option<String>>,
    load_behavior: Mutex<LoadBehavior>,
    create_error: Mutex<Option<SessionError>>,
}

impl Default for MockContextFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MockContextFactory {
    pub fn new() -> Self {
        Self {
            next_generation: AtomicU64::new(1),
            sessions: Mutex::new(Vec::new()),
            dirty_first: Mutex::new(None),
            load_behavior: Mutex::new(LoadBehavior::default()),
            create_error: Mutex::new(None),
        }
    }

    /// The next context handed out is already bound to `profile_id`.
    pub fn with_dirty_first_context(self, profile_id: &str) -> Self {
        *lock(&self.dirty_first) = Some(profile_id.to_string());
        self
    }

    /// Load behavior applied to every context created from now on.
    pub fn with_load_behavior(self, behavior: LoadBehavior) -> Self {
        *lock(&self.load_behavior) = behavior;
        self
    }

    /// Configure the next `create` to return an error.
    pub fn with_create_error(self, err: SessionError) -> Self {
        *lock(&self.create_error) = Some(err);
        self
    }

    pub fn set_load_behavior(&self, behavior: LoadBehavior) {
        *lock(&self.load_behavior) = behavior;
    }

    pub fn created_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn sessions(&self) -> Vec<Arc<MockContentSession>> {
        lock(&self.sessions).clone()
    }

    pub fn latest(&self) -> Option<Arc<MockContentSession>> {
        lock(&self.sessions).last().cloned()
    }

    /// Total `initialize` calls across every context this factory made.
    pub fn initialize_count(&self) -> usize {
        lock(&self.sessions)
            .iter()
            .map(|session| session.initialize_count())
            .sum()
    }
}

#[async_trait]
impl ContextFactory for MockContextFactory {
    async fn create(
        &self,
        events: ContentEventSender,
    ) -> Result<Arc<dyn ContentSession>, SessionError> {
        if let Some(err) = lock(&self.create_error).take() {
            return Err(err);
        }

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let session = match lock(&self.dirty_first).take() {
            Some(profile_id) => MockContentSession::dirty(generation, events, &profile_id),
            None => MockContentSession::new(generation, events),
        };
        session.set_load_behavior(lock(&self.load_behavior).clone());

        let session = Arc::new(session);
        lock(&self.sessions).push(session.clone());
        Ok(session)
    }
}
