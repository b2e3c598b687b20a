#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use mpb_core::bus::SignalBus;
use mpb_core::config::{RotationMode, SlotsConfig};
use mpb_core::event::InMemoryEventSink;
use mpb_core::slot_host::HostDeps;
use mpb_core::store::{MemoryStore, ProfileStore};
use mpb_db::profile_repository::Profile;
use mpb_session::mock::{MockContentSession, MockContextFactory};
use mpb_session::session::ContentSession;

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub factory: Arc<MockContextFactory>,
    pub events: Arc<InMemoryEventSink>,
    pub bus: SignalBus,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_factory(MockContextFactory::new())
    }

    pub fn with_factory(factory: MockContextFactory) -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            factory: Arc::new(factory),
            events: Arc::new(InMemoryEventSink::new()),
            bus: SignalBus::new(16),
        }
    }

    pub fn deps(&self) -> HostDeps {
        HostDeps {
            profiles: self.store.clone(),
            registry: self.store.clone(),
            factory: self.factory.clone(),
            bus: self.bus.clone(),
            events: self.events.clone(),
        }
    }

    /// Creates profiles in list order.
    pub fn profiles(&self, names: &[&str]) -> Vec<Profile> {
        names
            .iter()
            .map(|name| {
                self.store
                    .create(name, &format!("{}.test", name.to_lowercase()))
                    .unwrap()
            })
            .collect()
    }

    /// The mock context currently bound to `profile_id`, if any.
    pub fn session_for(&self, profile_id: &str) -> Option<Arc<MockContentSession>> {
        self.factory
            .sessions()
            .into_iter()
            .rev()
            .find(|session| session.binding().bound_profile() == Some(profile_id))
    }
}

pub fn fast_slots() -> SlotsConfig {
    SlotsConfig {
        switch_debounce_ms: 0,
        settle_delay_ms: 0,
        signal_buffer: 16,
        rotation: RotationMode::Shared,
    }
}

/// Polls `cond` until it holds or two seconds pass.
pub async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
