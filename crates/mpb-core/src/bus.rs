//! Process-wide best-effort termination broadcast.
//!
//! Every listening slot sees every request once. Receivers decide for
//! themselves whether a request names their resident profile.

use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Ask whichever slot hosts `profile_id` to terminate its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminationRequest {
    pub profile_id: String,
}

impl TerminationRequest {
    pub fn new(profile_id: impl Into<String>) -> Self {
        Self {
            profile_id: profile_id.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignalBus {
    tx: broadcast::Sender<TerminationRequest>,
}

impl SignalBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Fire-and-forget. Returns how many listeners the request reached.
    pub fn publish(&self, request: TerminationRequest) -> usize {
        let profile_id = request.profile_id.clone();
        match self.tx.send(request) {
            Ok(listeners) => {
                debug!(profile_id = %profile_id, listeners, "termination request published");
                listeners
            }
            Err(_) => {
                debug!(profile_id = %profile_id, "termination request had no listeners");
                0
            }
        }
    }

    /// Listens from now on; earlier requests are not replayed.
    pub fn subscribe(&self) -> SignalReceiver {
        SignalReceiver {
            rx: self.tx.subscribe(),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

pub struct SignalReceiver {
    rx: broadcast::Receiver<TerminationRequest>,
}

impl SignalReceiver {
    /// Next request, or `None` once every bus handle is gone.
    pub async fn recv(&mut self) -> Option<TerminationRequest> {
        loop {
            match self.rx.recv().await {
                Ok(request) => return Some(request),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "termination listener lagged; dropped requests");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
