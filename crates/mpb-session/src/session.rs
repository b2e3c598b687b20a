//! Content session trait: the only way a slot host drives its renderer.
//!
//! Implementations wrap a real rendering engine or are mocked for testing.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SessionError;
use crate::types::{BindingState, ContentEventSender, LoadToken, Ready};

/// One isolated execution context plus its renderable surface.
///
/// Progress and completion are reported asynchronously through the
/// `ContentEventSender` handed to the factory that created the session.
#[async_trait]
pub trait ContentSession: Send + Sync {
    /// Current storage binding of the underlying context.
    fn binding(&self) -> BindingState;

    /// Generation of the context; bumps every time the host recreates it.
    fn generation(&self) -> u64;

    /// Binds isolated storage for `profile_id`. Must precede any other use.
    /// Fails with `DirtyContext` if the context is bound to another profile.
    async fn initialize(&self, profile_id: &str) -> Result<Ready, SessionError>;

    /// Starts loading `url`. Events for this load carry `token`.
    async fn load(&self, token: LoadToken, url: &str) -> Result<(), SessionError>;

    /// Whether the context's history has an entry behind the current page.
    fn can_go_back(&self) -> bool;

    /// Whether the context's history has an entry ahead of the current page.
    fn can_go_forward(&self) -> bool;

    /// Navigates one history entry back. Events carry `token`.
    async fn go_back(&self, token: LoadToken) -> Result<(), SessionError>;

    /// Navigates one history entry forward. Events carry `token`.
    async fn go_forward(&self, token: LoadToken) -> Result<(), SessionError>;

    /// Stops any in-flight load.
    async fn stop(&self) -> Result<(), SessionError>;

    /// Persists cookies and storage to disk.
    async fn flush(&self) -> Result<(), SessionError>;

    /// Stops loading and destroys the surface. Storage stays on disk.
    async fn terminate(&self) -> Result<(), SessionError>;
}

/// Creates fresh execution contexts for a slot host.
#[async_trait]
pub trait ContextFactory: Send + Sync {
    async fn create(
        &self,
        events: ContentEventSender,
    ) -> Result<Arc<dyn ContentSession>, SessionError>;
}
