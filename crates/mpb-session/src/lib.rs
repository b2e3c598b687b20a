//! mpb-session: content session contract for one execution slot.
//!
//! A content session owns one isolated storage/network context and one
//! renderable surface. The slot manager drives it only through the
//! `ContentSession` trait and observes it only through `ContentEvent`s:
//! - `ContextFactory`: hands out a fresh context whenever the host recreates one
//! - `MockContentSession` / `MockContextFactory`: recording doubles for tests
//!
//! Storage binding is one-shot per context; see `lifecycle`.

pub mod error;
pub mod lifecycle;
pub mod mock;
pub mod session;
pub mod types;

/// Stable crate label used for bootstrap smoke tests.
pub fn crate_label() -> &'static str {
    "mpb-session"
}
