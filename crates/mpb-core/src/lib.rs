//! mpb-core: slot assignment and lifecycle management.
//!
//! - `SlotController`: picks a slot for each open request (hint, smart hit,
//!   rotation) and debounces repeated requests
//! - `SlotHost`: runtime of one slot; binds, recreates and tears down its
//!   content session
//! - `WindowEnforcer`: keeps the focused profile and its list neighbours,
//!   signals every other resident to terminate over the `SignalBus`
//!
//! Every decision emits a `SessionEvent` through the `SessionEventSink` trait.

pub mod bus;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod logging;
pub mod request;
pub mod slot_host;
pub mod store;
pub mod window;

/// Stable crate label used for bootstrap smoke tests.
pub fn crate_label() -> &'static str {
    "mpb-core"
}
