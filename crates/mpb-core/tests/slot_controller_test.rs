#![allow(clippy::expect_used, clippy::unwrap_used)]

//! Slot selection, smart hits, rotation and debouncing through the
//! controller, driven by mock content sessions and the in-memory store.

mod support;

use std::time::Duration;

use mpb_core::config::{RotationMode, SlotsConfig};
use mpb_core::controller::{OpenOutcome, SlotController, SlotDecision};
use mpb_core::error::ControllerError;
use mpb_core::event::SessionEventKind;
use mpb_core::request::OpenRequest;
use mpb_core::store::{ProfileStore, SlotRegistry};
use mpb_db::slot_repository::Slot;
use support::{fast_slots, wait_until, Harness};

fn controller(h: &Harness, cfg: &SlotsConfig) -> SlotController {
    SlotController::new(h.deps(), cfg)
}

async fn open(ctl: &SlotController, profile_id: &str) -> OpenOutcome {
    ctl.request_open(OpenRequest::user_tap(profile_id))
        .await
        .unwrap()
}

// ── Smart switch ──

#[tokio::test]
async fn smart_hit_reuses_live_resident_without_initialize() {
    let h = Harness::new();
    let ps = h.profiles(&["A", "B"]);
    let ctl = controller(&h, &fast_slots());

    let first = open(&ctl, &ps[0].id).await;
    open(&ctl, &ps[1].id).await;
    assert_eq!(h.factory.initialize_count(), 2);

    let again = open(&ctl, &ps[0].id).await;
    assert_eq!(
        again,
        OpenOutcome::Switched {
            slot: first.slot().unwrap(),
            decision: SlotDecision::SmartHit,
            initialized: false,
        }
    );
    assert_eq!(h.factory.initialize_count(), 2);
    assert_eq!(h.factory.created_count(), 2);
    assert_eq!(ctl.focused(), first.slot());
    assert_eq!(h.events.of_kind(SessionEventKind::SmartHit).len(), 1);
}

#[tokio::test]
async fn reopening_focused_resident_is_noop() {
    let h = Harness::new();
    let ps = h.profiles(&["A"]);
    let ctl = controller(&h, &fast_slots());

    let first = open(&ctl, &ps[0].id).await;
    let session = h.session_for(&ps[0].id).unwrap();
    wait_until("first load", || session.loaded_urls().len() == 1).await;

    let second = open(&ctl, &ps[0].id).await;
    assert_eq!(
        second,
        OpenOutcome::AlreadyResident {
            slot: first.slot().unwrap()
        }
    );
    assert_eq!(h.factory.initialize_count(), 1);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(session.loaded_urls().len(), 1);
}

#[tokio::test]
async fn smart_hit_on_stale_entry_rebinds_the_slot() {
    let h = Harness::new();
    let ps = h.profiles(&["A"]);
    h.store.assign(Slot::Gamma, &ps[0].id).unwrap();
    let ctl = controller(&h, &fast_slots());

    let outcome = open(&ctl, &ps[0].id).await;
    assert_eq!(
        outcome,
        OpenOutcome::Switched {
            slot: Slot::Gamma,
            decision: SlotDecision::SmartHit,
            initialized: true,
        }
    );
    assert!(ctl.host(Slot::Gamma).unwrap().is_resident(&ps[0].id));
}

// ── Rotation ──

#[tokio::test]
async fn misses_rotate_through_three_slots() {
    let h = Harness::new();
    let ps = h.profiles(&["P1", "P2", "P3", "P4", "P5"]);
    let ctl = controller(&h, &fast_slots());

    let mut slots = Vec::new();
    for profile in &ps {
        let outcome = open(&ctl, &profile.id).await;
        assert!(matches!(
            outcome,
            OpenOutcome::Switched {
                decision: SlotDecision::Rotation,
                initialized: true,
                ..
            }
        ));
        slots.push(outcome.slot().unwrap());
    }
    assert_eq!(
        slots,
        vec![Slot::Beta, Slot::Gamma, Slot::Main, Slot::Beta, Slot::Gamma]
    );
    assert_eq!(h.store.profile_in(Slot::Delta).unwrap(), None);
}

#[tokio::test]
async fn reused_slot_recreates_its_context() {
    let h = Harness::new();
    let ps = h.profiles(&["P1", "P2", "P3", "P4"]);
    let ctl = controller(&h, &fast_slots());

    for profile in &ps {
        open(&ctl, &profile.id).await;
    }
    assert_eq!(h.store.profile_in(Slot::Beta).unwrap(), Some(ps[3].id.clone()));
    let beta = ctl.host(Slot::Beta).unwrap();
    assert!(beta.is_resident(&ps[3].id));
    assert_eq!(h.factory.created_count(), 4);
}

#[tokio::test]
async fn shared_cursor_ignores_focus_changes() {
    let h = Harness::new();
    let ps = h.profiles(&["A", "B", "C"]);
    let ctl = controller(&h, &fast_slots());

    assert_eq!(open(&ctl, &ps[0].id).await.slot(), Some(Slot::Beta));
    assert_eq!(open(&ctl, &ps[1].id).await.slot(), Some(Slot::Gamma));
    assert_eq!(open(&ctl, &ps[0].id).await.slot(), Some(Slot::Beta));
    assert_eq!(open(&ctl, &ps[2].id).await.slot(), Some(Slot::Main));
}

#[tokio::test]
async fn relative_rotation_steps_from_focused_slot() {
    let h = Harness::new();
    let ps = h.profiles(&["A", "B", "C"]);
    let cfg = SlotsConfig {
        rotation: RotationMode::Relative,
        ..fast_slots()
    };
    let ctl = controller(&h, &cfg);

    assert_eq!(open(&ctl, &ps[0].id).await.slot(), Some(Slot::Beta));
    assert_eq!(open(&ctl, &ps[1].id).await.slot(), Some(Slot::Gamma));
    assert_eq!(open(&ctl, &ps[0].id).await.slot(), Some(Slot::Beta));
    assert_eq!(open(&ctl, &ps[2].id).await.slot(), Some(Slot::Gamma));
}

// ── Hints ──

#[tokio::test]
async fn explicit_hint_wins_over_registry() {
    let h = Harness::new();
    let ps = h.profiles(&["A"]);
    let ctl = controller(&h, &fast_slots());

    open(&ctl, &ps[0].id).await;
    let outcome = ctl
        .request_open(OpenRequest::user_tap(&ps[0].id).with_hint(Slot::Main))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        OpenOutcome::Switched {
            slot: Slot::Main,
            decision: SlotDecision::Hint,
            initialized: true,
        }
    );
}

#[tokio::test]
async fn switch_extras_route_to_decoded_slot() {
    let h = Harness::new();
    let ps = h.profiles(&["A"]);
    let ctl = controller(&h, &fast_slots());

    let request = OpenRequest::from_switch_extras(Some(ps[0].id.as_str()), None, true).unwrap();
    let outcome = ctl.request_open(request).await.unwrap();
    assert_eq!(outcome.slot(), Some(Slot::Beta));
}

#[tokio::test]
async fn reserved_slot_hint_is_rejected() {
    let h = Harness::new();
    let ps = h.profiles(&["A"]);
    let ctl = controller(&h, &fast_slots());

    let err = ctl
        .request_open(OpenRequest::user_tap(&ps[0].id).with_hint(Slot::Delta))
        .await
        .unwrap_err();
    assert!(matches!(err, ControllerError::InvalidRequest { .. }), "{err}");
    assert_eq!(h.factory.created_count(), 0);
    assert_eq!(h.store.profile_in(Slot::Delta).unwrap(), None);
    assert_eq!(ctl.focused(), None);
}

#[tokio::test]
async fn registry_entry_on_reserved_slot_falls_back_to_rotation() {
    let h = Harness::new();
    let ps = h.profiles(&["A"]);
    h.store.assign(Slot::Delta, &ps[0].id).unwrap();
    let ctl = controller(&h, &fast_slots());

    let outcome = open(&ctl, &ps[0].id).await;
    assert_eq!(
        outcome,
        OpenOutcome::Switched {
            slot: Slot::Beta,
            decision: SlotDecision::Rotation,
            initialized: true,
        }
    );
    assert_eq!(h.events.of_kind(SessionEventKind::SmartHit).len(), 0);
    assert_eq!(h.events.of_kind(SessionEventKind::Rotate).len(), 1);
}

// ── Errors ──

#[tokio::test]
async fn unknown_profile_is_reported_without_mutation() {
    let h = Harness::new();
    let ctl = controller(&h, &fast_slots());

    let err = ctl
        .request_open(OpenRequest::user_tap("profile_missing"))
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "{err}");
    assert!(h
        .store
        .entries()
        .unwrap()
        .iter()
        .all(|entry| entry.profile_id.is_none()));
    assert_eq!(h.factory.created_count(), 0);
    assert_eq!(ctl.focused(), None);
}

#[tokio::test]
async fn unknown_deep_link_is_dropped_silently() {
    let h = Harness::new();
    let ctl = controller(&h, &fast_slots());

    let request = OpenRequest::from_switch_extras(Some("profile_missing"), Some(2), false).unwrap();
    assert_eq!(ctl.request_open(request).await.unwrap(), OpenOutcome::Ignored);
    assert_eq!(h.factory.created_count(), 0);
}

#[tokio::test]
async fn store_failure_keeps_controller_usable() {
    let h = Harness::new();
    let ps = h.profiles(&["A"]);
    let ctl = controller(&h, &fast_slots());

    h.store.set_unavailable(true);
    let err = ctl
        .request_open(OpenRequest::user_tap(&ps[0].id))
        .await
        .unwrap_err();
    assert!(matches!(err, ControllerError::Store(_)), "{err}");

    h.store.set_unavailable(false);
    assert!(open(&ctl, &ps[0].id).await.slot().is_some());
}

#[tokio::test]
async fn empty_profile_id_is_invalid() {
    let h = Harness::new();
    let ctl = controller(&h, &fast_slots());
    let err = ctl
        .request_open(OpenRequest::user_tap(" "))
        .await
        .unwrap_err();
    assert!(matches!(err, ControllerError::InvalidRequest { .. }));
}

// ── Debounce ──

#[tokio::test]
async fn repeated_requests_inside_debounce_window_switch_once() {
    let h = Harness::new();
    let ps = h.profiles(&["PX"]);
    let cfg = SlotsConfig {
        switch_debounce_ms: 50,
        ..fast_slots()
    };
    let ctl = controller(&h, &cfg);

    let first = ctl.request_open(OpenRequest::user_tap(&ps[0].id));
    let second = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        ctl.request_open(OpenRequest::user_tap(&ps[0].id)).await
    };
    let (first, second) = tokio::join!(first, second);
    let (first, second) = (first.unwrap(), second.unwrap());

    assert!(matches!(first, OpenOutcome::Switched { .. }));
    assert_eq!(
        second,
        OpenOutcome::Coalesced {
            slot: first.slot().unwrap()
        }
    );
    assert_eq!(h.factory.created_count(), 1);
    assert_eq!(h.factory.initialize_count(), 1);
    assert_eq!(h.events.of_kind(SessionEventKind::Open).len(), 1);
}

#[tokio::test]
async fn coalesced_callers_see_the_same_not_found() {
    let h = Harness::new();
    let cfg = SlotsConfig {
        switch_debounce_ms: 50,
        ..fast_slots()
    };
    let ctl = controller(&h, &cfg);

    let (first, second) = tokio::join!(
        ctl.request_open(OpenRequest::user_tap("ghost")),
        ctl.request_open(OpenRequest::user_tap("ghost")),
    );
    for err in [first.unwrap_err(), second.unwrap_err()] {
        assert!(
            matches!(&err, ControllerError::ProfileNotFound { profile_id } if profile_id == "ghost"),
            "{err:?}"
        );
    }
    assert_eq!(h.factory.created_count(), 0);
}

#[tokio::test]
async fn cancelled_leader_releases_the_profile() {
    let h = Harness::new();
    let ps = h.profiles(&["A"]);
    let cfg = SlotsConfig {
        switch_debounce_ms: 50,
        ..fast_slots()
    };
    let ctl = controller(&h, &cfg);

    let timed_out = tokio::time::timeout(
        Duration::from_millis(5),
        ctl.request_open(OpenRequest::user_tap(&ps[0].id)),
    )
    .await;
    assert!(timed_out.is_err());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.factory.created_count(), 0);

    let outcome = open(&ctl, &ps[0].id).await;
    assert!(matches!(outcome, OpenOutcome::Switched { .. }), "{outcome:?}");
    assert_eq!(h.factory.created_count(), 1);
}

#[tokio::test]
async fn followers_of_a_cancelled_leader_are_cancelled() {
    let h = Harness::new();
    let ps = h.profiles(&["A"]);
    let cfg = SlotsConfig {
        switch_debounce_ms: 50,
        ..fast_slots()
    };
    let ctl = controller(&h, &cfg);

    let leader = tokio::time::timeout(
        Duration::from_millis(10),
        ctl.request_open(OpenRequest::user_tap(&ps[0].id)),
    );
    let follower = async {
        tokio::time::sleep(Duration::from_millis(2)).await;
        ctl.request_open(OpenRequest::user_tap(&ps[0].id)).await
    };
    let (leader, follower) = tokio::join!(leader, follower);
    assert!(leader.is_err());
    assert!(
        matches!(follower, Err(ControllerError::Cancelled { .. })),
        "{follower:?}"
    );
}

#[tokio::test]
async fn debounced_switch_waits_before_binding() {
    let h = Harness::new();
    let ps = h.profiles(&["A"]);
    let cfg = SlotsConfig {
        switch_debounce_ms: 80,
        ..fast_slots()
    };
    let ctl = std::sync::Arc::new(controller(&h, &cfg));

    let task = {
        let ctl = ctl.clone();
        let id = ps[0].id.clone();
        tokio::spawn(async move { ctl.request_open(OpenRequest::user_tap(id)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.factory.created_count(), 0);

    task.await.unwrap().unwrap();
    assert_eq!(h.factory.created_count(), 1);
}

// ── Focus and window ──

#[tokio::test]
async fn opening_marks_profile_active() {
    let h = Harness::new();
    let ps = h.profiles(&["A", "B"]);
    let ctl = controller(&h, &fast_slots());

    open(&ctl, &ps[1].id).await;
    assert_eq!(h.store.get_active().unwrap(), Some(ps[1].id.clone()));
}

#[tokio::test]
async fn moving_focus_far_away_terminates_old_resident() {
    let h = Harness::new();
    let ps = h.profiles(&["A", "B", "C", "D", "E"]);
    let ctl = controller(&h, &fast_slots());

    let a = open(&ctl, &ps[0].id).await.slot().unwrap();
    open(&ctl, &ps[4].id).await;

    let host = ctl.host(a).unwrap();
    wait_until("A's slot to terminate", || host.resident().is_none()).await;
    assert_eq!(h.store.profile_in(a).unwrap(), Some(ps[0].id.clone()));
    assert_eq!(h.store.get_active().unwrap(), Some(ps[4].id.clone()));
}

#[tokio::test]
async fn previous_slot_is_flushed_on_switch() {
    let h = Harness::new();
    let ps = h.profiles(&["A", "B"]);
    let ctl = controller(&h, &fast_slots());

    open(&ctl, &ps[0].id).await;
    let a_session = h.session_for(&ps[0].id).unwrap();
    let flushes_before = a_session.count(&mpb_session::mock::MockCall::Flush);
    open(&ctl, &ps[1].id).await;
    assert!(a_session.count(&mpb_session::mock::MockCall::Flush) > flushes_before);
}

#[tokio::test]
async fn shutdown_tears_down_every_slot() {
    let h = Harness::new();
    let ps = h.profiles(&["A", "B"]);
    let ctl = controller(&h, &fast_slots());
    open(&ctl, &ps[0].id).await;
    open(&ctl, &ps[1].id).await;

    ctl.shutdown().await;
    for slot in Slot::ROTATION {
        assert_eq!(ctl.host(slot).unwrap().resident(), None);
    }
    assert_eq!(ctl.focused(), None);
    assert_eq!(h.store.get_active().unwrap(), None);
}
