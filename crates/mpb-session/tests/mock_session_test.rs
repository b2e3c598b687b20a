#![allow(clippy::expect_used, clippy::unwrap_used)]

//! Contract tests for `ContentSession` using the mock implementation.

use std::time::Duration;

use mpb_session::error::SessionError;
use mpb_session::mock::{LoadBehavior, MockCall, MockContentSession, MockContextFactory};
use mpb_session::session::{ContentSession, ContextFactory};
use mpb_session::types::{content_event_channel, BindingState, ContentEvent, LoadToken};

// ── Binding tests ──

#[tokio::test]
async fn initialize_binds_profile_and_reports_generation() {
    let (tx, _rx) = content_event_channel();
    let session = MockContentSession::new(4, tx);
    let ready = session.initialize("p1").await.unwrap();
    assert_eq!(ready.profile_id, "p1");
    assert_eq!(ready.context_generation, 4);
    assert_eq!(
        session.binding(),
        BindingState::Bound {
            profile_id: "p1".into()
        }
    );
}

#[tokio::test]
async fn initialize_other_profile_is_dirty_context() {
    let (tx, _rx) = content_event_channel();
    let session = MockContentSession::new(1, tx);
    session.initialize("p1").await.unwrap();

    let err = session.initialize("p2").await.unwrap_err();
    assert_eq!(
        err,
        SessionError::DirtyContext {
            bound_profile: "p1".into(),
            requested_profile: "p2".into()
        }
    );
    assert_eq!(session.binding().bound_profile(), Some("p1"));
}

#[tokio::test]
async fn initialize_error_is_returned_once() {
    let (tx, _rx) = content_event_channel();
    let session = MockContentSession::new(1, tx);
    session.fail_next_initialize(SessionError::ContextUnavailable {
        message: "gpu lost".into(),
    });

    assert!(session.initialize("p1").await.unwrap_err().is_retryable());
    assert!(session.initialize("p1").await.is_ok());
}

#[tokio::test]
async fn terminate_is_idempotent_and_blocks_loads() {
    let (tx, _rx) = content_event_channel();
    let session = MockContentSession::new(1, tx);
    session.initialize("p1").await.unwrap();
    session.terminate().await.unwrap();
    session.terminate().await.unwrap();

    assert_eq!(session.binding(), BindingState::Terminated);
    assert!(session.load(LoadToken(1), "https://a.test").await.is_err());
    assert!(session.flush().await.is_err());
    assert_eq!(session.count(&MockCall::Terminate), 2);
}

// ── Load tests ──

#[tokio::test]
async fn failing_load_emits_load_failed() {
    let (tx, mut rx) = content_event_channel();
    let session = MockContentSession::new(1, tx);
    session.set_load_behavior(LoadBehavior::Fail("net::ERR_NAME".into()));
    session.initialize("p1").await.unwrap();
    session.load(LoadToken(3), "https://a.test").await.unwrap();

    assert_eq!(
        rx.recv().await,
        Some(ContentEvent::LoadFailed {
            token: LoadToken(3),
            url: "https://a.test".into(),
            message: "net::ERR_NAME".into()
        })
    );
}

#[tokio::test]
async fn delayed_loads_complete_in_timer_order() {
    let (tx, mut rx) = content_event_channel();
    let session = MockContentSession::new(1, tx);
    session.initialize("p1").await.unwrap();

    session.set_load_behavior(LoadBehavior::Delayed(Duration::from_millis(60)));
    session.load(LoadToken(1), "https://slow.test").await.unwrap();
    session.set_load_behavior(LoadBehavior::Delayed(Duration::from_millis(5)));
    session.load(LoadToken(2), "https://fast.test").await.unwrap();

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first.token(), LoadToken(2));
    assert_eq!(second.token(), LoadToken(1));
}

#[tokio::test]
async fn manual_load_emits_only_what_the_test_pushes() {
    let (tx, mut rx) = content_event_channel();
    let session = MockContentSession::new(1, tx);
    session.set_load_behavior(LoadBehavior::Manual);
    session.initialize("p1").await.unwrap();
    session.load(LoadToken(1), "https://a.test").await.unwrap();
    assert!(rx.try_recv().is_err());

    session.emit(ContentEvent::Progress {
        token: LoadToken(1),
        percent: 40,
    });
    assert_eq!(rx.recv().await.map(|e| e.token()), Some(LoadToken(1)));
    assert_eq!(session.loaded_urls(), vec!["https://a.test".to_string()]);
}

// ── Factory tests ──

#[tokio::test]
async fn factory_hands_out_increasing_generations() {
    let factory = MockContextFactory::new();
    let (tx, _rx) = content_event_channel();
    let a = factory.create(tx.clone()).await.unwrap();
    let b = factory.create(tx).await.unwrap();
    assert!(b.generation() > a.generation());
    assert_eq!(factory.created_count(), 2);
    assert_eq!(
        factory.latest().map(|s| s.generation()),
        Some(b.generation())
    );
}

#[tokio::test]
async fn factory_create_error_is_returned_once() {
    let factory = MockContextFactory::new().with_create_error(SessionError::ContextUnavailable {
        message: "out of processes".into(),
    });
    let (tx, _rx) = content_event_channel();
    assert!(factory.create(tx.clone()).await.is_err());
    assert!(factory.create(tx).await.is_ok());
    assert_eq!(factory.created_count(), 1);
}

#[tokio::test]
async fn factory_applies_load_behavior_to_new_contexts() {
    let factory = MockContextFactory::new().with_load_behavior(LoadBehavior::Manual);
    let (tx, mut rx) = content_event_channel();
    let session = factory.create(tx).await.unwrap();
    session.initialize("p1").await.unwrap();
    session.load(LoadToken(1), "https://a.test").await.unwrap();
    assert!(rx.try_recv().is_err());
}
