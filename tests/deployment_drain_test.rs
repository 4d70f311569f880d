//! Deployment drain cycles against the in-memory queue backend: pausing,
//! polling the registry, timeout reporting, and caller-driven resume.

use overseer_core::clock::ManualClock;
use overseer_core::config::OverseerConfig;
use overseer_core::events::SupervisionEvent;
use overseer_core::models::{SessionStatus, SupervisionSession};
use overseer_core::queue::{MemoryQueueBackend, QueueBackend};
use overseer_core::supervision::FixedSampler;
use overseer_core::OverseerCore;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct Harness {
    core: OverseerCore,
    clock: Arc<ManualClock>,
    queue: Arc<MemoryQueueBackend>,
}

fn harness() -> Harness {
    let clock = ManualClock::starting_now();
    let queue = Arc::new(MemoryQueueBackend::new());
    let core = OverseerCore::with_components(
        OverseerConfig::default(),
        queue.clone(),
        clock.clone(),
        Arc::new(FixedSampler::default()),
    )
    .unwrap();
    Harness { core, clock, queue }
}

#[tokio::test]
async fn a_full_drain_completes_once_inflight_work_finishes() {
    let h = harness();
    let session = h
        .core
        .start_session("Orders::Settle", Some("orders".to_string()), json!({}))
        .unwrap();

    let mut events = h.core.events().subscribe();
    let coordinator = h
        .core
        .deployment()
        .drain_queues(vec!["orders"])
        .wait_for_completion(120)
        .poll_interval(Duration::from_millis(5));

    let core_store = h.core.store().clone();
    let finisher = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(25)).await;
        core_store
            .set_session_status(session.id, SessionStatus::Completed)
            .unwrap();
    });

    assert!(coordinator.execute().await.unwrap());
    finisher.await.unwrap();

    assert!(h.queue.is_paused("orders"));

    let mut started = false;
    let mut completed = false;
    while let Ok(published) = events.try_recv() {
        match published.event {
            SupervisionEvent::DeploymentStarted { .. } => started = true,
            SupervisionEvent::DeploymentCompleted { .. } => completed = true,
            _ => {}
        }
    }
    assert!(started && completed);

    // Resuming is the caller's responsibility, typically in a finally block
    h.queue.resume_queue("orders").await.unwrap();
    assert!(!h.queue.is_paused("orders"));
}

#[tokio::test]
async fn timed_out_drain_reports_survivors_and_can_force_cancellation() {
    let h = harness();
    let lingering = h
        .core
        .start_session("Orders::Settle", Some("orders".to_string()), json!({}))
        .unwrap();
    // Work on other queues is not part of the drain
    let unrelated = h
        .core
        .start_session("Mailers::Digest", Some("mailers".to_string()), json!({}))
        .unwrap();

    let seen: Arc<Mutex<Vec<Uuid>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_in_callback = seen.clone();

    let mut events = h.core.events().subscribe();
    let coordinator = h
        .core
        .deployment()
        .drain_queues(vec!["orders"])
        .wait_for_completion(10)
        .cancel_long_running()
        .poll_interval(Duration::from_millis(5))
        .on_timeout(move |remaining: &[SupervisionSession]| {
            seen_in_callback
                .lock()
                .extend(remaining.iter().map(|session| session.id));
        });

    let clock = h.clock.clone();
    let advancer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(25)).await;
        clock.advance_secs(11);
    });

    assert!(!coordinator.execute().await.unwrap());
    advancer.await.unwrap();

    assert_eq!(*seen.lock(), vec![lingering.id]);
    assert_eq!(
        h.core.session(lingering.id).unwrap().status,
        SessionStatus::Failed
    );
    assert_eq!(
        h.core.session(unrelated.id).unwrap().status,
        SessionStatus::Running
    );

    let timed_out = std::iter::from_fn(|| events.try_recv().ok()).any(|published| {
        matches!(
            published.event,
            SupervisionEvent::DeploymentTimedOut { ref remaining_sessions, .. }
                if remaining_sessions == &vec![lingering.id]
        )
    });
    assert!(timed_out);
}
