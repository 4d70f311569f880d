//! End-to-end supervision flows: heartbeat liveness through stuck detection,
//! health verdicts with transition events, and the dead letter path.

use overseer_core::clock::ManualClock;
use overseer_core::config::{OverseerConfig, ResourceLimitsConfig};
use overseer_core::events::SupervisionEvent;
use overseer_core::models::{HealthStatus, JobErrorDetail, SessionStatus};
use overseer_core::queue::MemoryQueueBackend;
use overseer_core::supervision::{FixedSampler, ResourceSample};
use overseer_core::OverseerCore;
use serde_json::json;
use std::sync::Arc;

struct Harness {
    core: OverseerCore,
    clock: Arc<ManualClock>,
    queue: Arc<MemoryQueueBackend>,
    sampler: Arc<FixedSampler>,
}

fn harness(config: OverseerConfig) -> Harness {
    let clock = ManualClock::starting_now();
    let queue = Arc::new(MemoryQueueBackend::new());
    let sampler = Arc::new(FixedSampler::default());
    let core =
        OverseerCore::with_components(config, queue.clone(), clock.clone(), sampler.clone())
            .unwrap();
    Harness {
        core,
        clock,
        queue,
        sampler,
    }
}

#[tokio::test]
async fn a_silent_job_is_swept_into_stuck_and_unhealthy() {
    let h = harness(OverseerConfig::default());
    let session = h
        .core
        .start_session("Reports::Nightly", Some("reports".to_string()), json!({}))
        .unwrap();
    h.core.record_heartbeat(session.id, json!({})).unwrap();

    let sweeper = h.core.sweeper();
    let mut events = h.core.events().subscribe();

    // Default interval 30s, threshold 3: three overdue sweeps classify stuck
    for _ in 0..3 {
        h.clock.advance_secs(95);
        sweeper.sweep_once();
    }

    let stuck = h.core.stuck_sessions();
    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck[0].session_id, session.id);
    assert_eq!(
        h.core.session(session.id).unwrap().status,
        SessionStatus::Stalled
    );

    let record = h.core.health_record(session.id).unwrap();
    assert_eq!(record.status, HealthStatus::Unhealthy);
    assert_eq!(record.reason.as_deref(), Some("heartbeat is stale"));
    assert!(record.first_unhealthy_at.is_some());

    let mut missed = 0;
    let mut changed = 0;
    while let Ok(published) = events.try_recv() {
        match published.event {
            SupervisionEvent::HeartbeatMissed { .. } => missed += 1,
            SupervisionEvent::HealthStatusChanged { .. } => changed += 1,
            _ => {}
        }
    }
    assert_eq!(missed, 3);
    // Unknown -> Unhealthy once; repeated unhealthy sweeps stay silent
    assert_eq!(changed, 1);
}

#[tokio::test]
async fn recovery_after_a_stall_returns_the_session_to_healthy() {
    let h = harness(OverseerConfig::default());
    let session = h
        .core
        .start_session("Search::Reindex", None, json!({}))
        .unwrap();
    h.core.record_heartbeat(session.id, json!({})).unwrap();

    let sweeper = h.core.sweeper();
    h.clock.advance_secs(95);
    sweeper.sweep_once();
    assert_eq!(
        h.core.health_record(session.id).unwrap().status,
        HealthStatus::Unhealthy
    );

    h.core
        .record_heartbeat(session.id, json!({"progress": 0.9}))
        .unwrap();
    sweeper.sweep_once();

    let record = h.core.health_record(session.id).unwrap();
    assert_eq!(record.status, HealthStatus::Healthy);
    assert_eq!(record.first_unhealthy_at, None);
    assert_eq!(
        h.core.session(session.id).unwrap().status,
        SessionStatus::Running
    );
}

#[tokio::test]
async fn resource_breaches_flow_into_the_health_verdict_and_violation_log() {
    let config = OverseerConfig {
        resources: ResourceLimitsConfig {
            max_memory_mb: Some(256.0),
            ..ResourceLimitsConfig::default()
        },
        ..OverseerConfig::default()
    };
    let h = harness(config);
    let session = h
        .core
        .start_session("Video::Transcode", None, json!({}))
        .unwrap();
    h.core.record_heartbeat(session.id, json!({})).unwrap();

    h.sampler.set(ResourceSample {
        memory_mb: 300.0,
        ..ResourceSample::default()
    });

    let record = h.core.health().perform_health_check(session.id).unwrap();
    assert_eq!(record.status, HealthStatus::Unhealthy);
    assert_eq!(record.reason.as_deref(), Some("resource violation: memory"));
    assert_eq!(h.core.resources().violations_for(session.id).len(), 1);
}

#[tokio::test]
async fn exhausted_retry_budget_dead_letters_exactly_once_and_supports_replay() {
    let h = harness(OverseerConfig::default());
    let session = h
        .core
        .start_session(
            "Imports::Feed",
            Some("imports".to_string()),
            json!({ "payload": { "feed_id": 99 } }),
        )
        .unwrap();

    let boom = JobErrorDetail::new("Timeout", "deadline exceeded");

    // max_retries = 3: two errors stay retryable
    assert!(h.core.fail_session(session.id, boom.clone()).unwrap().is_none());
    assert!(h.core.fail_session(session.id, boom.clone()).unwrap().is_none());
    assert!(h.core.dead_letter_entries().is_empty());

    let entry = h.core.fail_session(session.id, boom.clone()).unwrap().unwrap();
    assert_eq!(h.core.dead_letter_entries().len(), 1);

    // Further failures never create a second entry
    assert!(h.core.fail_session(session.id, boom).unwrap().is_none());
    assert_eq!(h.core.dead_letter_entries().len(), 1);

    let retried = h.core.dead_letters().retry(entry.id).await.unwrap();
    assert!(retried.was_retried());
    let dispatched = h.queue.dispatched();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].0, "imports");
    assert_eq!(dispatched[0].1, json!({ "feed_id": 99 }));
}

#[tokio::test]
async fn completed_sessions_drop_out_of_the_active_sweep() {
    let h = harness(OverseerConfig::default());
    let session = h
        .core
        .start_session("Billing::InvoiceSync", None, json!({}))
        .unwrap();
    h.core.record_heartbeat(session.id, json!({})).unwrap();
    h.core.complete_session(session.id).unwrap();

    let sweeper = h.core.sweeper();
    h.clock.advance_secs(600);
    let report = sweeper.sweep_once();

    assert!(report.stuck.is_empty());
    assert_eq!(report.sessions_checked, 0);
    assert_eq!(
        h.core.session(session.id).unwrap().status,
        SessionStatus::Completed
    );
}
