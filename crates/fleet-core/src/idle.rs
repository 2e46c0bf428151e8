//! [crates/fleet-core/src/idle.rs]
//! Idle-detection decision logic used by the activity detection job.
//! Pure function over an aggregate snapshot and a threshold; the job itself
//! performs the I/O (loading workers, enqueuing pause commands).

use chrono::{DateTime, Utc};
use fleet_domain::{WorkerAggregate, WorkerStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct IdleVerdict {
    pub is_idle: bool,
    pub idle_since: Option<DateTime<Utc>>,
}

/// A running worker with idle detection enabled and no activity observed
/// within `timeout` is eligible for auto-pause. Workers with no recorded
/// activity at all are treated as idle since `created_at` — they have never
/// shown a heartbeat.
pub fn evaluate(worker: &WorkerAggregate, now: DateTime<Utc>, timeout: chrono::Duration) -> IdleVerdict {
    if worker.status != WorkerStatus::Running || !worker.is_idle_detection_enabled {
        return IdleVerdict {
            is_idle: false,
            idle_since: None,
        };
    }
    let reference = worker.last_activity_at.unwrap_or(worker.created_at);
    let idle_duration = now - reference;
    if idle_duration >= timeout {
        IdleVerdict {
            is_idle: true,
            idle_since: Some(reference),
        }
    } else {
        IdleVerdict {
            is_idle: false,
            idle_since: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_domain::WorkerId;

    fn build(status: WorkerStatus, last_activity_at: Option<DateTime<Utc>>, idle_enabled: bool) -> WorkerAggregate {
        let now = Utc::now();
        let mut agg = WorkerAggregate::create(
            WorkerId::new(),
            "w".into(),
            "eu-west-1".into(),
            "m5.large".into(),
            "ami-1".into(),
            "tester".into(),
            now - chrono::Duration::hours(2),
        );
        agg.take_pending_events();
        agg.status = status;
        agg.last_activity_at = last_activity_at;
        agg.is_idle_detection_enabled = idle_enabled;
        agg
    }

    #[test]
    fn not_idle_when_disabled() {
        let worker = build(WorkerStatus::Running, None, false);
        let verdict = evaluate(&worker, Utc::now(), chrono::Duration::minutes(30));
        assert!(!verdict.is_idle);
    }

    #[test]
    fn not_idle_when_recently_active() {
        let worker = build(WorkerStatus::Running, Some(Utc::now()), true);
        let verdict = evaluate(&worker, Utc::now(), chrono::Duration::minutes(30));
        assert!(!verdict.is_idle);
    }

    #[test]
    fn idle_past_timeout() {
        let now = Utc::now();
        let worker = build(WorkerStatus::Running, Some(now - chrono::Duration::hours(1)), true);
        let verdict = evaluate(&worker, now, chrono::Duration::minutes(30));
        assert!(verdict.is_idle);
    }

    #[test]
    fn non_running_worker_is_never_idle() {
        let worker = build(WorkerStatus::Stopped, None, true);
        let verdict = evaluate(&worker, Utc::now(), chrono::Duration::minutes(30));
        assert!(!verdict.is_idle);
    }
}
