//! [crates/fleet-core/src/throttle.rs]
//! Per-worker minimum-interval rate limit on user-initiated refreshes.
//! Process-local, in-memory; background-job refreshes never call `record`.

use fleet_domain::WorkerId;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

pub struct RefreshThrottle {
    min_interval: Duration,
    last_refresh: Mutex<HashMap<WorkerId, Instant>>,
}

impl RefreshThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_refresh: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_default_interval() -> Self {
        Self::new(Duration::from_secs(10))
    }

    /// A worker that has never refreshed may always refresh.
    pub fn can_refresh(&self, worker_id: WorkerId) -> bool {
        self.time_until_next(worker_id) == Duration::ZERO
    }

    pub fn time_until_next(&self, worker_id: WorkerId) -> Duration {
        let guard = self.last_refresh.lock().expect("throttle mutex poisoned");
        match guard.get(&worker_id) {
            None => Duration::ZERO,
            Some(last) => {
                let elapsed = last.elapsed();
                self.min_interval.saturating_sub(elapsed)
            }
        }
    }

    pub fn record(&self, worker_id: WorkerId) {
        let mut guard = self.last_refresh.lock().expect("throttle mutex poisoned");
        guard.insert(worker_id, Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_refreshed_worker_can_refresh() {
        let throttle = RefreshThrottle::with_default_interval();
        assert!(throttle.can_refresh(WorkerId::new()));
    }

    #[test]
    fn recorded_refresh_blocks_until_interval_elapses() {
        let throttle = RefreshThrottle::new(Duration::from_secs(10));
        let id = WorkerId::new();
        throttle.record(id);
        assert!(!throttle.can_refresh(id));
        assert!(throttle.time_until_next(id) <= Duration::from_secs(10));
        assert!(throttle.time_until_next(id) > Duration::ZERO);
    }

    #[test]
    fn unrelated_worker_is_unaffected() {
        let throttle = RefreshThrottle::with_default_interval();
        throttle.record(WorkerId::new());
        assert!(throttle.can_refresh(WorkerId::new()));
    }
}
