use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Rate limit for background cluster probes, keyed by instance.
///
/// Losing the race only means the caller keeps the stored cluster metadata.
#[derive(Debug)]
pub struct ProbeCooldown {
    last_attempt: Mutex<HashMap<String, Instant>>,
    period: Duration,
}

impl ProbeCooldown {
    pub fn new(period: Duration) -> Self {
        Self {
            last_attempt: Mutex::new(HashMap::new()),
            period,
        }
    }

    /// Records an attempt for `key` unless one happened within the period.
    pub fn try_begin(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut last_attempt = self.last_attempt.lock();
        if let Some(at) = last_attempt.get(key) {
            if now.duration_since(*at) < self.period {
                return false;
            }
        }
        last_attempt.insert(key.to_string(), now);
        true
    }
}
