use log::{info, warn};
use std::sync::atomic::{AtomicU64, Ordering};

/// Component-scoped logger with a sampling helper for per-record chatter.
pub struct LogManager {
    component: &'static str,
    sample_every: u64,
    seen: AtomicU64,
}

impl LogManager {
    pub fn new(component: &'static str) -> Self {
        Self::with_sampling(component, 20)
    }

    pub fn with_sampling(component: &'static str, sample_every: u64) -> Self {
        Self {
            component,
            sample_every: sample_every.max(1),
            seen: AtomicU64::new(0),
        }
    }

    pub fn record(&self, message: &str) {
        info!("[{}] {}", self.component, message);
    }

    pub fn warn(&self, message: &str) {
        warn!("[{}] {}", self.component, message);
    }

    /// Logs the first message and then one in every `sample_every`. The
    /// message is only built when it will be written.
    pub fn sampled<F: FnOnce() -> String>(&self, message: F) -> bool {
        let seen = self.seen.fetch_add(1, Ordering::Relaxed);
        if seen % self.sample_every == 0 {
            info!("[{}] {}", self.component, message());
            true
        } else {
            false
        }
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new("twin")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampled_logs_first_then_every_nth() {
        let logger = LogManager::with_sampling("test", 3);
        let written: Vec<bool> = (0..7).map(|i| logger.sampled(|| format!("m{}", i))).collect();
        assert_eq!(written, vec![true, false, false, true, false, false, true]);
    }
}
