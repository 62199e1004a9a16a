use serde::Serialize;
use std::sync::Mutex;

/// Ingestion counters shared between a listener thread and the consumer.
pub struct MetricsRecorder {
    inner: Mutex<IngestSnapshot>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSnapshot {
    pub received: usize,
    pub decoded: usize,
    pub decode_failures: usize,
    pub overflow_dropped: usize,
    pub bootstraps_published: usize,
    pub publish_failures: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(IngestSnapshot::default()),
        }
    }

    fn update<F: FnOnce(&mut IngestSnapshot)>(&self, apply: F) {
        if let Ok(mut metrics) = self.inner.lock() {
            apply(&mut metrics);
        }
    }

    pub fn record_received(&self) {
        self.update(|m| m.received += 1);
    }

    pub fn record_decoded(&self) {
        self.update(|m| m.decoded += 1);
    }

    pub fn record_decode_failure(&self) {
        self.update(|m| m.decode_failures += 1);
    }

    pub fn record_overflow(&self, dropped: usize) {
        self.update(|m| m.overflow_dropped += dropped);
    }

    pub fn record_bootstrap(&self) {
        self.update(|m| m.bootstraps_published += 1);
    }

    pub fn record_publish_failure(&self) {
        self.update(|m| m.publish_failures += 1);
    }

    pub fn snapshot(&self) -> IngestSnapshot {
        if let Ok(metrics) = self.inner.lock() {
            *metrics
        } else {
            IngestSnapshot::default()
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
