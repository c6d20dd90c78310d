use serde::Serialize;
use std::sync::Mutex;

pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

/// Point-in-time copy of the pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub frames: u64,
    pub source_errors: u64,
    pub decode_errors: u64,
    pub kept: u64,
    pub dropped: u64,
    pub filter_errors: u64,
    pub snapshot_errors: u64,
    pub flushes: u64,
    pub flush_failures: u64,
    pub rows_written: u64,
    /// Staged readings given up on without reaching the sink.
    pub discarded: u64,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut MetricsSnapshot)) {
        if let Ok(mut metrics) = self.inner.lock() {
            apply(&mut metrics);
        }
    }

    pub fn record_frame(&self) {
        self.update(|m| m.frames += 1);
    }

    pub fn record_source_error(&self) {
        self.update(|m| m.source_errors += 1);
    }

    pub fn record_decode_error(&self) {
        self.update(|m| m.decode_errors += 1);
    }

    pub fn record_kept(&self) {
        self.update(|m| m.kept += 1);
    }

    pub fn record_dropped(&self) {
        self.update(|m| m.dropped += 1);
    }

    pub fn record_filter_error(&self) {
        self.update(|m| m.filter_errors += 1);
    }

    pub fn record_snapshot_error(&self) {
        self.update(|m| m.snapshot_errors += 1);
    }

    pub fn record_flush(&self, rows: u64) {
        self.update(|m| {
            m.flushes += 1;
            m.rows_written += rows;
        });
    }

    pub fn record_flush_failure(&self) {
        self.update(|m| m.flush_failures += 1);
    }

    pub fn record_discarded(&self, readings: u64) {
        self.update(|m| m.discarded += readings);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        if let Ok(metrics) = self.inner.lock() {
            *metrics
        } else {
            MetricsSnapshot::default()
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = MetricsRecorder::new();
        metrics.record_frame();
        metrics.record_frame();
        metrics.record_kept();
        metrics.record_flush(3);
        metrics.record_flush(2);
        metrics.record_discarded(4);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frames, 2);
        assert_eq!(snapshot.kept, 1);
        assert_eq!(snapshot.flushes, 2);
        assert_eq!(snapshot.rows_written, 5);
        assert_eq!(snapshot.flush_failures, 0);
        assert_eq!(snapshot.discarded, 4);
    }
}
