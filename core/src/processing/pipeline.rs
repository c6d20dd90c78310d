use crate::prelude::{
    AppendReport, FrameId, FrameSource, PendingFrameSource, PipelineError, ReadingSink, SinkError,
};
use crate::processing::filter::{ChangeFilter, Decision};
use crate::processing::snapshot::SnapshotStore;
use crate::processing::staging::StagedBatch;
use crate::processing::state::LastSeenState;
use crate::protocol::{decode_captured, CapturedFrame};
use crate::telemetry::{LogManager, MetricsRecorder};
use std::sync::Arc;

/// Readings held for retry while streaming before the oldest are dropped.
pub const DEFAULT_MAX_STAGED: usize = 1000;

/// Where the pipeline currently is in its frame cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePhase {
    WaitingFrame,
    Decoding,
    Filtering,
    Staged,
    Flushing,
}

/// What happened to a single ingested frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Kept,
    Dropped,
    DecodeFailed,
    FilterFailed,
}

/// Result of a successful flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    pub report: AppendReport,
    pub rows: usize,
    pub acknowledged: Vec<FrameId>,
}

/// Summary of one pass over a batch source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub pending: usize,
    pub kept: usize,
    pub dropped: usize,
    pub rejected: usize,
    pub appended: AppendReport,
    pub removed: usize,
}

/// Decode → filter → stage → flush loop for a single frame source.
pub struct IngestionPipeline<K> {
    filter: ChangeFilter,
    state: Arc<LastSeenState>,
    snapshots: Option<SnapshotStore>,
    staged: StagedBatch,
    sink: K,
    phase: PipelinePhase,
    max_staged: usize,
    logger: LogManager,
    metrics: Arc<MetricsRecorder>,
}

impl<K: ReadingSink> IngestionPipeline<K> {
    pub fn new(sink: K, filter: ChangeFilter, state: Arc<LastSeenState>) -> Self {
        Self {
            filter,
            state,
            snapshots: None,
            staged: StagedBatch::new(),
            sink,
            phase: PipelinePhase::WaitingFrame,
            max_staged: DEFAULT_MAX_STAGED,
            logger: LogManager::new("sensorcore::pipeline"),
            metrics: Arc::new(MetricsRecorder::new()),
        }
    }

    /// Persists every kept reading so a restart does not re-keep it.
    pub fn with_snapshots(mut self, store: SnapshotStore) -> Self {
        self.snapshots = Some(store);
        self
    }

    /// Caps the readings kept for retry after failed streaming flushes.
    pub fn with_max_staged(mut self, max_staged: usize) -> Self {
        self.max_staged = max_staged.max(1);
        self
    }

    pub fn with_logger(mut self, logger: LogManager) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn phase(&self) -> PipelinePhase {
        self.phase
    }

    pub fn staged(&self) -> &StagedBatch {
        &self.staged
    }

    pub fn state(&self) -> &Arc<LastSeenState> {
        &self.state
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Decodes and filters one frame, staging it on keep.
    pub fn ingest(&mut self, frame: &CapturedFrame) -> FrameOutcome {
        self.metrics.record_frame();
        self.phase = PipelinePhase::Decoding;
        let reading = match decode_captured(frame) {
            Ok(reading) => reading,
            Err(err) => {
                self.logger.error(&format!("dropping frame {}: {}", frame.raw, err));
                self.metrics.record_decode_error();
                self.phase = PipelinePhase::WaitingFrame;
                return FrameOutcome::DecodeFailed;
            }
        };

        self.phase = PipelinePhase::Filtering;
        match self.state.decide(&self.filter, &reading) {
            Ok(Decision::Drop) => {
                self.logger.debug(&format!("ignoring unchanged reading {:?}", reading));
                self.metrics.record_dropped();
                self.phase = PipelinePhase::WaitingFrame;
                FrameOutcome::Dropped
            }
            Ok(Decision::Keep) => {
                if let Some(store) = &self.snapshots {
                    if let Err(err) = store.persist(&reading) {
                        self.logger.error(&format!("snapshot not persisted: {}", err));
                        self.metrics.record_snapshot_error();
                    }
                }
                self.logger.debug(&format!("staging reading {:?}", reading));
                self.staged.stage(reading);
                self.metrics.record_kept();
                self.phase = PipelinePhase::Staged;
                FrameOutcome::Kept
            }
            Err(err) => {
                self.logger.error(&format!("skipping frame {}: {}", frame.raw, err));
                self.metrics.record_filter_error();
                self.phase = PipelinePhase::WaitingFrame;
                FrameOutcome::FilterFailed
            }
        }
    }

    /// Sends the staged batch to the sink in insertion order. On failure the
    /// batch and its acknowledgements stay staged for the next attempt.
    pub fn flush(&mut self) -> Result<FlushOutcome, SinkError> {
        if self.staged.is_empty() {
            self.logger.record("nothing new to submit");
            self.phase = PipelinePhase::WaitingFrame;
            return Ok(FlushOutcome {
                acknowledged: self.staged.clear(),
                ..Default::default()
            });
        }

        self.phase = PipelinePhase::Flushing;
        let rows = self.staged.len();
        match self.sink.append(self.staged.readings()) {
            Ok(report) => {
                self.logger.record(&format!(
                    "{} cells in {} rows appended",
                    report.updated_cells, report.updated_rows
                ));
                self.metrics.record_flush(rows as u64);
                self.phase = PipelinePhase::WaitingFrame;
                Ok(FlushOutcome {
                    report,
                    rows,
                    acknowledged: self.staged.clear(),
                })
            }
            Err(err) => {
                self.logger
                    .warn(&format!("flush of {} readings failed: {}", rows, err));
                self.metrics.record_flush_failure();
                self.phase = PipelinePhase::Staged;
                Err(err)
            }
        }
    }

    /// Streams frames until the source fails, flushing after every keep.
    /// Transport and credential failures are retried with the next kept
    /// reading; readings the sink refuses are discarded.
    pub fn run_stream<S: FrameSource>(&mut self, source: &mut S) -> Result<(), PipelineError> {
        self.logger.record("streaming frames");
        loop {
            self.phase = PipelinePhase::WaitingFrame;
            match source.next_frame() {
                Ok(frame) => {
                    if self.ingest(&frame) == FrameOutcome::Kept {
                        if let Err(err) = self.flush() {
                            self.settle_failed_flush(&err);
                        }
                    }
                }
                Err(err) if err.is_recoverable() => {
                    self.logger.error(&err.to_string());
                    self.metrics.record_source_error();
                }
                Err(err) => {
                    self.logger.error(&format!("frame source closed: {}", err));
                    return Err(err.into());
                }
            }
        }
    }

    /// Keeps a failed streaming batch for retry, bounded by `max_staged`,
    /// or discards it when the sink will never accept it.
    fn settle_failed_flush(&mut self, err: &SinkError) {
        if !err.is_retryable() {
            let discarded = self.staged.len();
            self.staged.clear();
            self.logger
                .error(&format!("discarding {} readings refused by the sink", discarded));
            self.metrics.record_discarded(discarded as u64);
            self.phase = PipelinePhase::WaitingFrame;
            return;
        }

        let evicted = self.staged.evict_oldest(self.max_staged);
        if evicted > 0 {
            self.logger.warn(&format!(
                "retry queue full at {} readings, dropped {} oldest",
                self.max_staged, evicted
            ));
            self.metrics.record_discarded(evicted as u64);
        }
    }

    /// Processes every pending frame, flushes once, then removes the
    /// consumed frames. Nothing is removed when the flush fails.
    pub fn run_batch<S: PendingFrameSource>(
        &mut self,
        source: &mut S,
    ) -> Result<BatchReport, PipelineError> {
        let pending = source.list_pending()?;
        let mut report = BatchReport {
            pending: pending.len(),
            ..Default::default()
        };
        if pending.is_empty() && self.staged.is_empty() {
            self.logger.record("no pending frames found");
            return Ok(report);
        }
        self.logger
            .record(&format!("{} pending frames found", pending.len()));

        for entry in pending {
            match &entry.frame {
                Ok(frame) => match self.ingest(frame) {
                    FrameOutcome::Kept => report.kept += 1,
                    FrameOutcome::Dropped => report.dropped += 1,
                    FrameOutcome::DecodeFailed | FrameOutcome::FilterFailed => report.rejected += 1,
                },
                Err(err) => {
                    self.logger.error(&format!("{} {}", err, entry.id));
                    self.metrics.record_source_error();
                    report.rejected += 1;
                }
            }
            self.staged.acknowledge(entry.id);
        }

        let outcome = self.flush()?;
        report.appended = outcome.report;
        for id in &outcome.acknowledged {
            source.remove(id)?;
            report.removed += 1;
        }
        self.logger
            .record(&format!("{} pending frames removed", report.removed));
        Ok(report)
    }
}
