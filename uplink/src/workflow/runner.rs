use crate::generator::profile::{build_frames, GeneratorConfig};
use crate::transport::spool::SpoolDirectory;
use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use chrono::Local;
use sensorcore::prelude::{FrameSource, PipelineError, ReadingSink, SourceError};
use sensorcore::processing::{
    BatchReport, ChangeFilter, IngestionPipeline, LastSeenState, SnapshotStore,
};
use sensorcore::protocol::decode_captured;
use sensorcore::telemetry::{LogManager, MetricsRecorder};
use std::sync::Arc;

/// Drives the uplink commands against one workflow config.
#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
    metrics: Arc<MetricsRecorder>,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self {
            config,
            metrics: Arc::new(MetricsRecorder::new()),
        }
    }

    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        self.metrics.clone()
    }

    /// Builds a pipeline, seeding its state from the cache directory when
    /// one is configured.
    fn pipeline<K: ReadingSink>(
        &self,
        sink: K,
        logger: LogManager,
    ) -> anyhow::Result<IngestionPipeline<K>> {
        let filter = ChangeFilter::new(self.config.filter.clone());
        let Some(cache_dir) = self.config.cache_dir.as_ref() else {
            logger.record("no cache directory, last-seen state is kept in memory");
            return Ok(IngestionPipeline::new(sink, filter, Arc::new(LastSeenState::new()))
                .with_max_staged(self.config.max_staged)
                .with_logger(logger)
                .with_metrics(self.metrics.clone()));
        };

        let store = SnapshotStore::open(cache_dir, logger.scoped("uplink::cache"))
            .with_context(|| format!("opening cache directory {}", cache_dir.display()))?;
        let seeded = store
            .load_all()
            .with_context(|| format!("loading snapshots from {}", cache_dir.display()))?;
        let state = Arc::new(LastSeenState::seeded(seeded));
        Ok(IngestionPipeline::new(sink, filter, state)
            .with_snapshots(store)
            .with_max_staged(self.config.max_staged)
            .with_logger(logger)
            .with_metrics(self.metrics.clone()))
    }

    /// Streams frames until the source ends; every kept reading is appended
    /// immediately. End of input finishes cleanly, other transport failures
    /// are returned.
    pub fn stream<S: FrameSource, K: ReadingSink>(&self, source: &mut S, sink: K) -> anyhow::Result<()> {
        let mut pipeline = self.pipeline(sink, LogManager::new("uplink::stream"))?;
        match pipeline.run_stream(source) {
            Err(PipelineError::Source(SourceError::Disconnected(name))) => {
                log::info!("frame source {} closed", name);
                Ok(())
            }
            Err(err) => Err(err).context("streaming frames"),
            Ok(()) => Ok(()),
        }
    }

    /// Uploads everything pending in the spool directory in one append.
    pub fn upload<K: ReadingSink>(&self, spool: &mut SpoolDirectory, sink: K) -> anyhow::Result<BatchReport> {
        let mut pipeline = self.pipeline(sink, LogManager::new("uplink::upload"))?;
        pipeline
            .run_batch(spool)
            .with_context(|| format!("uploading frames from {}", spool.dir().display()))
    }

    /// Captures frames from the serial source into the spool directory,
    /// skipping frames of unknown device classes. Returns the number of
    /// frames spooled once the source ends.
    pub fn spool<S: FrameSource>(&self, source: &mut S, spool: &SpoolDirectory) -> anyhow::Result<usize> {
        let logger = LogManager::new("uplink::spool");
        let mut written = 0;
        loop {
            let frame = match source.next_frame() {
                Ok(frame) => frame,
                Err(err) if err.is_recoverable() => {
                    logger.error(&err.to_string());
                    self.metrics.record_source_error();
                    continue;
                }
                Err(SourceError::Disconnected(name)) => {
                    logger.record(&format!("frame source {} closed after {} frames", name, written));
                    return Ok(written);
                }
                Err(err) => return Err(err).context("reading serial frames"),
            };
            self.metrics.record_frame();

            if let Err(err) = decode_captured(&frame) {
                logger.error(&format!("not spooling frame {}: {}", frame.raw, err));
                self.metrics.record_decode_error();
                continue;
            }
            let path = spool.write(&frame)?;
            logger.debug(&format!("spooled frame {} to {}", frame.raw, path.display()));
            written += 1;
        }
    }

    /// Writes synthetic frames into the spool directory.
    pub fn simulate(&self, spool: &SpoolDirectory, generator: &GeneratorConfig) -> anyhow::Result<usize> {
        let frames = build_frames(generator, Local::now()).context("generating frames")?;
        for frame in &frames {
            spool.write(frame)?;
        }
        log::info!("{} synthetic frames written to {}", frames.len(), spool.dir().display());
        Ok(frames.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::LogSink;
    use crate::transport::serial::LineFrameSource;
    use sensorcore::prelude::{AppendReport, PendingFrameSource, SinkError};
    use sensorcore::protocol::Reading;
    use std::fs;
    use std::io::Cursor;
    use tempfile::tempdir;

    struct FailingSink;

    impl ReadingSink for FailingSink {
        fn append(&mut self, _readings: &[Reading]) -> Result<AppendReport, SinkError> {
            Err(SinkError::Auth("token expired".into()))
        }
    }

    fn count_files(dir: &std::path::Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn runner_uploads_spooled_frames_and_caches_state() {
        let spool_dir = tempdir().unwrap();
        let cache_dir = tempdir().unwrap();
        let runner = Runner::new(WorkflowConfig {
            cache_dir: Some(cache_dir.path().to_path_buf()),
            ..Default::default()
        });
        let mut spool = SpoolDirectory::open(spool_dir.path()).unwrap();
        let generator = GeneratorConfig {
            count: 24,
            seed: 3,
            ..Default::default()
        };

        assert_eq!(runner.simulate(&spool, &generator).unwrap(), 24);
        let report = runner.upload(&mut spool, LogSink::default()).unwrap();
        assert_eq!(report.pending, 24);
        assert_eq!(report.removed, 24);
        assert!(report.kept >= 1);
        assert_eq!(report.kept + report.dropped, 24);
        assert_eq!(report.appended.updated_rows, report.kept as u64);
        assert_eq!(count_files(spool_dir.path()), 0);
        assert!(count_files(cache_dir.path()) >= 1);
    }

    #[test]
    fn restarted_upload_drops_already_cached_readings() {
        let spool_dir = tempdir().unwrap();
        let cache_dir = tempdir().unwrap();
        let config = WorkflowConfig {
            cache_dir: Some(cache_dir.path().to_path_buf()),
            ..Default::default()
        };
        let mut spool = SpoolDirectory::open(spool_dir.path()).unwrap();
        let mut serial = LineFrameSource::new(Cursor::new("536871122\n"), "replay");

        let first = Runner::new(config.clone());
        assert_eq!(first.spool(&mut serial, &spool).unwrap(), 1);
        assert_eq!(first.upload(&mut spool, LogSink::default()).unwrap().kept, 1);

        let mut serial = LineFrameSource::new(Cursor::new("536871122\n"), "replay");
        let second = Runner::new(config);
        second.spool(&mut serial, &spool).unwrap();
        let report = second.upload(&mut spool, LogSink::default()).unwrap();
        assert_eq!(report.kept, 0);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.removed, 1);
    }

    #[test]
    fn failed_upload_leaves_spool_untouched() {
        let spool_dir = tempdir().unwrap();
        let runner = Runner::new(WorkflowConfig::default());
        let mut spool = SpoolDirectory::open(spool_dir.path()).unwrap();
        runner
            .simulate(
                &spool,
                &GeneratorConfig {
                    count: 5,
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(runner.upload(&mut spool, FailingSink).is_err());
        assert_eq!(spool.list_pending().unwrap().len(), 5);
    }

    #[test]
    fn spool_skips_unknown_classes_and_noise() {
        let spool_dir = tempdir().unwrap();
        let runner = Runner::new(WorkflowConfig::default());
        let spool = SpoolDirectory::open(spool_dir.path()).unwrap();
        let mut serial = LineFrameSource::new(
            Cursor::new("536871122\n4026531840\ngarbage\n11272192\n"),
            "replay",
        );

        assert_eq!(runner.spool(&mut serial, &spool).unwrap(), 2);
        let metrics = runner.metrics().snapshot();
        assert_eq!(metrics.decode_errors, 1);
        assert_eq!(metrics.source_errors, 1);
    }

    #[test]
    fn stream_appends_changes_until_input_ends() {
        let runner = Runner::new(WorkflowConfig::default());
        let mut serial = LineFrameSource::new(
            Cursor::new("536871122\n536871123\n11272192\n536871140\n"),
            "replay",
        );

        runner.stream(&mut serial, LogSink::default()).unwrap();
        let metrics = runner.metrics().snapshot();
        assert_eq!(metrics.frames, 4);
        assert_eq!(metrics.kept, 3);
        assert_eq!(metrics.dropped, 1);
        assert_eq!(metrics.flushes, 3);
    }
}
