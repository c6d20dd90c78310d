use crate::protocol::{CapturedFrame, DeviceId, Reading};
use serde::{Deserialize, Serialize};

/// Failure to unpack a frame.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown device class {class} in frame {frame:#010x}")]
    UnknownDeviceClass { class: u8, frame: u32 },
}

/// Failure to compare a candidate against the stored state for its device.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("unsupported state for device {device_id}: stored {stored}, candidate {candidate}")]
    UnsupportedDeviceState {
        device_id: DeviceId,
        stored: String,
        candidate: String,
    },
}

/// Failure reported by a reading sink. All variants are treated as transient:
/// the staged batch is kept for the next flush.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("sink transport failure: {0}")]
    Transport(String),
    #[error("sink rejected credentials: {0}")]
    Auth(String),
    #[error("sink rejected append with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("sink returned malformed response: {0}")]
    Malformed(String),
}

impl SinkError {
    /// Whether resending the same readings later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SinkError::Transport(_) | SinkError::Auth(_))
    }
}

/// Failure reading from a frame source.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// A single frame could not be parsed; the source itself is healthy.
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("frame source i/o failure: {0}")]
    Io(String),
    #[error("frame source disconnected: {0}")]
    Disconnected(String),
}

impl SourceError {
    /// Whether the run can continue past this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SourceError::Malformed(_))
    }
}

/// Failure reading or writing durable per-device snapshots.
#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    #[error("snapshot i/o failure on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid snapshot record {path}: {reason}")]
    Invalid { path: String, reason: String },
}

/// Failure that ends a pipeline run.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Identifier of a pending frame in a batch source (e.g. a file name).
pub type FrameId = String;

/// Counts reported by a sink after a successful append.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendReport {
    pub updated_cells: u64,
    pub updated_rows: u64,
}

/// Blocking source of frames, e.g. a serial port.
pub trait FrameSource {
    /// Blocks until the next frame is available.
    fn next_frame(&mut self) -> Result<CapturedFrame, SourceError>;
}

/// One entry of a batch source. Entries that fail to parse still carry their
/// id so they can be consumed with the rest of the batch.
#[derive(Debug, Clone)]
pub struct PendingFrame {
    pub id: FrameId,
    pub frame: Result<CapturedFrame, SourceError>,
}

/// Snapshot-style source of frames waiting to be uploaded, e.g. a spool
/// directory.
pub trait PendingFrameSource {
    /// Lists pending frames in source order.
    fn list_pending(&mut self) -> Result<Vec<PendingFrame>, SourceError>;
    fn remove(&mut self, id: &FrameId) -> Result<(), SourceError>;
}

/// Remote tabular store accepting decoded readings.
pub trait ReadingSink {
    fn append(&mut self, readings: &[Reading]) -> Result<AppendReport, SinkError>;
}

impl<T: ReadingSink + ?Sized> ReadingSink for Box<T> {
    fn append(&mut self, readings: &[Reading]) -> Result<AppendReport, SinkError> {
        (**self).append(readings)
    }
}
