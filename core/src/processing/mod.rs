pub mod filter;
pub mod pipeline;
pub mod snapshot;
pub mod staging;
pub mod state;

pub use filter::{ChangeFilter, Decision, FilterConfig};
pub use pipeline::{
    BatchReport, FlushOutcome, FrameOutcome, IngestionPipeline, PipelinePhase, DEFAULT_MAX_STAGED,
};
pub use snapshot::{SnapshotRecord, SnapshotStore};
pub use staging::StagedBatch;
pub use state::LastSeenState;
