pub mod serial;
pub mod spool;

pub use serial::LineFrameSource;
pub use spool::SpoolDirectory;
