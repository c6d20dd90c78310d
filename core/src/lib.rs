//! Frame decoding and change-detection core for the sensor telemetry uplink.
//!
//! Raw 32-bit frames from the serial link are unpacked into typed readings,
//! filtered against the last kept reading per device, and staged for a
//! reading sink. Transports and sinks live behind the traits in [`prelude`].

pub mod prelude;
pub mod processing;
pub mod protocol;
pub mod telemetry;

pub use prelude::{FrameSource, PendingFrameSource, ReadingSink};
