pub mod log_sink;
pub mod sheets;

pub use log_sink::LogSink;
pub use sheets::SheetsSink;

use crate::workflow::config::SinkConfig;
use sensorcore::prelude::ReadingSink;

/// Builds the sink selected by the workflow config.
pub fn build(config: &SinkConfig) -> anyhow::Result<Box<dyn ReadingSink>> {
    match config {
        SinkConfig::Sheets(sheets) => {
            let sink = SheetsSink::new(sheets)?;
            log::info!("appending rows via {}", sink.url());
            Ok(Box::new(sink))
        }
        SinkConfig::Log => {
            log::warn!("no spreadsheet configured, rows are only logged");
            Ok(Box::new(LogSink::default()))
        }
    }
}
