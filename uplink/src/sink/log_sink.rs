use sensorcore::prelude::{AppendReport, ReadingSink, SinkError};
use sensorcore::protocol::row::ROW_WIDTH;
use sensorcore::protocol::{to_rows, Reading};
use sensorcore::telemetry::LogManager;
use serde_json::Value;

/// Dry-run sink that logs each row instead of sending it.
pub struct LogSink {
    logger: LogManager,
    rows_logged: u64,
}

impl LogSink {
    pub fn new(logger: LogManager) -> Self {
        Self {
            logger,
            rows_logged: 0,
        }
    }

    pub fn rows_logged(&self) -> u64 {
        self.rows_logged
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new(LogManager::new("uplink::sink"))
    }
}

impl ReadingSink for LogSink {
    fn append(&mut self, readings: &[Reading]) -> Result<AppendReport, SinkError> {
        for row in to_rows(readings) {
            self.logger
                .record(&format!("dry-run row {}", Value::Array(row.to_vec())));
        }
        let rows = readings.len() as u64;
        self.rows_logged += rows;
        Ok(AppendReport {
            updated_cells: rows * ROW_WIDTH as u64,
            updated_rows: rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use sensorcore::protocol::Measurement;

    #[test]
    fn reports_full_rows() {
        let mut sink = LogSink::default();
        let readings = vec![
            Reading::new(Local::now(), Measurement::Distance { distance: 3.0 }),
            Reading::new(Local::now(), Measurement::Distance { distance: 30.0 }),
        ];

        let report = sink.append(&readings).unwrap();
        assert_eq!(report.updated_rows, 2);
        assert_eq!(report.updated_cells, 14);
        assert_eq!(sink.rows_logged(), 2);
    }
}
