use crate::protocol::reading::{Measurement, Reading};
use serde::Serialize;
use serde_json::Value;

/// Timestamp rendering used in sheet rows and snapshot records.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Number of columns in the sink row contract.
pub const ROW_WIDTH: usize = 7;

/// One reading laid out in the fixed sink column order:
/// `[timestamp, deviceId, temperature, humidity, pressure, rain, distance]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetRow {
    pub timestamp: String,
    pub device_id: u8,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub rain: Option<f64>,
    pub distance: Option<f64>,
}

impl SheetRow {
    pub fn into_cells(self) -> [Value; ROW_WIDTH] {
        [
            Value::String(self.timestamp),
            Value::from(self.device_id),
            number_cell(self.temperature),
            number_cell(self.humidity),
            number_cell(self.pressure),
            number_cell(self.rain),
            number_cell(self.distance),
        ]
    }
}

impl From<&Reading> for SheetRow {
    fn from(reading: &Reading) -> Self {
        let mut row = SheetRow {
            timestamp: reading.timestamp().format(TIMESTAMP_FORMAT).to_string(),
            device_id: reading.device_id(),
            temperature: None,
            humidity: None,
            pressure: None,
            rain: None,
            distance: None,
        };
        match *reading.measurement() {
            Measurement::Distance { distance } => row.distance = Some(distance),
            Measurement::ClimateRain {
                temperature,
                humidity,
                rain,
            } => {
                row.temperature = Some(temperature);
                row.humidity = Some(humidity);
                row.rain = Some(rain);
            }
            Measurement::ClimateBasic {
                temperature,
                humidity,
            } => {
                row.temperature = Some(temperature);
                row.humidity = Some(humidity);
            }
            Measurement::ClimatePressure {
                temperature,
                pressure,
            } => {
                row.temperature = Some(temperature);
                row.pressure = Some(pressure);
            }
        }
        row
    }
}

/// Serializes readings into sink rows, preserving order.
pub fn to_rows(readings: &[Reading]) -> Vec<[Value; ROW_WIDTH]> {
    readings
        .iter()
        .map(|reading| SheetRow::from(reading).into_cells())
        .collect()
}

fn number_cell(value: Option<f64>) -> Value {
    match value {
        None => Value::Null,
        Some(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => Value::from(v as i64),
        Some(v) => serde_json::Number::from_f64(v)
            .map(Value::Number)
            .unwrap_or(Value::Null),
    }
}
