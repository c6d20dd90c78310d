use crate::prelude::SnapshotError;
use crate::protocol::row::TIMESTAMP_FORMAT;
use crate::protocol::{DeviceClass, DeviceId, Measurement, Reading};
use crate::telemetry::LogManager;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted form of the last kept reading for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRecord {
    pub device_id: DeviceId,
    #[serde(with = "local_timestamp")]
    pub timestamp: DateTime<Local>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rain: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

impl From<&Reading> for SnapshotRecord {
    fn from(reading: &Reading) -> Self {
        Self {
            device_id: reading.device_id(),
            timestamp: reading.timestamp(),
            temperature: reading.temperature(),
            humidity: reading.humidity(),
            pressure: reading.pressure(),
            rain: reading.rain(),
            distance: reading.distance(),
        }
    }
}

impl SnapshotRecord {
    /// Rebuilds the reading, requiring every field of the record's class.
    pub fn into_reading(self) -> Result<Reading, String> {
        let class = DeviceClass::from_id(self.device_id)
            .ok_or_else(|| format!("unsupported deviceId {}", self.device_id))?;
        let need = |value: Option<f64>, name: &str| {
            value.ok_or_else(|| format!("{} record is missing {}", class, name))
        };
        let measurement = match class {
            DeviceClass::Distance => Measurement::Distance {
                distance: need(self.distance, "distance")?,
            },
            DeviceClass::ClimateRain => Measurement::ClimateRain {
                temperature: need(self.temperature, "temperature")?,
                humidity: need(self.humidity, "humidity")?,
                rain: need(self.rain, "rain")?,
            },
            DeviceClass::ClimateBasic => Measurement::ClimateBasic {
                temperature: need(self.temperature, "temperature")?,
                humidity: need(self.humidity, "humidity")?,
            },
            DeviceClass::ClimatePressure => Measurement::ClimatePressure {
                temperature: need(self.temperature, "temperature")?,
                pressure: need(self.pressure, "pressure")?,
            },
        };
        Ok(Reading::new(self.timestamp, measurement))
    }
}

/// Cache directory holding one `<deviceId>.json` record per device.
pub struct SnapshotStore {
    dir: PathBuf,
    logger: LogManager,
}

impl SnapshotStore {
    pub fn open<P: AsRef<Path>>(dir: P, logger: LogManager) -> Result<Self, SnapshotError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| io_error(&dir, source))?;
        Ok(Self { dir, logger })
    }

    fn record_path(&self, device_id: DeviceId) -> PathBuf {
        self.dir.join(format!("{}.json", device_id))
    }

    /// Loads every readable record. Invalid files are logged and skipped.
    pub fn load_all(&self) -> Result<Vec<(DeviceId, Reading)>, SnapshotError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(|source| io_error(&self.dir, source))? {
            let entry = entry.map_err(|source| io_error(&self.dir, source))?;
            let path = entry.path();
            if path.is_file() && !is_hidden(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut readings = Vec::with_capacity(paths.len());
        for path in paths {
            match read_record(&path) {
                Ok(reading) => {
                    self.logger
                        .debug(&format!("loaded snapshot {} for device {}", path.display(), reading.device_id()));
                    readings.push((reading.device_id(), reading));
                }
                Err(err) => self.logger.error(&err.to_string()),
            }
        }
        self.logger.record(&format!(
            "{} cached snapshots loaded from {}",
            readings.len(),
            self.dir.display()
        ));
        Ok(readings)
    }

    /// Writes the record for the reading's device, replacing the previous one.
    pub fn persist(&self, reading: &Reading) -> Result<(), SnapshotError> {
        let path = self.record_path(reading.device_id());
        let staging = self.dir.join(format!(".{}.json.tmp", reading.device_id()));
        let serialized = serde_json::to_string_pretty(&SnapshotRecord::from(reading)).map_err(|err| {
            SnapshotError::Invalid {
                path: path.display().to_string(),
                reason: err.to_string(),
            }
        })?;
        fs::write(&staging, serialized).map_err(|source| io_error(&staging, source))?;
        fs::rename(&staging, &path).map_err(|source| io_error(&path, source))?;
        Ok(())
    }
}

fn read_record(path: &Path) -> Result<Reading, SnapshotError> {
    let contents = fs::read_to_string(path).map_err(|source| io_error(path, source))?;
    let invalid = |reason: String| SnapshotError::Invalid {
        path: path.display().to_string(),
        reason,
    };
    let record: SnapshotRecord =
        serde_json::from_str(&contents).map_err(|err| invalid(err.to_string()))?;
    record.into_reading().map_err(invalid)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

fn io_error(path: &Path, source: std::io::Error) -> SnapshotError {
    SnapshotError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Local wall-clock timestamps as `%Y-%m-%d %H:%M:%S`; RFC 3339 is accepted
/// on read.
pub mod local_timestamp {
    use super::*;
    use serde::{de::Error, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Local>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Local>, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse(&text).map_err(D::Error::custom)
    }

    pub fn parse(text: &str) -> Result<DateTime<Local>, String> {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .ok_or_else(|| format!("timestamp {:?} does not exist in local time", text));
        }
        DateTime::parse_from_rfc3339(text)
            .map(|ts| ts.with_timezone(&Local))
            .map_err(|err| format!("timestamp {:?}: {}", text, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn at_noon(measurement: Measurement) -> Reading {
        Reading::new(
            Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            measurement,
        )
    }

    #[test]
    fn persisted_snapshots_reload() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::open(dir.path(), LogManager::default()).unwrap();
        let first = at_noon(Measurement::ClimateBasic {
            temperature: 20.0,
            humidity: 50.0,
        });
        let second = at_noon(Measurement::ClimateBasic {
            temperature: 30.0,
            humidity: 40.0,
        });
        let distance = at_noon(Measurement::Distance { distance: 104.0 });

        store.persist(&first).unwrap();
        store.persist(&second).unwrap();
        store.persist(&distance).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded, vec![(0, distance), (2, second)]);
    }

    #[test]
    fn records_use_cache_file_layout() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::open(dir.path(), LogManager::default()).unwrap();
        store
            .persist(&at_noon(Measurement::ClimatePressure {
                temperature: 21.0,
                pressure: 1013.0,
            }))
            .unwrap();

        let raw = fs::read_to_string(dir.path().join("3.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "deviceId": 3,
                "timestamp": "2024-05-01 12:00:00",
                "temperature": 21.0,
                "pressure": 1013.0,
            })
        );
    }

    #[test]
    fn invalid_records_are_skipped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("garbage.json"), "{not json").unwrap();
        fs::write(
            dir.path().join("9.json"),
            r#"{"deviceId": 9, "timestamp": "2024-05-01 12:00:00"}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("1.json"),
            r#"{"deviceId": 1, "timestamp": "2024-05-01 12:00:00", "rain": 2}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("0.json"),
            r#"{"deviceId": 0, "timestamp": "2024-05-01 12:00:00", "distance": 55}"#,
        )
        .unwrap();

        let store = SnapshotStore::open(dir.path(), LogManager::default()).unwrap();
        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].1.distance(), Some(55.0));
    }
}
