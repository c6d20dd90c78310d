use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sensor device classes known to the frame protocol, numbered as in the
/// top nibble of a frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceClass {
    Distance,
    ClimateRain,
    ClimateBasic,
    ClimatePressure,
}

impl DeviceClass {
    pub const ALL: [DeviceClass; 4] = [
        DeviceClass::Distance,
        DeviceClass::ClimateRain,
        DeviceClass::ClimateBasic,
        DeviceClass::ClimatePressure,
    ];

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(DeviceClass::Distance),
            1 => Some(DeviceClass::ClimateRain),
            2 => Some(DeviceClass::ClimateBasic),
            3 => Some(DeviceClass::ClimatePressure),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        match self {
            DeviceClass::Distance => 0,
            DeviceClass::ClimateRain => 1,
            DeviceClass::ClimateBasic => 2,
            DeviceClass::ClimatePressure => 3,
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceClass::Distance => "distance",
            DeviceClass::ClimateRain => "climate-rain",
            DeviceClass::ClimateBasic => "climate-basic",
            DeviceClass::ClimatePressure => "climate-pressure",
        };
        write!(f, "{}#{}", name, self.id())
    }
}

/// Key identifying one device in the last-seen state. The protocol carries
/// no address beyond the class nibble, so the class id doubles as the key.
pub type DeviceId = u8;

/// Per-class field set. Each variant carries exactly the fields its class
/// defines.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Measurement {
    Distance {
        distance: f64,
    },
    ClimateRain {
        temperature: f64,
        humidity: f64,
        rain: f64,
    },
    ClimateBasic {
        temperature: f64,
        humidity: f64,
    },
    ClimatePressure {
        temperature: f64,
        pressure: f64,
    },
}

impl Measurement {
    pub fn device_class(&self) -> DeviceClass {
        match self {
            Measurement::Distance { .. } => DeviceClass::Distance,
            Measurement::ClimateRain { .. } => DeviceClass::ClimateRain,
            Measurement::ClimateBasic { .. } => DeviceClass::ClimateBasic,
            Measurement::ClimatePressure { .. } => DeviceClass::ClimatePressure,
        }
    }
}

/// Decoded, immutable sensor reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    timestamp: DateTime<Local>,
    measurement: Measurement,
}

impl Reading {
    pub fn new(timestamp: DateTime<Local>, measurement: Measurement) -> Self {
        Self {
            timestamp,
            measurement,
        }
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn measurement(&self) -> &Measurement {
        &self.measurement
    }

    pub fn device_class(&self) -> DeviceClass {
        self.measurement.device_class()
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_class().id()
    }

    pub fn temperature(&self) -> Option<f64> {
        match self.measurement {
            Measurement::ClimateRain { temperature, .. }
            | Measurement::ClimateBasic { temperature, .. }
            | Measurement::ClimatePressure { temperature, .. } => Some(temperature),
            Measurement::Distance { .. } => None,
        }
    }

    pub fn humidity(&self) -> Option<f64> {
        match self.measurement {
            Measurement::ClimateRain { humidity, .. }
            | Measurement::ClimateBasic { humidity, .. } => Some(humidity),
            _ => None,
        }
    }

    pub fn pressure(&self) -> Option<f64> {
        match self.measurement {
            Measurement::ClimatePressure { pressure, .. } => Some(pressure),
            _ => None,
        }
    }

    pub fn rain(&self) -> Option<f64> {
        match self.measurement {
            Measurement::ClimateRain { rain, .. } => Some(rain),
            _ => None,
        }
    }

    pub fn distance(&self) -> Option<f64> {
        match self.measurement {
            Measurement::Distance { distance } => Some(distance),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn device_class_ids_round_trip() {
        for class in DeviceClass::ALL {
            assert_eq!(DeviceClass::from_id(class.id()), Some(class));
        }
        assert_eq!(DeviceClass::from_id(4), None);
        assert_eq!(DeviceClass::from_id(15), None);
    }

    #[test]
    fn reading_exposes_only_class_fields() {
        let ts = Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let reading = Reading::new(
            ts,
            Measurement::ClimatePressure {
                temperature: 21.0,
                pressure: 1013.0,
            },
        );

        assert_eq!(reading.device_id(), 3);
        assert_eq!(reading.temperature(), Some(21.0));
        assert_eq!(reading.pressure(), Some(1013.0));
        assert_eq!(reading.humidity(), None);
        assert_eq!(reading.rain(), None);
        assert_eq!(reading.distance(), None);
    }
}
