use crate::prelude::{DecodeError, SourceError};
use crate::protocol::reading::{DeviceClass, Measurement, Reading};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One fixed-width transmission as received from a sensor device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawFrame(pub u32);

impl RawFrame {
    /// Class nibble held in bits 28..=31.
    pub fn class_bits(self) -> u8 {
        ((self.0 >> 28) & 0xF) as u8
    }
}

impl fmt::Display for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl FromStr for RawFrame {
    type Err = SourceError;

    /// Parses a frame as printed by the serial firmware (decimal), also
    /// accepting `0x`-prefixed hex.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let text = line.trim();
        let parsed = match text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
        {
            Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
            None => text.parse::<u32>(),
        };
        parsed
            .map(RawFrame)
            .map_err(|err| SourceError::Malformed(format!("frame {:?}: {}", text, err)))
    }
}

/// A frame together with the instant it came off the transport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapturedFrame {
    pub raw: RawFrame,
    pub captured_at: DateTime<Local>,
}

impl CapturedFrame {
    pub fn new(raw: RawFrame, captured_at: DateTime<Local>) -> Self {
        Self { raw, captured_at }
    }

    pub fn now(raw: RawFrame) -> Self {
        Self::new(raw, Local::now())
    }
}

/// Offset and width of one packed field.
#[derive(Debug, Clone, Copy)]
struct BitField {
    shift: u32,
    mask: u32,
}

impl BitField {
    const fn new(shift: u32, mask: u32) -> Self {
        Self { shift, mask }
    }

    fn extract(self, frame: u32) -> f64 {
        ((frame >> self.shift) & self.mask) as f64
    }

    fn pack(self, value: f64) -> u32 {
        let whole = if value.is_finite() && value > 0.0 {
            value.trunc().min(u32::MAX as f64) as u32
        } else {
            0
        };
        (whole & self.mask) << self.shift
    }
}

const CLASS: BitField = BitField::new(28, 0xF);

const DISTANCE: BitField = BitField::new(16, 0xFFF);

const RAIN_HUMIDITY: BitField = BitField::new(21, 0x7F);
const RAIN_TEMPERATURE: BitField = BitField::new(15, 0x3F);
const RAIN_COUNTER: BitField = BitField::new(13, 0x3);

const BASIC_HUMIDITY: BitField = BitField::new(16, 0xFFF);
const BASIC_TEMPERATURE: BitField = BitField::new(0, 0xFFFF);

const PRESSURE_PRESSURE: BitField = BitField::new(12, 0x3FF);
const PRESSURE_TEMPERATURE: BitField = BitField::new(22, 0x3F);

/// Unpacks a frame into a reading stamped with `timestamp`.
///
/// Values are accepted as-is; the protocol has no validity range beyond the
/// width of each field.
pub fn decode_at(frame: RawFrame, timestamp: DateTime<Local>) -> Result<Reading, DecodeError> {
    let bits = frame.0;
    let class = DeviceClass::from_id(frame.class_bits()).ok_or(
        DecodeError::UnknownDeviceClass {
            class: frame.class_bits(),
            frame: bits,
        },
    )?;

    let measurement = match class {
        DeviceClass::Distance => Measurement::Distance {
            distance: DISTANCE.extract(bits),
        },
        DeviceClass::ClimateRain => Measurement::ClimateRain {
            temperature: RAIN_TEMPERATURE.extract(bits),
            humidity: RAIN_HUMIDITY.extract(bits),
            rain: RAIN_COUNTER.extract(bits),
        },
        DeviceClass::ClimateBasic => Measurement::ClimateBasic {
            temperature: BASIC_TEMPERATURE.extract(bits),
            humidity: BASIC_HUMIDITY.extract(bits),
        },
        DeviceClass::ClimatePressure => Measurement::ClimatePressure {
            temperature: PRESSURE_TEMPERATURE.extract(bits),
            pressure: PRESSURE_PRESSURE.extract(bits),
        },
    };

    Ok(Reading::new(timestamp, measurement))
}

/// Unpacks a frame captured right now.
pub fn decode(frame: RawFrame) -> Result<Reading, DecodeError> {
    decode_at(frame, Local::now())
}

/// Unpacks a captured frame using its capture instant as the timestamp.
pub fn decode_captured(frame: &CapturedFrame) -> Result<Reading, DecodeError> {
    decode_at(frame.raw, frame.captured_at)
}

/// Packs a measurement back into frame bits. Fractional parts are dropped
/// and values are masked to their field width.
pub fn encode(measurement: &Measurement) -> RawFrame {
    let class = measurement.device_class().id() as u32;
    let header = (class & CLASS.mask) << CLASS.shift;
    let body = match *measurement {
        Measurement::Distance { distance } => DISTANCE.pack(distance),
        Measurement::ClimateRain {
            temperature,
            humidity,
            rain,
        } => {
            RAIN_HUMIDITY.pack(humidity)
                | RAIN_TEMPERATURE.pack(temperature)
                | RAIN_COUNTER.pack(rain)
        }
        Measurement::ClimateBasic {
            temperature,
            humidity,
        } => BASIC_HUMIDITY.pack(humidity) | BASIC_TEMPERATURE.pack(temperature),
        Measurement::ClimatePressure {
            temperature,
            pressure,
        } => PRESSURE_PRESSURE.pack(pressure) | PRESSURE_TEMPERATURE.pack(temperature),
    };
    RawFrame(header | body)
}
