use anyhow::bail;
use chrono::{DateTime, Duration, Local};
use rand::{rngs::StdRng, Rng, SeedableRng};
use sensorcore::protocol::{encode, CapturedFrame, DeviceClass, Measurement, RawFrame};
use serde::{Deserialize, Serialize};

/// Configuration for generating synthetic sensor frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub count: usize,
    pub seed: u64,
    pub classes: Vec<DeviceClass>,
    /// Largest step a field takes between two frames of one device.
    pub drift: f64,
    /// Share of frames carrying an unknown class nibble.
    pub invalid_ratio: f64,
    pub interval_secs: i64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            count: 32,
            seed: 0,
            classes: DeviceClass::ALL.to_vec(),
            drift: 4.0,
            invalid_ratio: 0.0,
            interval_secs: 60,
        }
    }
}

/// Starting point of each simulated device.
fn baseline(class: DeviceClass) -> Measurement {
    match class {
        DeviceClass::Distance => Measurement::Distance { distance: 150.0 },
        DeviceClass::ClimateRain => Measurement::ClimateRain {
            temperature: 18.0,
            humidity: 60.0,
            rain: 0.0,
        },
        DeviceClass::ClimateBasic => Measurement::ClimateBasic {
            temperature: 21.0,
            humidity: 45.0,
        },
        DeviceClass::ClimatePressure => Measurement::ClimatePressure {
            temperature: 20.0,
            pressure: 1000.0,
        },
    }
}

fn step(rng: &mut StdRng, value: f64, drift: f64, max: f64) -> f64 {
    let jitter = if drift > 0.0 {
        rng.gen_range(-drift..=drift).round()
    } else {
        0.0
    };
    (value + jitter).clamp(0.0, max)
}

fn advance(rng: &mut StdRng, current: Measurement, drift: f64) -> Measurement {
    match current {
        Measurement::Distance { distance } => Measurement::Distance {
            distance: step(rng, distance, drift * 4.0, 4095.0),
        },
        Measurement::ClimateRain {
            temperature,
            humidity,
            rain,
        } => Measurement::ClimateRain {
            temperature: step(rng, temperature, drift, 63.0),
            humidity: step(rng, humidity, drift, 127.0),
            rain: if rng.gen_bool(0.25) {
                (rain + 1.0) % 4.0
            } else {
                rain
            },
        },
        Measurement::ClimateBasic {
            temperature,
            humidity,
        } => Measurement::ClimateBasic {
            temperature: step(rng, temperature, drift * 2.0, 65535.0),
            humidity: step(rng, humidity, drift * 3.0, 4095.0),
        },
        Measurement::ClimatePressure {
            temperature,
            pressure,
        } => Measurement::ClimatePressure {
            temperature: step(rng, temperature, drift / 2.0, 63.0),
            pressure: step(rng, pressure, drift / 2.0, 1023.0),
        },
    }
}

/// Builds `config.count` frames, one device per frame, spaced
/// `interval_secs` apart starting at `start`.
pub fn build_frames(
    config: &GeneratorConfig,
    start: DateTime<Local>,
) -> anyhow::Result<Vec<CapturedFrame>> {
    if config.classes.is_empty() {
        bail!("generator needs at least one device class");
    }
    if !(0.0..=1.0).contains(&config.invalid_ratio) {
        bail!("invalid_ratio must lie within 0..=1");
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut devices: Vec<Measurement> = config.classes.iter().map(|c| baseline(*c)).collect();
    let mut frames = Vec::with_capacity(config.count);

    for index in 0..config.count {
        let captured_at = start + Duration::seconds(config.interval_secs * index as i64);
        let raw = if rng.gen_bool(config.invalid_ratio) {
            let class = rng.gen_range(4u32..16);
            RawFrame((class << 28) | rng.gen_range(0..(1u32 << 28)))
        } else {
            let slot = rng.gen_range(0..devices.len());
            devices[slot] = advance(&mut rng, devices[slot], config.drift);
            encode(&devices[slot])
        };
        frames.push(CapturedFrame::new(raw, captured_at));
    }

    Ok(frames)
}
