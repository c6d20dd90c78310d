use crate::prelude::FilterError;
use crate::protocol::{Measurement, Reading};
use serde::{Deserialize, Serialize};

/// Outcome of comparing a candidate against the last kept reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Keep,
    Drop,
}

/// Tolerance bands per device class. A delta strictly inside `(-band, band)`
/// counts as no change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FilterConfig {
    /// Distance readings are compared by bucket of this many units.
    pub distance_bucket: i64,
    pub basic_temperature_band: i64,
    pub basic_humidity_band: i64,
    pub pressure_temperature_band: i64,
    pub pressure_band: i64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            distance_bucket: 10,
            basic_temperature_band: 5,
            basic_humidity_band: 10,
            pressure_temperature_band: 2,
            pressure_band: 2,
        }
    }
}

/// Decides whether a reading differs enough from the previous one to be
/// forwarded.
#[derive(Debug, Clone, Default)]
pub struct ChangeFilter {
    config: FilterConfig,
}

impl ChangeFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn should_keep(
        &self,
        previous: Option<&Reading>,
        candidate: &Reading,
    ) -> Result<Decision, FilterError> {
        let previous = match previous {
            Some(previous) => previous,
            None => return Ok(Decision::Keep),
        };
        let cfg = &self.config;

        let unchanged = match (previous.measurement(), candidate.measurement()) {
            (
                Measurement::Distance { distance: old },
                Measurement::Distance { distance: new },
            ) => {
                let bucket = cfg.distance_bucket.max(1);
                whole(*new).div_euclid(bucket) == whole(*old).div_euclid(bucket)
            }
            // Only the rain counter matters for this class; temperature and
            // humidity swings are not checked.
            (
                Measurement::ClimateRain { rain: old, .. },
                Measurement::ClimateRain { rain: new, .. },
            ) => whole(*new) - whole(*old) == 0,
            (
                Measurement::ClimateBasic {
                    temperature: old_temp,
                    humidity: old_hum,
                },
                Measurement::ClimateBasic {
                    temperature: new_temp,
                    humidity: new_hum,
                },
            ) => {
                within_band(delta(*new_temp, *old_temp), cfg.basic_temperature_band)
                    && within_band(delta(*new_hum, *old_hum), cfg.basic_humidity_band)
            }
            (
                Measurement::ClimatePressure {
                    temperature: old_temp,
                    pressure: old_press,
                },
                Measurement::ClimatePressure {
                    temperature: new_temp,
                    pressure: new_press,
                },
            ) => {
                within_band(delta(*new_temp, *old_temp), cfg.pressure_temperature_band)
                    && within_band(delta(*new_press, *old_press), cfg.pressure_band)
            }
            _ => {
                return Err(FilterError::UnsupportedDeviceState {
                    device_id: candidate.device_id(),
                    stored: previous.device_class().to_string(),
                    candidate: candidate.device_class().to_string(),
                })
            }
        };

        Ok(if unchanged {
            Decision::Drop
        } else {
            Decision::Keep
        })
    }
}

/// Integer part of a field value; fractional parts never count as change.
fn whole(value: f64) -> i64 {
    value.trunc() as i64
}

fn delta(new: f64, old: f64) -> i64 {
    whole(new) - whole(old)
}

fn within_band(delta: i64, band: i64) -> bool {
    -band < delta && delta < band
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};

    fn reading(measurement: Measurement) -> Reading {
        Reading::new(
            Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            measurement,
        )
    }

    fn distance(value: f64) -> Reading {
        reading(Measurement::Distance { distance: value })
    }

    fn basic(temperature: f64, humidity: f64) -> Reading {
        reading(Measurement::ClimateBasic {
            temperature,
            humidity,
        })
    }

    fn pressure(temperature: f64, pressure: f64) -> Reading {
        reading(Measurement::ClimatePressure {
            temperature,
            pressure,
        })
    }

    fn rain(rain: f64, temperature: f64, humidity: f64) -> Reading {
        reading(Measurement::ClimateRain {
            temperature,
            humidity,
            rain,
        })
    }

    #[test]
    fn first_reading_is_always_kept() {
        let filter = ChangeFilter::default();
        for candidate in [
            distance(0.0),
            rain(0.0, 0.0, 0.0),
            basic(20.0, 50.0),
            pressure(21.0, 1000.0),
        ] {
            assert_eq!(filter.should_keep(None, &candidate), Ok(Decision::Keep));
        }
    }

    #[test]
    fn distance_compares_decimeter_buckets() {
        let filter = ChangeFilter::default();
        assert_eq!(
            filter.should_keep(Some(&distance(104.0)), &distance(108.0)),
            Ok(Decision::Drop)
        );
        assert_eq!(
            filter.should_keep(Some(&distance(104.0)), &distance(115.0)),
            Ok(Decision::Keep)
        );
        assert_eq!(
            filter.should_keep(Some(&distance(109.0)), &distance(110.0)),
            Ok(Decision::Keep)
        );
    }

    #[test]
    fn negative_distances_floor_into_lower_bucket() {
        let filter = ChangeFilter::default();
        assert_eq!(
            filter.should_keep(Some(&distance(-5.0)), &distance(3.0)),
            Ok(Decision::Keep)
        );
        assert_eq!(
            filter.should_keep(Some(&distance(-5.0)), &distance(-9.0)),
            Ok(Decision::Drop)
        );
        assert_eq!(
            filter.should_keep(Some(&distance(-10.0)), &distance(-11.0)),
            Ok(Decision::Keep)
        );
    }

    #[test]
    fn climate_basic_uses_open_bands() {
        let filter = ChangeFilter::default();
        assert_eq!(
            filter.should_keep(Some(&basic(20.0, 50.0)), &basic(24.0, 55.0)),
            Ok(Decision::Drop)
        );
        assert_eq!(
            filter.should_keep(Some(&basic(20.0, 50.0)), &basic(26.0, 50.0)),
            Ok(Decision::Keep)
        );
        // band edges are outside the band
        assert_eq!(
            filter.should_keep(Some(&basic(20.0, 50.0)), &basic(15.0, 50.0)),
            Ok(Decision::Keep)
        );
        assert_eq!(
            filter.should_keep(Some(&basic(20.0, 50.0)), &basic(20.0, 60.0)),
            Ok(Decision::Keep)
        );
    }

    #[test]
    fn climate_rain_only_tracks_rain_counter() {
        let filter = ChangeFilter::default();
        assert_eq!(
            filter.should_keep(Some(&rain(2.0, 99.0, 99.0)), &rain(2.0, 1.0, 1.0)),
            Ok(Decision::Drop)
        );
        assert_eq!(
            filter.should_keep(Some(&rain(2.0, 20.0, 50.0)), &rain(3.0, 20.0, 50.0)),
            Ok(Decision::Keep)
        );
    }

    #[test]
    fn climate_pressure_uses_narrow_bands() {
        let filter = ChangeFilter::default();
        assert_eq!(
            filter.should_keep(Some(&pressure(21.0, 1000.0)), &pressure(22.0, 999.0)),
            Ok(Decision::Drop)
        );
        assert_eq!(
            filter.should_keep(Some(&pressure(21.0, 1000.0)), &pressure(21.0, 1002.0)),
            Ok(Decision::Keep)
        );
        assert_eq!(
            filter.should_keep(Some(&pressure(21.0, 1000.0)), &pressure(19.0, 1000.0)),
            Ok(Decision::Keep)
        );
    }

    #[test]
    fn fractional_parts_are_truncated_before_comparison() {
        let filter = ChangeFilter::default();
        // 21.9 -> 21, 23.1 -> 23: delta 2 is outside the pressure-class band
        assert_eq!(
            filter.should_keep(Some(&pressure(21.9, 1000.0)), &pressure(23.1, 1000.0)),
            Ok(Decision::Keep)
        );
        // 21.1 -> 21, 22.9 -> 22: delta 1 stays inside
        assert_eq!(
            filter.should_keep(Some(&pressure(21.1, 1000.0)), &pressure(22.9, 1000.0)),
            Ok(Decision::Drop)
        );
    }

    #[test]
    fn mismatched_stored_class_is_rejected() {
        let filter = ChangeFilter::default();
        let err = filter
            .should_keep(Some(&distance(100.0)), &basic(20.0, 50.0))
            .unwrap_err();
        assert!(matches!(
            err,
            FilterError::UnsupportedDeviceState { device_id: 2, .. }
        ));
    }

    #[test]
    fn custom_bands_widen_the_no_change_window() {
        let filter = ChangeFilter::new(FilterConfig {
            basic_temperature_band: 10,
            ..Default::default()
        });
        assert_eq!(
            filter.should_keep(Some(&basic(20.0, 50.0)), &basic(26.0, 50.0)),
            Ok(Decision::Drop)
        );
    }
}
