use crate::prelude::FilterError;
use crate::processing::filter::{ChangeFilter, Decision};
use crate::protocol::{DeviceId, Reading};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Most recently kept reading per device.
///
/// Decisions run under a single lock so two pipelines sharing the state
/// cannot interleave a read-modify-write for the same device.
#[derive(Debug, Default)]
pub struct LastSeenState {
    entries: Mutex<HashMap<DeviceId, Reading>>,
}

impl LastSeenState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a state pre-populated from earlier snapshots. Later readings
    /// for the same device overwrite earlier ones.
    pub fn seeded<I>(readings: I) -> Self
    where
        I: IntoIterator<Item = (DeviceId, Reading)>,
    {
        let state = Self::new();
        for (device_id, reading) in readings {
            state.seed(device_id, reading);
        }
        state
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<DeviceId, Reading>> {
        // Entries are replaced whole, so a poisoned map is still consistent.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Overwrites the entry for `device_id` without filtering.
    pub fn seed(&self, device_id: DeviceId, reading: Reading) {
        self.lock().insert(device_id, reading);
    }

    /// Filters `candidate` against its device's entry and, on keep, replaces
    /// the entry. On error the state is left untouched.
    pub fn decide(&self, filter: &ChangeFilter, candidate: &Reading) -> Result<Decision, FilterError> {
        let device_id = candidate.device_id();
        let mut entries = self.lock();
        let decision = filter.should_keep(entries.get(&device_id), candidate)?;
        if decision == Decision::Keep {
            entries.insert(device_id, candidate.clone());
        }
        Ok(decision)
    }

    pub fn get(&self, device_id: DeviceId) -> Option<Reading> {
        self.lock().get(&device_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Measurement;
    use chrono::{Local, TimeZone};
    use std::sync::Arc;
    use std::thread;

    fn basic(temperature: f64, humidity: f64) -> Reading {
        Reading::new(
            Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            Measurement::ClimateBasic {
                temperature,
                humidity,
            },
        )
    }

    #[test]
    fn keep_replaces_entry_and_drop_leaves_it() {
        let state = LastSeenState::new();
        let filter = ChangeFilter::default();

        assert_eq!(state.decide(&filter, &basic(20.0, 50.0)), Ok(Decision::Keep));
        assert_eq!(state.decide(&filter, &basic(22.0, 52.0)), Ok(Decision::Drop));
        assert_eq!(state.get(2), Some(basic(20.0, 50.0)));

        assert_eq!(state.decide(&filter, &basic(30.0, 50.0)), Ok(Decision::Keep));
        assert_eq!(state.get(2), Some(basic(30.0, 50.0)));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn filter_error_leaves_state_untouched() {
        let stale = Reading::new(
            Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            Measurement::Distance { distance: 40.0 },
        );
        let state = LastSeenState::seeded([(2, stale.clone())]);
        let filter = ChangeFilter::default();

        assert!(state.decide(&filter, &basic(20.0, 50.0)).is_err());
        assert_eq!(state.get(2), Some(stale));
    }

    #[test]
    fn concurrent_decisions_for_one_device_keep_once() {
        let state = Arc::new(LastSeenState::new());
        let filter = ChangeFilter::default();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = Arc::clone(&state);
                let filter = filter.clone();
                thread::spawn(move || state.decide(&filter, &basic(20.0, 50.0)).unwrap())
            })
            .collect();

        let kept = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|decision| *decision == Decision::Keep)
            .count();
        assert_eq!(kept, 1);
    }
}
