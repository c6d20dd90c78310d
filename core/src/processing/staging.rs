use crate::prelude::FrameId;
use crate::protocol::Reading;

/// Readings waiting for the next sink flush, plus the source frames the
/// flush will acknowledge.
#[derive(Debug, Default)]
pub struct StagedBatch {
    readings: Vec<Reading>,
    acknowledgements: Vec<FrameId>,
}

impl StagedBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a reading; insertion order is the flush order.
    pub fn stage(&mut self, reading: Reading) {
        self.readings.push(reading);
    }

    /// Marks a source frame as consumed once the batch is flushed. Ids are
    /// recorded once even if the same frame is seen again after a failed
    /// flush.
    pub fn acknowledge(&mut self, id: FrameId) {
        if !self.acknowledgements.contains(&id) {
            self.acknowledgements.push(id);
        }
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn acknowledgements(&self) -> &[FrameId] {
        &self.acknowledgements
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Drops the oldest readings until at most `limit` remain. Returns how
    /// many were dropped.
    pub fn evict_oldest(&mut self, limit: usize) -> usize {
        let excess = self.readings.len().saturating_sub(limit);
        self.readings.drain(..excess);
        excess
    }

    /// Empties the batch, handing back the acknowledged frame ids.
    pub fn clear(&mut self) -> Vec<FrameId> {
        self.readings.clear();
        std::mem::take(&mut self.acknowledgements)
    }
}
