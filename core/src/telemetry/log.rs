use log::{debug, error, info, warn};

/// Component-tagged logging port handed to each pipeline part.
#[derive(Debug, Clone)]
pub struct LogManager {
    component: &'static str,
}

impl LogManager {
    pub fn new(component: &'static str) -> Self {
        Self { component }
    }

    /// Same sink, different component tag.
    pub fn scoped(&self, component: &'static str) -> Self {
        Self { component }
    }

    pub fn debug(&self, message: &str) {
        debug!(target: self.component, "{}", message);
    }

    pub fn record(&self, message: &str) {
        info!(target: self.component, "{}", message);
    }

    pub fn warn(&self, message: &str) {
        warn!(target: self.component, "{}", message);
    }

    pub fn error(&self, message: &str) {
        error!(target: self.component, "{}", message);
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new("sensorcore")
    }
}
