use anyhow::Context;
use chrono::{DateTime, Local};
use sensorcore::prelude::{FrameId, PendingFrame, PendingFrameSource, SourceError};
use sensorcore::protocol::{CapturedFrame, RawFrame};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// On-disk form of one spooled frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpooledFrame {
    pub frame: RawFrame,
    pub captured_at: DateTime<Local>,
}

/// Directory of frames captured by the serial reader and not yet uploaded.
/// File names sort in capture order; dot-files are writes in progress.
pub struct SpoolDirectory {
    dir: PathBuf,
    sequence: AtomicU64,
}

impl SpoolDirectory {
    pub fn open<P: AsRef<Path>>(dir: P) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating spool directory {}", dir.display()))?;
        Ok(Self {
            dir,
            sequence: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes a frame as a new pending file and returns its path.
    pub fn write(&self, frame: &CapturedFrame) -> anyhow::Result<PathBuf> {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let nanos = frame.captured_at.timestamp_nanos_opt().unwrap_or_default();
        let name = format!("{:020}-{:06}-{:010}.json", nanos, std::process::id(), seq);
        let path = self.dir.join(&name);
        let staging = self.dir.join(format!(".{}", name));

        let record = SpooledFrame {
            frame: frame.raw,
            captured_at: frame.captured_at,
        };
        let body = serde_json::to_string_pretty(&record)?;
        fs::write(&staging, body).with_context(|| format!("writing {}", staging.display()))?;
        fs::rename(&staging, &path).with_context(|| format!("publishing {}", path.display()))?;
        Ok(path)
    }

    fn read_entry(path: &Path) -> Result<CapturedFrame, SourceError> {
        let contents = fs::read_to_string(path)
            .map_err(|err| SourceError::Malformed(format!("{}: {}", path.display(), err)))?;
        let record: SpooledFrame = serde_json::from_str(&contents)
            .map_err(|err| SourceError::Malformed(format!("{}: {}", path.display(), err)))?;
        Ok(CapturedFrame::new(record.frame, record.captured_at))
    }
}

impl PendingFrameSource for SpoolDirectory {
    fn list_pending(&mut self) -> Result<Vec<PendingFrame>, SourceError> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|err| SourceError::Io(format!("{}: {}", self.dir.display(), err)))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| SourceError::Io(err.to_string()))?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_file && !name.starts_with('.') {
                names.push(name);
            }
        }
        names.sort();

        Ok(names
            .into_iter()
            .map(|name| {
                let frame = Self::read_entry(&self.dir.join(&name));
                PendingFrame { id: name, frame }
            })
            .collect())
    }

    fn remove(&mut self, id: &FrameId) -> Result<(), SourceError> {
        let path = self.dir.join(id);
        fs::remove_file(&path)
            .map_err(|err| SourceError::Io(format!("removing {}: {}", path.display(), err)))?;
        log::debug!("deleted {}", path.display());
        Ok(())
    }
}
