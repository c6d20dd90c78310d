use anyhow::Context;
use sensorcore::prelude::{FrameSource, SourceError};
use sensorcore::protocol::{CapturedFrame, RawFrame};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Reads one decimal frame per line from the serial device.
///
/// The device is opened as a plain file; line discipline and baud rate are
/// left to the OS (e.g. `stty -F /dev/ttyUSB0 9600 raw`).
pub struct LineFrameSource<R> {
    reader: R,
    name: String,
    line: String,
}

impl LineFrameSource<Box<dyn BufRead + Send>> {
    /// Opens a serial device path, or stdin for `-`.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let name = path.display().to_string();
        let reader: Box<dyn BufRead + Send> = if name == "-" {
            Box::new(BufReader::new(io::stdin()))
        } else {
            let file =
                File::open(path).with_context(|| format!("opening serial port {}", name))?;
            Box::new(BufReader::new(file))
        };
        Ok(Self::new(reader, name))
    }
}

impl<R: BufRead> LineFrameSource<R> {
    pub fn new(reader: R, name: impl Into<String>) -> Self {
        Self {
            reader,
            name: name.into(),
            line: String::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<R: BufRead> FrameSource for LineFrameSource<R> {
    fn next_frame(&mut self) -> Result<CapturedFrame, SourceError> {
        self.line.clear();
        let read = self
            .reader
            .read_line(&mut self.line)
            .map_err(|err| match err.kind() {
                io::ErrorKind::InvalidData => SourceError::Malformed(err.to_string()),
                _ => SourceError::Io(format!("{}: {}", self.name, err)),
            })?;
        if read == 0 {
            return Err(SourceError::Disconnected(self.name.clone()));
        }
        log::debug!("{}: {:?}", self.name, self.line);
        let raw: RawFrame = self.line.parse()?;
        Ok(CapturedFrame::now(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_one_frame_per_line_until_eof() {
        let mut source = LineFrameSource::new(Cursor::new("401850368\r\nnoise\n0x0ABC0000\n"), "test");

        assert_eq!(source.next_frame().unwrap().raw, RawFrame(401_850_368));
        assert!(matches!(source.next_frame(), Err(SourceError::Malformed(_))));
        assert_eq!(source.next_frame().unwrap().raw, RawFrame(0x0ABC_0000));
        assert!(matches!(
            source.next_frame(),
            Err(SourceError::Disconnected(name)) if name == "test"
        ));
    }

    #[test]
    fn invalid_utf8_is_a_malformed_frame() {
        let mut source = LineFrameSource::new(Cursor::new(b"\xff\xfe\n12\n".to_vec()), "test");
        assert!(matches!(source.next_frame(), Err(SourceError::Malformed(_))));
    }
}
