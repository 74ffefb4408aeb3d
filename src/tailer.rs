/// Incremental log tailing: track a byte offset into the current day's log
/// file, read only newly appended bytes, and classify them line by line.
///
/// Each observer owns its own `LogTailer`; no tail state is shared across
/// connections.
use crate::classify::{classify, LogEvent};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// On first attachment only the trailing lines are replayed, so a new
/// observer is not flooded with the whole day's history.
pub const ATTACH_REPLAY_LINES: usize = 50;

/// Today's log file path. The gateway rotates by date: `openclaw-YYYY-MM-DD.log`.
pub fn log_file_path(log_dir: &Path) -> PathBuf {
    let today = chrono::Utc::now().format("%Y-%m-%d");
    log_dir.join(format!("openclaw-{today}.log"))
}

pub struct LogTailer {
    log_dir: PathBuf,
    path: PathBuf,
    offset: u64,
}

impl LogTailer {
    pub fn new(log_dir: PathBuf) -> Self {
        let path = log_file_path(&log_dir);
        Self {
            log_dir,
            path,
            offset: 0,
        }
    }

    /// First attachment: read the entire current file, set the offset to its
    /// full size, and return only the last `ATTACH_REPLAY_LINES` non-blank
    /// lines classified. Missing file → no events, offset stays 0.
    pub fn attach(&mut self) -> Vec<LogEvent> {
        self.path = log_file_path(&self.log_dir);
        self.attach_file()
    }

    fn attach_file(&mut self) -> Vec<LogEvent> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(_) => {
                self.offset = 0;
                return Vec::new();
            }
        };
        self.offset = bytes.len() as u64;

        let text = String::from_utf8_lossy(&bytes);
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let skip = lines.len().saturating_sub(ATTACH_REPLAY_LINES);
        lines[skip..].iter().map(|l| classify(l)).collect()
    }

    /// One poll: recompute today's path (a date rollover resets the offset),
    /// then classify whatever was appended since the last read.
    pub fn poll(&mut self) -> Vec<LogEvent> {
        let current = log_file_path(&self.log_dir);
        self.poll_file(&current)
    }

    fn poll_file(&mut self, current: &Path) -> Vec<LogEvent> {
        if current != self.path {
            tracing::debug!(path = %current.display(), "log rotated to a new file");
            self.path = current.to_path_buf();
            self.offset = 0;
        }

        let size = match std::fs::metadata(&self.path) {
            Ok(m) => m.len(),
            Err(_) => return Vec::new(), // no log yet today
        };

        if size < self.offset {
            // Shrink with an unchanged path: treat as an in-place rotation
            // and re-adopt the file from its start.
            tracing::debug!(path = %self.path.display(), size, offset = self.offset, "log file shrank; resetting offset");
            self.offset = 0;
        }
        if size == self.offset {
            return Vec::new();
        }

        let buf = match self.read_range(size) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to read log delta");
                return Vec::new();
            }
        };
        self.offset += buf.len() as u64;

        let text = String::from_utf8_lossy(&buf);
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(classify)
            .collect()
    }

    /// Read the byte range `[offset, size)` of the current file.
    fn read_range(&self, size: u64) -> std::io::Result<Vec<u8>> {
        let mut file = std::fs::File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.offset))?;
        let mut buf = Vec::with_capacity((size - self.offset) as usize);
        file.take(size - self.offset).read_to_end(&mut buf)?;
        Ok(buf)
    }
}
