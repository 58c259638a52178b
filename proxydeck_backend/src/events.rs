use crate::settings::SettingsService;
use crate::utils::timestamp_with_offset;
use anyhow::{anyhow, Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// How many trailing log lines the API and the logs page expose.
pub const EVENT_TAIL_LIMIT: usize = 100;

/// Append-only operator event log, one timestamped line per entry.
///
/// Timestamps are rendered in the timezone configured at the moment of the
/// append, so changing the timezone only affects subsequent entries.
#[derive(Clone)]
pub struct EventLog {
    path: PathBuf,
    settings: SettingsService,
    write_lock: Arc<Mutex<()>>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>, settings: SettingsService) -> Self {
        Self {
            path: path.into(),
            settings,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Appends one line to the log. Failures are reported through tracing
    /// and swallowed; a broken log file must not fail the mutation that
    /// produced the event.
    pub fn append(&self, message: &str) {
        if let Err(err) = self.try_append(message) {
            tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "failed to append event"
            );
        }
    }

    fn try_append(&self, message: &str) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("event log mutex poisoned"))?;

        let stamp = timestamp_with_offset(self.settings.timezone());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        file.write_all(format!("{stamp} | {message}\n").as_bytes())
            .with_context(|| format!("failed to write {}", self.path.display()))
    }

    /// The last `limit` lines in file order, oldest first. A missing or
    /// unreadable log yields an empty history.
    pub fn tail(&self, limit: usize) -> Vec<String> {
        let Ok(contents) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        let lines: Vec<&str> = contents.lines().collect();
        let skip = lines.len().saturating_sub(limit);
        lines[skip..].iter().map(|line| line.to_string()).collect()
    }
}
