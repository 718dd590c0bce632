use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::types::HistoryRecord;

/// Raised by `load` when stored history could not be used as-is.
/// The run continues, but the caller must surface it.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryWarning {
    /// File was not valid JSON. A copy is kept at `backup` when it could be written.
    Corrupt { reason: String, backup: Option<PathBuf> },
    /// Valid JSON, but not an array.
    NotAnArray { backup: Option<PathBuf> },
    /// Array elements that did not parse as records were dropped. `latest` is set when
    /// the last element was one of them, so there is no WoW baseline for this run.
    SkippedEntries { count: usize, latest: bool },
}

impl std::fmt::Display for HistoryWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backup_note = |b: &Option<PathBuf>| match b {
            Some(p) => format!(", copy kept at {}", p.display()),
            None => String::new(),
        };
        match self {
            HistoryWarning::Corrupt { reason, backup } => {
                write!(f, "history file is corrupt ({reason}); starting empty{}", backup_note(backup))
            }
            HistoryWarning::NotAnArray { backup } => {
                write!(f, "history file is not a JSON array; starting empty{}", backup_note(backup))
            }
            HistoryWarning::SkippedEntries { count, latest: false } => {
                write!(f, "dropped {count} unreadable history entries")
            }
            HistoryWarning::SkippedEntries { count, latest: true } => {
                write!(
                    f,
                    "dropped {count} unreadable history entries including the latest run; WoW unavailable"
                )
            }
        }
    }
}

/// Append-only, size-bounded run history persisted as a JSON array.
///
/// Single writer: at most one run may use a given file at a time. That is the
/// scheduler's job; the store does no locking.
pub struct HistoryStore {
    path: PathBuf,
    capacity: usize,
    records: VecDeque<HistoryRecord>,
    loaded: bool,
    /// Last stored element could not be read. Cleared by the next append.
    latest_unreadable: bool,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            path: path.into(),
            capacity: capacity.max(1),
            records: VecDeque::new(),
            loaded: false,
            latest_unreadable: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[cfg(test)]
    pub fn records(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.records.iter()
    }

    /// Read the persisted history, replacing anything in memory.
    ///
    /// Absent or blank file = empty history. Corrupt (including non-UTF-8) or non-array
    /// content = empty history plus a warning. Other I/O errors propagate.
    pub fn load(&mut self) -> Result<Option<HistoryWarning>> {
        self.records.clear();
        self.loaded = true;
        self.latest_unreadable = false;

        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("[HISTORY] no history at {}, starting empty", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let raw = match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => {
                let backup = self.keep_backup();
                return Ok(Some(HistoryWarning::Corrupt {
                    reason: e.to_string(),
                    backup,
                }));
            }
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }

        let value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                let backup = self.keep_backup();
                return Ok(Some(HistoryWarning::Corrupt {
                    reason: e.to_string(),
                    backup,
                }));
            }
        };
        let serde_json::Value::Array(items) = value else {
            let backup = self.keep_backup();
            return Ok(Some(HistoryWarning::NotAnArray { backup }));
        };

        let total = items.len();
        for (i, item) in items.into_iter().enumerate() {
            match serde_json::from_value::<HistoryRecord>(item) {
                Ok(record) => self.records.push_back(record),
                Err(e) => {
                    debug!("[HISTORY] skipping unreadable entry {i}: {e}");
                    self.latest_unreadable = i + 1 == total;
                }
            }
        }
        let skipped = total - self.records.len();

        info!("[HISTORY] loaded {} records from {}", self.records.len(), self.path.display());
        Ok((skipped > 0).then_some(HistoryWarning::SkippedEntries {
            count: skipped,
            latest: self.latest_unreadable,
        }))
    }

    /// The immediately preceding run: the WoW baseline. `None` when there is none or
    /// when the last stored entry could not be read.
    pub fn previous(&self) -> Option<&HistoryRecord> {
        if self.latest_unreadable {
            return None;
        }
        self.records.back()
    }

    /// Add a record at the end, evicting from the front past capacity, and persist.
    /// In-memory state only changes once the file has been replaced.
    pub fn append(&mut self, record: HistoryRecord) -> Result<()> {
        if !self.loaded {
            if let Some(w) = self.load()? {
                warn!("[HISTORY] {w}");
            }
        }

        let mut next = self.records.clone();
        next.push_back(record);
        while next.len() > self.capacity {
            next.pop_front();
        }

        self.persist(&next)?;
        self.records = next;
        self.latest_unreadable = false;
        Ok(())
    }

    /// Atomic replace: write a temp file next to the target, fsync, rename.
    fn persist(&self, records: &VecDeque<HistoryRecord>) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let mut body = serde_json::to_string_pretty(records)?;
        body.push('\n');

        let tmp_path = sibling(&self.path, "tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(body.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        debug!("[HISTORY] wrote {} records to {}", records.len(), self.path.display());
        Ok(())
    }

    fn keep_backup(&self) -> Option<PathBuf> {
        let backup = sibling(&self.path, "corrupt");
        match fs::copy(&self.path, &backup) {
            Ok(_) => Some(backup),
            Err(e) => {
                warn!("[HISTORY] could not back up {}: {e}", self.path.display());
                None
            }
        }
    }
}

/// `data/weekly_history.json` + `tmp` -> `data/weekly_history.json.tmp`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}
