//! Append-only command history file.
//!
//! A flat file rather than a queryable database: a query DSL over a
//! retrieval store is a separate concern from this pipeline, so history
//! here only needs to support append and tail.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub struct History {
    path: PathBuf,
}

impl History {
    pub fn new(path: impl Into<PathBuf>) -> History {
        History { path: path.into() }
    }

    pub fn open_default() -> History {
        History::new(crate::conduit_dir().join(crate::HISTORY_FILE))
    }

    /// Append one entry. `exit_code` is `None` for lines that never ran
    /// (e.g. control commands).
    pub fn append(&self, line: &str, exit_code: Option<i32>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let code = exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        // Tabs and newlines can't appear in a single shell line we were
        // handed, but be defensive about literal tabs a user typed.
        let sanitized = line.replace('\t', " ");

        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .with_context(|| format!("opening history file {}", self.path.display()))?;
        writeln!(f, "{ts}\t{code}\t{sanitized}")?;
        Ok(())
    }

    /// Last `n` entries, most recent last (matches `less`/`tail`
    /// expectations for a scrollback-style history view).
    pub fn tail(&self, n: usize) -> Result<Vec<HistoryEntry>> {
        let f = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context(format!("opening {}", self.path.display())),
        };
        let reader = std::io::BufReader::new(f);
        let mut all = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if let Some(entry) = HistoryEntry::parse(&line) {
                all.push(entry);
            }
        }
        let start = all.len().saturating_sub(n);
        Ok(all.split_off(start))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub timestamp: u64,
    pub exit_code: Option<i32>,
    pub line: String,
}

impl HistoryEntry {
    fn parse(raw: &str) -> Option<HistoryEntry> {
        let mut parts = raw.splitn(3, '\t');
        let timestamp = parts.next()?.parse().ok()?;
        let exit_code = match parts.next()? {
            "-" => None,
            s => s.parse().ok(),
        };
        let line = parts.next()?.to_string();
        Some(HistoryEntry {
            timestamp,
            exit_code,
            line,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_tail_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let hist = History::new(dir.path().join("history.log"));
        hist.append("ls -la", Some(0)).unwrap();
        hist.append(": status", None).unwrap();
        hist.append("git push", Some(1)).unwrap();

        let tail = hist.tail(2).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].line, ": status");
        assert_eq!(tail[0].exit_code, None);
        assert_eq!(tail[1].line, "git push");
        assert_eq!(tail[1].exit_code, Some(1));
    }

    #[test]
    fn tail_on_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let hist = History::new(dir.path().join("nope.log"));
        assert!(hist.tail(10).unwrap().is_empty());
    }
}
