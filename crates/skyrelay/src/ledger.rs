//! Delivery ledger
//!
//! A plain-text, append-only file with one processed path per line. The file
//! is read once per scan cycle into a [`LedgerSnapshot`]; entries are never
//! removed. There is no transaction around "act then append", so a crash in
//! between redelivers the file on the next cycle.

use crate::error::Result;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Handle to the ledger file on disk.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

/// In-memory view of the ledger taken at the start of a cycle.
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    entries: HashSet<String>,
}

impl LedgerSnapshot {
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains(ledger_key(path).as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// String form under which a path is recorded.
pub fn ledger_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every recorded path. A missing file means nothing was processed yet.
    pub fn load(&self) -> Result<LedgerSnapshot> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(LedgerSnapshot::default());
            }
            Err(e) => return Err(e.into()),
        };

        let mut entries = HashSet::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if !line.is_empty() {
                entries.insert(line);
            }
        }
        Ok(LedgerSnapshot { entries })
    }

    /// Append `path` to the ledger, creating the file if needed.
    pub fn mark_processed(&self, path: &Path) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", ledger_key(path))?;
        Ok(())
    }
}
