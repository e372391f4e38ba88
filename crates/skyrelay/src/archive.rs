//! Archive copies of source frames
//!
//! The destination tree mirrors the watched tree: `root/a/b.fit` lands at
//! `dest/a/b.fit`. Access and modification times are carried over so the
//! archive sorts the same way the share does.

use crate::error::{RelayError, Result};
use filetime::FileTime;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Archiver {
    watched_root: PathBuf,
    dest_root: PathBuf,
}

impl Archiver {
    pub fn new(watched_root: impl Into<PathBuf>, dest_root: impl Into<PathBuf>) -> Self {
        Self {
            watched_root: watched_root.into(),
            dest_root: dest_root.into(),
        }
    }

    /// Destination of `source` inside the archive.
    pub fn destination_for(&self, source: &Path) -> Result<PathBuf> {
        let relative = source
            .strip_prefix(&self.watched_root)
            .map_err(|_| RelayError::OutsideRoot {
                path: source.to_path_buf(),
                root: self.watched_root.clone(),
            })?;
        Ok(self.dest_root.join(relative))
    }

    /// Copy `source` into the archive and return where it was written.
    pub fn archive(&self, source: &Path) -> Result<PathBuf> {
        let destination = self.destination_for(source)?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::copy(source, &destination)?;

        let metadata = fs::metadata(source)?;
        filetime::set_file_times(
            &destination,
            FileTime::from_last_access_time(&metadata),
            FileTime::from_last_modification_time(&metadata),
        )?;

        Ok(destination)
    }
}
