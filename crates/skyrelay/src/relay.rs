//! Polling relay loop
//!
//! Polling instead of filesystem notifications because the watched root is
//! usually an SMB share, where inotify-style events are not delivered.
//!
//! # Cycle
//!
//! - Load the ledger snapshot once
//! - Walk the watched root (sorted, symlinks not followed)
//! - Per file: skip calibration frames, forward ready-made previews, or
//!   render + send + archive FITS frames, then record them in the ledger
//! - Sleep `interval_secs`, waking early on cancellation

use crate::archive::Archiver;
use crate::cancel::CancellationToken;
use crate::config::{PreviewRetention, RelayConfig};
use crate::error::Result;
use crate::ledger::{Ledger, LedgerSnapshot};
use crate::notify::{Notifier, Outgoing};
use crate::preview::PreviewRenderer;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// How a file under the watched root is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Name starts with a calibration prefix; never relayed.
    Calibration,
    /// Already a viewable image; forwarded as-is.
    Preview,
    /// FITS frame; rendered, forwarded and archived.
    Scientific,
    Other,
}

/// Counters for one scan cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub files_seen: u64,
    pub calibration_skipped: u64,
    pub already_processed: u64,
    pub unrecognized: u64,
    pub previews_forwarded: u64,
    pub converted: u64,
    pub conversion_failed: u64,
    pub previews_sent: u64,
    pub notify_failed: u64,
    pub archived: u64,
    pub archive_failed: u64,
    pub marked_processed: u64,
    pub walk_errors: u64,
    /// The cycle stopped early because cancellation was requested.
    pub cancelled: bool,
}

impl CycleReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            duration_ms: 0,
            files_seen: 0,
            calibration_skipped: 0,
            already_processed: 0,
            unrecognized: 0,
            previews_forwarded: 0,
            converted: 0,
            conversion_failed: 0,
            previews_sent: 0,
            notify_failed: 0,
            archived: 0,
            archive_failed: 0,
            marked_processed: 0,
            walk_errors: 0,
            cancelled: false,
        }
    }

    /// Whether the cycle called the notifier at all.
    pub fn notified_anything(&self) -> bool {
        self.previews_forwarded + self.previews_sent + self.notify_failed > 0
    }
}

/// The relay service: ledger, renderer, archiver and notifier driven by one loop.
pub struct Relay<N: Notifier> {
    config: RelayConfig,
    ledger: Ledger,
    renderer: PreviewRenderer,
    archiver: Archiver,
    notifier: N,
}

impl<N: Notifier> Relay<N> {
    pub fn new(config: RelayConfig, notifier: N) -> Self {
        let ledger = Ledger::new(&config.ledger_path);
        let renderer = PreviewRenderer::new(&config.scratch_dir, config.jpeg_quality);
        let archiver = Archiver::new(&config.watched_root, &config.dest_root);
        Self {
            config,
            ledger,
            renderer,
            archiver,
            notifier,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Create the scratch directory, the archive root and the ledger's parent.
    pub fn prepare(&self) -> Result<()> {
        fs::create_dir_all(&self.config.scratch_dir)?;
        fs::create_dir_all(&self.config.dest_root)?;
        if let Some(parent) = self.config.ledger_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    pub fn classify(&self, path: &Path) -> FileKind {
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy(),
            None => return FileKind::Other,
        };
        if self
            .config
            .calibration_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && name.starts_with(prefix.as_str()))
        {
            return FileKind::Calibration;
        }

        let ext = match path.extension() {
            Some(ext) => ext.to_string_lossy(),
            None => return FileKind::Other,
        };
        let listed = |list: &[String]| list.iter().any(|e| e.eq_ignore_ascii_case(&ext));
        if listed(&self.config.preview_extensions) {
            FileKind::Preview
        } else if listed(&self.config.scientific_extensions) {
            FileKind::Scientific
        } else {
            FileKind::Other
        }
    }

    /// Run scan cycles until `cancel` fires. Returns the number of completed cycles.
    ///
    /// A failing cycle (unreadable or unwritable ledger) is logged and retried
    /// after the normal interval.
    pub fn run(&self, cancel: &CancellationToken) -> u64 {
        info!(
            watched_root = %self.config.watched_root.display(),
            dest_root = %self.config.dest_root.display(),
            interval_secs = self.config.interval_secs,
            "Relay started"
        );
        if self.config.announce_startup {
            self.announce_startup();
        }

        let interval = Duration::from_secs(self.config.interval_secs);
        let mut cycles = 0;
        while !cancel.is_cancelled() {
            match self.run_cycle(cancel) {
                Ok(report) if report.cancelled => break,
                Ok(_) => cycles += 1,
                Err(e) => error!(error = %e, "Scan cycle failed"),
            }
            debug!(interval_secs = self.config.interval_secs, "Sleeping until next scan");
            if !cancel.sleep(interval) {
                break;
            }
        }

        info!(cycles, "Relay stopped");
        cycles
    }

    fn announce_startup(&self) {
        let text = format!(
            "SkyRelay started at {}, watching {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
            self.config.watched_root.display()
        );
        if let Err(e) = self.notifier.send(Outgoing::Text(&text)) {
            warn!(error = %e, "Startup announcement failed");
        }
    }

    /// One pass over the watched root.
    pub fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleReport> {
        let start = Instant::now();
        let mut report = CycleReport::new(Utc::now());
        let snapshot = self.ledger.load()?;
        let root = &self.config.watched_root;

        info!(
            watched_root = %root.display(),
            processed = snapshot.len(),
            "Starting scan"
        );

        if !root.is_dir() {
            warn!(watched_root = %root.display(), "Watched root is unavailable, skipping scan");
            report.duration_ms = start.elapsed().as_millis() as u64;
            return Ok(report);
        }

        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable entry");
                    report.walk_errors += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            report.files_seen += 1;
            self.process_file(entry.path(), &snapshot, &mut report)?;
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            seen = report.files_seen,
            forwarded = report.previews_forwarded,
            converted = report.converted,
            sent = report.previews_sent,
            archived = report.archived,
            skipped_calibration = report.calibration_skipped,
            already_processed = report.already_processed,
            failures = report.conversion_failed + report.notify_failed + report.archive_failed,
            duration_ms = report.duration_ms,
            "Scan complete"
        );
        Ok(report)
    }

    fn process_file(
        &self,
        path: &Path,
        snapshot: &LedgerSnapshot,
        report: &mut CycleReport,
    ) -> Result<()> {
        match self.classify(path) {
            FileKind::Calibration => {
                debug!(path = %path.display(), "Ignoring calibration frame");
                report.calibration_skipped += 1;
                Ok(())
            }
            FileKind::Other => {
                report.unrecognized += 1;
                Ok(())
            }
            _ if snapshot.contains(path) => {
                report.already_processed += 1;
                Ok(())
            }
            FileKind::Preview => self.forward_preview(path, report),
            FileKind::Scientific => self.relay_frame(path, report),
        }
    }

    /// Send an existing preview; only a delivered preview is recorded.
    fn forward_preview(&self, path: &Path, report: &mut CycleReport) -> Result<()> {
        match self.notifier.send(Outgoing::Document(path)) {
            Ok(()) => {
                info!(path = %path.display(), "Forwarded preview");
                report.previews_forwarded += 1;
                self.mark(path, report)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to forward preview");
                report.notify_failed += 1;
                Ok(())
            }
        }
    }

    /// Render, send and archive a FITS frame.
    fn relay_frame(&self, path: &Path, report: &mut CycleReport) -> Result<()> {
        let preview = match self.renderer.render(path) {
            Ok(preview) => {
                info!(path = %path.display(), preview = %preview.display(), "Converted frame");
                report.converted += 1;
                Some(preview)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Conversion failed, not notifying");
                report.conversion_failed += 1;
                None
            }
        };

        let mut send_failed = false;
        if let Some(preview) = preview {
            match self.notifier.send(Outgoing::Document(&preview)) {
                Ok(()) => {
                    report.previews_sent += 1;
                    self.apply_retention(&preview);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to send preview");
                    report.notify_failed += 1;
                    send_failed = true;
                }
            }
        }

        match self.archiver.archive(path) {
            Ok(destination) => {
                info!(
                    path = %path.display(),
                    destination = %destination.display(),
                    "Archived frame"
                );
                report.archived += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Archive copy failed");
                report.archive_failed += 1;
            }
        }

        if send_failed && !self.config.mark_processed_on_notify_failure {
            info!(path = %path.display(), "Leaving frame unrecorded for the next scan");
            return Ok(());
        }
        self.mark(path, report)
    }

    fn apply_retention(&self, preview: &Path) {
        if self.config.preview_retention != PreviewRetention::DeleteAfterSend {
            return;
        }
        if let Err(e) = fs::remove_file(preview) {
            warn!(preview = %preview.display(), error = %e, "Failed to remove sent preview");
        }
    }

    fn mark(&self, path: &Path, report: &mut CycleReport) -> Result<()> {
        self.ledger.mark_processed(path)?;
        report.marked_processed += 1;
        Ok(())
    }
}
