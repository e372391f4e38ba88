//! Shared fixtures for relay integration tests

#![allow(dead_code)]

use skyrelay::{Notifier, Outgoing, RelayConfig, RelayError, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// What the fake chat received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text(String),
    Document(PathBuf),
}

/// Notifier that records calls instead of talking to Telegram.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Sent>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, message: Outgoing<'_>) -> Result<()> {
        let record = match message {
            Outgoing::Text(text) => Sent::Text(text.to_string()),
            Outgoing::Document(path) => Sent::Document(path.to_path_buf()),
        };
        self.sent.lock().unwrap().push(record);
        if *self.failing.lock().unwrap() {
            return Err(RelayError::ChatApi {
                status: 503,
                description: "Service Unavailable".to_string(),
            });
        }
        Ok(())
    }
}

/// Temp directories laid out like a real deployment.
pub struct TestEnv {
    /// Temp directory (cleaned up on drop)
    _temp: TempDir,
    pub watched_root: PathBuf,
    pub dest_root: PathBuf,
    pub scratch_dir: PathBuf,
    pub ledger_path: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let watched_root = temp.path().join("share");
        fs::create_dir_all(&watched_root).expect("Failed to create watched root");
        Self {
            watched_root,
            dest_root: temp.path().join("archive"),
            scratch_dir: temp.path().join("scratch"),
            ledger_path: temp.path().join("state").join("sent.log"),
            _temp: temp,
        }
    }

    pub fn config(&self) -> RelayConfig {
        RelayConfig {
            watched_root: self.watched_root.clone(),
            dest_root: self.dest_root.clone(),
            scratch_dir: self.scratch_dir.clone(),
            ledger_path: self.ledger_path.clone(),
            bot_token: "123:abc".to_string(),
            chat_id: "42".to_string(),
            interval_secs: 1,
            ..RelayConfig::default()
        }
    }

    pub fn write_file(&self, rel: &str, bytes: &[u8]) -> PathBuf {
        let path = self.watched_root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        fs::write(&path, bytes).expect("Failed to write file");
        path
    }

    /// Write a 16-bit FITS frame with a horizontal gradient.
    pub fn write_fits(&self, rel: &str, width: usize, height: usize) -> PathBuf {
        let values: Vec<i16> = (0..width * height)
            .map(|i| ((i % width) * 100) as i16)
            .collect();
        self.write_file(rel, &fits_i16(width, height, &values))
    }
}

/// Encode a 16-bit primary HDU.
pub fn fits_i16(width: usize, height: usize, values: &[i16]) -> Vec<u8> {
    let cards = [
        "SIMPLE  =                    T / conforms to FITS standard".to_string(),
        "BITPIX  =                   16".to_string(),
        "NAXIS   =                    2".to_string(),
        format!("NAXIS1  = {:>20}", width),
        format!("NAXIS2  = {:>20}", height),
        "OBJECT  = 'M 31    '".to_string(),
        "END".to_string(),
    ];

    let mut out = Vec::new();
    for card in &cards {
        let mut line = card.as_bytes().to_vec();
        line.resize(80, b' ');
        out.extend_from_slice(&line);
    }
    pad_to_block(&mut out, b' ');
    for v in values {
        out.extend_from_slice(&v.to_be_bytes());
    }
    pad_to_block(&mut out, 0);
    out
}

fn pad_to_block(buf: &mut Vec<u8>, fill: u8) {
    let rem = buf.len() % 2880;
    if rem != 0 {
        buf.resize(buf.len() + 2880 - rem, fill);
    }
}
