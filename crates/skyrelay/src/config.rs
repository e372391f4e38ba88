//! Configuration for the relay
//!
//! Loaded from TOML with serde defaults for everything except the watched
//! root and the Telegram credentials, which usually come from the command
//! line or the environment.

use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for the relay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Directory tree written by the imaging rig (often a network share)
    pub watched_root: PathBuf,

    /// Local archive mirroring the watched tree
    pub dest_root: PathBuf,

    /// Where JPEG previews are rendered before upload
    pub scratch_dir: PathBuf,

    /// Append-only list of already processed paths
    pub ledger_path: PathBuf,

    /// Telegram bot token
    pub bot_token: String,

    /// Telegram chat the previews are sent to
    pub chat_id: String,

    /// Seconds to sleep between scans
    pub interval_secs: u64,

    /// Ledger a FITS file even when its preview upload failed
    pub mark_processed_on_notify_failure: bool,

    /// File name prefixes of calibration frames that are never relayed
    pub calibration_prefixes: Vec<String>,

    /// Extensions (without dot, case-insensitive) treated as FITS
    pub scientific_extensions: Vec<String>,

    /// Extensions (without dot, case-insensitive) forwarded as-is
    pub preview_extensions: Vec<String>,

    /// What happens to rendered previews after upload
    pub preview_retention: PreviewRetention,

    /// JPEG quality, 1..=100
    pub jpeg_quality: u8,

    /// Send a text message when the service starts
    pub announce_startup: bool,

    pub telegram: TelegramConfig,
}

/// Retention policy for rendered previews in the scratch directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewRetention {
    /// Remove the preview once it was uploaded successfully
    #[default]
    DeleteAfterSend,
    /// Leave every preview in place
    Keep,
}

/// Telegram Bot API client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub api_base: String,
    pub request_timeout_secs: u64,
    /// Extra attempts after the first one for retryable failures
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_string(),
            request_timeout_secs: 60,
            max_retries: 2,
            retry_delay_ms: 2_000,
        }
    }
}

fn default_home() -> PathBuf {
    skyrelay_logging::skyrelay_home()
}

/// Default location of the config file: ~/.skyrelay/config.toml
pub fn default_config_path() -> PathBuf {
    default_home().join("config.toml")
}

impl Default for RelayConfig {
    fn default() -> Self {
        let home = default_home();
        Self {
            watched_root: PathBuf::new(),
            dest_root: home.join("archive"),
            scratch_dir: home.join("scratch"),
            ledger_path: home.join("sent.log"),
            bot_token: String::new(),
            chat_id: String::new(),
            interval_secs: 7 * 60,
            mark_processed_on_notify_failure: true,
            calibration_prefixes: vec!["Flat".to_string()],
            scientific_extensions: vec!["fit".to_string(), "fits".to_string(), "fts".to_string()],
            preview_extensions: vec!["jpg".to_string(), "jpeg".to_string()],
            preview_retention: PreviewRetention::default(),
            jpeg_quality: 90,
            announce_startup: false,
            telegram: TelegramConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML file, falling back to defaults if it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| RelayError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check the settings every command needs; `needs_notifier` adds the
    /// Telegram credentials.
    pub fn validate(&self, needs_notifier: bool) -> Result<()> {
        if self.watched_root.as_os_str().is_empty() {
            return Err(RelayError::Config("watched_root is not set".to_string()));
        }
        if self.interval_secs == 0 {
            return Err(RelayError::Config("interval_secs must be greater than 0".to_string()));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(RelayError::Config(format!(
                "jpeg_quality must be between 1 and 100, got {}",
                self.jpeg_quality
            )));
        }
        // Anything written under the watched root would be picked up by the next scan.
        for (name, path) in [
            ("dest_root", &self.dest_root),
            ("scratch_dir", &self.scratch_dir),
            ("ledger_path", &self.ledger_path),
        ] {
            if path.starts_with(&self.watched_root) {
                return Err(RelayError::Config(format!(
                    "{} '{}' must not be inside watched_root '{}'",
                    name,
                    path.display(),
                    self.watched_root.display()
                )));
            }
        }
        if needs_notifier {
            if self.bot_token.trim().is_empty() {
                return Err(RelayError::Config("bot_token is not set".to_string()));
            }
            if self.chat_id.trim().is_empty() {
                return Err(RelayError::Config("chat_id is not set".to_string()));
            }
        }
        Ok(())
    }
}
