//! Error types for the relay

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Relay error type
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("FITS error in {path}: {message}")]
    Fits { path: PathBuf, message: String },

    #[error("No image data in {0}")]
    NoData(PathBuf),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Chat API returned {status}: {description}")]
    ChatApi { status: u16, description: String },

    #[error("Path '{path}' is not under watched root '{root}'")]
    OutsideRoot { path: PathBuf, root: PathBuf },
}

impl RelayError {
    pub(crate) fn fits(path: &std::path::Path, message: impl Into<String>) -> Self {
        RelayError::Fits {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, RelayError>;
