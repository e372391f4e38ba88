//! SkyRelay - imaging share → Telegram relay
//!
//! Polls the directory an imaging rig writes to, turns new FITS frames into
//! JPEG previews, posts them to a Telegram chat and keeps an archive copy of
//! every original.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Watched     │     │   Relay     │     │  Preview    │     │  Notifier   │
//! │ root (SMB)  │────▶│ (scan loop) │────▶│ (FITS→JPEG) │────▶│ (Telegram)  │
//! └─────────────┘     └──────┬──────┘     └─────────────┘     └─────────────┘
//!                            │
//!                ┌───────────┴───────────┐
//!                ▼                       ▼
//!         ┌─────────────┐         ┌─────────────┐
//!         │  Archiver   │         │   Ledger    │
//!         │ (mirror)    │         │ (sent.log)  │
//!         └─────────────┘         └─────────────┘
//! ```
//!
//! Delivery is at-least-once: the ledger is appended after the work for a
//! file is done, so a crash in between repeats that file on the next scan.

pub mod archive;
pub mod cancel;
pub mod config;
pub mod error;
pub mod fits;
pub mod ledger;
pub mod notify;
pub mod preview;
pub mod relay;

// Re-exports for convenience
pub use archive::Archiver;
pub use cancel::CancellationToken;
pub use config::{PreviewRetention, RelayConfig, TelegramConfig};
pub use error::{RelayError, Result};
pub use ledger::{Ledger, LedgerSnapshot};
pub use notify::{Notifier, Outgoing, TelegramNotifier};
pub use preview::PreviewRenderer;
pub use relay::{CycleReport, FileKind, Relay};
