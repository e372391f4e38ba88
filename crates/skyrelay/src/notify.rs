//! Chat notifications
//!
//! [`Notifier`] is the seam between the relay loop and the chat service.
//! [`TelegramNotifier`] talks to the Telegram Bot API with a bounded request
//! timeout and a small retry budget for transient failures.

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use reqwest::blocking::{multipart, Client, RequestBuilder};
use reqwest::StatusCode;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// One outgoing chat message: either plain text or a file upload.
#[derive(Debug, Clone, Copy)]
pub enum Outgoing<'a> {
    Text(&'a str),
    Document(&'a Path),
}

impl fmt::Display for Outgoing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outgoing::Text(text) => write!(f, "text ({} chars)", text.chars().count()),
            Outgoing::Document(path) => write!(f, "document {}", path.display()),
        }
    }
}

/// Delivers messages to a chat.
///
/// `Ok(())` means the remote side explicitly accepted the message.
pub trait Notifier {
    fn send(&self, message: Outgoing<'_>) -> Result<()>;
}

impl<N: Notifier + ?Sized> Notifier for &N {
    fn send(&self, message: Outgoing<'_>) -> Result<()> {
        (**self).send(message)
    }
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn send(&self, message: Outgoing<'_>) -> Result<()> {
        (**self).send(message)
    }
}

/// Telegram Bot API client (`sendMessage` / `sendDocument`).
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    token: String,
    chat_id: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("api_base", &self.api_base)
            .field("chat_id", &self.chat_id)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl TelegramNotifier {
    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.telegram.request_timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            api_base: config.telegram.api_base.trim_end_matches('/').to_string(),
            token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
            max_retries: config.telegram.max_retries,
            retry_delay: Duration::from_millis(config.telegram.retry_delay_ms),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    fn request(&self, message: Outgoing<'_>) -> Result<RequestBuilder> {
        Ok(match message {
            Outgoing::Text(text) => self
                .client
                .post(self.endpoint("sendMessage"))
                .form(&[("chat_id", self.chat_id.as_str()), ("text", text)]),
            Outgoing::Document(path) => {
                let form = multipart::Form::new()
                    .text("chat_id", self.chat_id.clone())
                    .file("document", path)?;
                self.client
                    .post(self.endpoint("sendDocument"))
                    .multipart(form)
            }
        })
    }

    fn send_once(&self, message: Outgoing<'_>) -> Result<()> {
        let response = self
            .request(message)?
            .send()
            // The URL carries the bot token; keep it out of error messages.
            .map_err(|e| RelayError::Http(e.without_url()))?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(());
        }

        let body = response.text().unwrap_or_default();
        Err(RelayError::ChatApi {
            status: status.as_u16(),
            description: api_description(&body),
        })
    }
}

impl Notifier for TelegramNotifier {
    fn send(&self, message: Outgoing<'_>) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.send_once(message) {
                Ok(()) => {
                    debug!(%message, attempt, "Chat message delivered");
                    return Ok(());
                }
                Err(e) if attempt < self.max_retries && is_retryable(&e) => {
                    attempt += 1;
                    warn!(%message, error = %e, attempt, "Chat send failed, retrying");
                    std::thread::sleep(self.retry_delay);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Transport errors, throttling and server errors are worth another attempt.
fn is_retryable(error: &RelayError) -> bool {
    match error {
        RelayError::Http(_) => true,
        RelayError::ChatApi { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

/// Telegram error bodies look like `{"ok":false,"error_code":400,"description":"..."}`.
fn api_description(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("description")?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
