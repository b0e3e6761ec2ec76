use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use courier_common::types::{ChatId, InboundEvent};

/// Errors raised by a chat transport.
///
/// These never reach end users: the supervisor restarts the receive loop, and
/// send failures are logged by the caller.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Another process is already consuming updates for this bot.
    #[error("receive session held by another instance: {0}")]
    SessionConflict(String),

    /// Built through `From`, which strips the request URL (it embeds the token).
    #[error("network error: {0}")]
    Network(reqwest::Error),

    #[error("transport API error {code}: {description}")]
    Api { code: u16, description: String },

    #[error("failed to read attachment: {0}")]
    Attachment(#[from] std::io::Error),
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        TransportError::Network(error.without_url())
    }
}

impl TransportError {
    pub fn is_session_conflict(&self) -> bool {
        matches!(self, TransportError::SessionConflict(_))
    }
}

/// One received update. Updates without usable text carry no event but still
/// advance the receive offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub update_id: i64,
    pub event: Option<InboundEvent>,
}

/// Chat transport the bot receives commands from and delivers images through.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Verify credentials and return the bot's display name.
    async fn identify(&self) -> Result<String, TransportError>;

    /// Long-poll for updates with id `>= offset`.
    async fn poll(&self, offset: Option<i64>, timeout: Duration) -> Result<Vec<Update>, TransportError>;

    async fn send_message(&self, chat: ChatId, text: &str) -> Result<(), TransportError>;

    /// Upload the image at `photo` with a caption.
    async fn send_photo(&self, chat: ChatId, photo: &Path, caption: &str) -> Result<(), TransportError>;
}
