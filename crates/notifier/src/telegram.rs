//! Telegram Bot API client.
//!
//! Only the four methods the bot needs: `getMe`, `getUpdates` (long polling),
//! `sendMessage` and `sendPhoto` (multipart upload).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use courier_common::types::{ChatId, InboundEvent, SubscriberId};

use crate::transport::{Transport, TransportError, Update};

/// Slack added on top of the long-poll timeout before the HTTP request gives up.
const POLL_HTTP_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct RawUpdate {
    update_id: i64,
    message: Option<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    chat: RawChat,
    from: Option<RawUser>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct RawMe {
    first_name: String,
    username: Option<String>,
}

impl From<RawUpdate> for Update {
    fn from(raw: RawUpdate) -> Self {
        let event = raw.message.and_then(|m| {
            let from = m.from?;
            let text = m.text?;
            Some(InboundEvent {
                update_id: raw.update_id,
                subscriber: SubscriberId(from.id),
                chat: ChatId(m.chat.id),
                text,
            })
        });
        Update {
            update_id: raw.update_id,
            event,
        }
    }
}

/// HTTP client for a single bot token.
pub struct TelegramClient {
    http: reqwest::Client,
    /// `{api_url}/bot{token}`; never logged, and stripped from network errors.
    base: String,
}

impl TelegramClient {
    pub fn new(http: reqwest::Client, api_url: &str, token: &str) -> Self {
        Self {
            http,
            base: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base, method)
    }

    /// Send a prepared request and unwrap the Bot API envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, TransportError> {
        let response = request.send().await?;
        let status = response.status();

        let envelope: ApiResponse<T> = match response.json().await {
            Ok(envelope) => envelope,
            Err(_) if status == StatusCode::CONFLICT => {
                return Err(TransportError::SessionConflict(status.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        if envelope.ok
            && let Some(result) = envelope.result
        {
            return Ok(result);
        }

        let code = envelope.error_code.unwrap_or(status.as_u16());
        let description = envelope
            .description
            .unwrap_or_else(|| "no description".to_string());

        if code == StatusCode::CONFLICT.as_u16() {
            Err(TransportError::SessionConflict(description))
        } else {
            Err(TransportError::Api { code, description })
        }
    }
}

#[async_trait]
impl Transport for TelegramClient {
    async fn identify(&self) -> Result<String, TransportError> {
        let me: RawMe = self.call(self.http.get(self.url("getMe"))).await?;
        Ok(me.username.unwrap_or(me.first_name))
    }

    async fn poll(&self, offset: Option<i64>, timeout: Duration) -> Result<Vec<Update>, TransportError> {
        let mut body = json!({
            "timeout": timeout.as_secs(),
            "allowed_updates": ["message"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }

        let raw: Vec<RawUpdate> = self
            .call(
                self.http
                    .post(self.url("getUpdates"))
                    .timeout(timeout + POLL_HTTP_GRACE)
                    .json(&body),
            )
            .await?;

        Ok(raw.into_iter().map(Update::from).collect())
    }

    async fn send_message(&self, chat: ChatId, text: &str) -> Result<(), TransportError> {
        let body = json!({ "chat_id": chat.0, "text": text });
        let _: serde_json::Value = self
            .call(self.http.post(self.url("sendMessage")).json(&body))
            .await?;
        Ok(())
    }

    async fn send_photo(&self, chat: ChatId, photo: &Path, caption: &str) -> Result<(), TransportError> {
        let bytes = tokio::fs::read(photo).await?;
        let file_name = photo
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image.png".to_string());

        let part = Part::bytes(bytes).file_name(file_name).mime_str("image/png")?;
        let form = Form::new()
            .text("chat_id", chat.0.to_string())
            .text("caption", caption.to_string())
            .part("photo", part);

        let _: serde_json::Value = self
            .call(self.http.post(self.url("sendPhoto")).multipart(form))
            .await?;
        Ok(())
    }
}
