//! Inbound command pipeline.
//!
//! For each inbound event:
//! 1. Recognize the command (non-commands are ignored)
//! 2. Guarded commands pass access control, then the throttle guard
//! 3. Pick a prompt (custom text, or the next one in the rotation)
//! 4. Generate the image and deliver it to the originating chat

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;

use courier_common::types::{ChatId, Command, InboundEvent, UnauthorizedPolicy};

use crate::Services;
use crate::commands::{CommandParser, ParsedCommand};

const DENIED_REPLY: &str = "🚫 抱歉，你没有权限使用此命令。";
const THROTTLED_REPLY: &str = "⏳ 请求太频繁了，请稍等片刻再试。";
const PROGRESS_REPLY: &str = "🎨 正在生成妃妃照片，请稍候…";
const APOLOGY_REPLY: &str = "❌ 抱歉，生成失败，请稍后重试。";

/// What happened to an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Not a command.
    Ignored,
    Help,
    /// Sender is not on the allow-list.
    Denied,
    Throttled,
    Delivered,
    GenerationFailed,
    DeliveryFailed,
    /// The handler task panicked.
    Panicked,
}

/// Reply and policy settings for the interactive path.
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub unauthorized_policy: UnauthorizedPolicy,
    pub caption: String,
    /// Chat that receives generation error reports.
    pub developer_chat: Option<ChatId>,
}

/// Handles inbound chat events end to end.
pub struct CommandProcessor {
    parser: CommandParser,
    services: Services,
    settings: ProcessorSettings,
}

impl CommandProcessor {
    pub fn new(parser: CommandParser, services: Services, settings: ProcessorSettings) -> Self {
        Self {
            parser,
            services,
            settings,
        }
    }

    /// Handle `event` on its own task so a slow generation only delays its own reply.
    ///
    /// A panicking handler is logged and reported as [`Outcome::Panicked`].
    pub fn dispatch(self: &Arc<Self>, event: InboundEvent) -> JoinHandle<Outcome> {
        let processor = Arc::clone(self);
        let update_id = event.update_id;
        let subscriber = event.subscriber;
        let handler = tokio::spawn(async move { processor.handle(event).await });

        tokio::spawn(async move {
            match handler.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(
                        update_id,
                        subscriber = %subscriber,
                        error = %e,
                        "Command handler failed"
                    );
                    Outcome::Panicked
                }
            }
        })
    }

    pub async fn handle(&self, event: InboundEvent) -> Outcome {
        let Some(ParsedCommand { command, prompt }) = self.parser.parse(&event.text) else {
            return Outcome::Ignored;
        };

        tracing::info!(
            subscriber = %event.subscriber,
            chat = %event.chat,
            command = %command,
            "Command received"
        );

        match command {
            Command::Help => {
                self.reply(event.chat, &self.help_text()).await;
                Outcome::Help
            }
            Command::Generate => self.generate(&event, prompt).await,
        }
    }

    async fn generate(&self, event: &InboundEvent, custom_prompt: Option<String>) -> Outcome {
        if !self.services.access.is_authorized(event.subscriber) {
            tracing::warn!(
                subscriber = %event.subscriber,
                policy = ?self.settings.unauthorized_policy,
                "Unauthorized generate request"
            );
            if self.settings.unauthorized_policy == UnauthorizedPolicy::Refuse {
                self.reply(event.chat, DENIED_REPLY).await;
            }
            return Outcome::Denied;
        }

        if !self
            .services
            .throttle
            .admit(event.subscriber, Command::Generate, Instant::now())
        {
            self.reply(event.chat, THROTTLED_REPLY).await;
            return Outcome::Throttled;
        }

        let prompt = custom_prompt.unwrap_or_else(|| self.services.rotator.next());
        self.reply(event.chat, PROGRESS_REPLY).await;

        let asset = match self.services.orchestrator.generate(&prompt).await {
            Ok(asset) => asset,
            Err(e) => {
                tracing::error!(
                    subscriber = %event.subscriber,
                    prompt = %prompt,
                    error = %e,
                    "Image generation failed"
                );
                self.reply(event.chat, APOLOGY_REPLY).await;
                if let Some(developer) = self.settings.developer_chat {
                    self.reply(developer, &format!("错误通知:\n{}", e)).await;
                }
                return Outcome::GenerationFailed;
            }
        };

        match self
            .services
            .delivery
            .send(event.chat, &asset, &self.settings.caption)
            .await
        {
            Ok(()) => {
                tracing::info!(subscriber = %event.subscriber, prompt = %prompt, "Image sent");
                Outcome::Delivered
            }
            Err(e) => {
                tracing::warn!(subscriber = %event.subscriber, error = %e, "Image delivery failed");
                Outcome::DeliveryFailed
            }
        }
    }

    fn help_text(&self) -> String {
        let mut text = String::from(
            "你好，我是 AI 妃妃机器人 🤖\n\
             发送 /feifei <描述> 来生成妃妃的照片；\n\
             不带描述则按顺序生成一张（/pic 同样可用）。",
        );
        if !self.parser.trigger_phrases().is_empty() {
            text.push_str("\n也可以直接发送：");
            text.push_str(&self.parser.trigger_phrases().join(" / "));
        }
        text
    }

    /// Best-effort text reply; transport errors are logged, never surfaced.
    async fn reply(&self, chat: ChatId, text: &str) {
        if let Err(e) = self.services.transport.send_message(chat, text).await {
            tracing::warn!(chat = %chat, error = %e, "Failed to send reply");
        }
    }
}
