use std::sync::Arc;

use courier_common::types::ChatId;
use courier_imagegen::GeneratedAsset;

use crate::transport::{Transport, TransportError};

/// Outcome of a fan-out send.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: Vec<ChatId>,
    pub failed: Vec<(ChatId, String)>,
}

impl DeliveryReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Sends generated images with a caption over the chat transport.
#[derive(Clone)]
pub struct DeliveryChannel {
    transport: Arc<dyn Transport>,
}

impl DeliveryChannel {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Deliver `asset` to a single chat.
    pub async fn send(
        &self,
        chat: ChatId,
        asset: &GeneratedAsset,
        caption: &str,
    ) -> Result<(), TransportError> {
        self.transport
            .send_photo(chat, asset.path(), caption)
            .await?;
        tracing::info!(chat = %chat, asset = %asset.file_name(), "Image delivered");
        Ok(())
    }

    /// Deliver `asset` to every recipient in order.
    ///
    /// Each send is independent: a failing recipient is recorded in the report
    /// and the remaining recipients are still served.
    pub async fn fan_out<I>(&self, recipients: I, asset: &GeneratedAsset, caption: &str) -> DeliveryReport
    where
        I: IntoIterator<Item = ChatId>,
    {
        let mut report = DeliveryReport::default();

        for chat in recipients {
            match self.send(chat, asset, caption).await {
                Ok(()) => report.delivered.push(chat),
                Err(e) => {
                    tracing::warn!(chat = %chat, error = %e, "Delivery failed");
                    report.failed.push((chat, e.to_string()));
                }
            }
        }

        report
    }
}
