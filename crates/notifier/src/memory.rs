//! In-memory transport for tests: scripted polls, recorded sends.

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use courier_common::types::{ChatId, InboundEvent};

use crate::transport::{Transport, TransportError, Update};

/// A message recorded by [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text {
        chat: ChatId,
        text: String,
    },
    /// Photo bytes are read from disk at send time.
    Photo {
        chat: ChatId,
        bytes: Vec<u8>,
        caption: String,
    },
}

enum PollStep {
    Updates(Vec<Update>),
    Fail(TransportError),
    Panic,
}

/// Scripted transport. Each `poll` consumes one scripted step; once the script
/// is exhausted, polls idle for their full timeout and return nothing.
#[derive(Default)]
pub struct MemoryTransport {
    script: Mutex<VecDeque<PollStep>>,
    offsets: Mutex<Vec<Option<i64>>>,
    sent: Mutex<Vec<Sent>>,
    failing: Mutex<HashSet<ChatId>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_events(&self, events: Vec<InboundEvent>) {
        let updates = events
            .into_iter()
            .map(|e| Update {
                update_id: e.update_id,
                event: Some(e),
            })
            .collect();
        self.push_updates(updates);
    }

    pub fn push_updates(&self, updates: Vec<Update>) {
        self.lock_script().push_back(PollStep::Updates(updates));
    }

    pub fn push_error(&self, error: TransportError) {
        self.lock_script().push_back(PollStep::Fail(error));
    }

    /// The next poll panics, simulating a bug inside the receive session.
    pub fn push_panic(&self) {
        self.lock_script().push_back(PollStep::Panic);
    }

    /// Every send to `chat` fails from now on.
    pub fn fail_sends_to(&self, chat: ChatId) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(chat);
    }

    /// Offsets passed to `poll`, in call order.
    pub fn offsets(&self) -> Vec<Option<i64>> {
        self.offsets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn photos_to(&self, chat: ChatId) -> usize {
        self.sent()
            .iter()
            .filter(|s| matches!(s, Sent::Photo { chat: c, .. } if *c == chat))
            .count()
    }

    pub fn texts_to(&self, chat: ChatId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { chat: c, text } if c == chat => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Wait until at least `count` messages were sent, or `within` elapses.
    pub async fn wait_for_sent(&self, count: usize, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            if self.sent().len() >= count {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<PollStep>> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_failing(&self, chat: ChatId) -> Result<(), TransportError> {
        if self
            .failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&chat)
        {
            return Err(TransportError::Api {
                code: 403,
                description: format!("Forbidden: chat {} unreachable", chat),
            });
        }
        Ok(())
    }

    fn record(&self, sent: Sent) {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).push(sent);
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn identify(&self) -> Result<String, TransportError> {
        Ok("memory_bot".to_string())
    }

    async fn poll(&self, offset: Option<i64>, timeout: Duration) -> Result<Vec<Update>, TransportError> {
        self.offsets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(offset);

        let step = self.lock_script().pop_front();
        match step {
            Some(PollStep::Updates(updates)) => Ok(updates
                .into_iter()
                .filter(|u| offset.is_none_or(|o| u.update_id >= o))
                .collect()),
            Some(PollStep::Fail(e)) => Err(e),
            Some(PollStep::Panic) => panic!("scripted receive-loop panic"),
            None => {
                tokio::time::sleep(timeout).await;
                Ok(Vec::new())
            }
        }
    }

    async fn send_message(&self, chat: ChatId, text: &str) -> Result<(), TransportError> {
        self.check_failing(chat)?;
        self.record(Sent::Text {
            chat,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_photo(&self, chat: ChatId, photo: &Path, caption: &str) -> Result<(), TransportError> {
        self.check_failing(chat)?;
        let bytes = tokio::fs::read(photo).await?;
        self.record(Sent::Photo {
            chat,
            bytes,
            caption: caption.to_string(),
        });
        Ok(())
    }
}
