use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Telegram user id of a (potential) subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(pub i64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Conversation an inbound event arrived on.
///
/// For private chats Telegram uses the user id as the chat id, which is how
/// broadcasts address a subscriber directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl From<SubscriberId> for ChatId {
    fn from(id: SubscriberId) -> Self {
        ChatId(id.0)
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A text message received from the chat transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Transport-assigned, strictly increasing update id.
    pub update_id: i64,
    pub subscriber: SubscriberId,
    pub chat: ChatId,
    pub text: String,
}

/// Commands the bot reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Help,
    Generate,
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Help => write!(f, "help"),
            Command::Generate => write!(f, "generate"),
        }
    }
}

/// What to do when a subscriber outside the allow-list invokes a guarded command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnauthorizedPolicy {
    /// Reply with an explicit refusal.
    #[default]
    Refuse,
    /// Drop the request without replying.
    Silent,
}

impl FromStr for UnauthorizedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "refuse" => Ok(UnauthorizedPolicy::Refuse),
            "silent" => Ok(UnauthorizedPolicy::Silent),
            other => Err(format!("unknown unauthorized policy '{}'", other)),
        }
    }
}

/// Lifecycle states of the receive-loop supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    Starting,
    Running,
    Backoff,
    Stopped,
}

impl std::fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SupervisorState::Starting => write!(f, "starting"),
            SupervisorState::Running => write!(f, "running"),
            SupervisorState::Backoff => write!(f, "backoff"),
            SupervisorState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Snapshot of the supervisor, published on every state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorStatus {
    pub state: SupervisorState,
    /// Number of restarts since the process started.
    pub restarts: u64,
    /// The error that caused the most recent restart, if any.
    pub last_error: Option<String>,
    /// When the current state was entered.
    pub since: DateTime<Utc>,
}

impl SupervisorStatus {
    pub fn starting() -> Self {
        Self {
            state: SupervisorState::Starting,
            restarts: 0,
            last_error: None,
            since: Utc::now(),
        }
    }
}
