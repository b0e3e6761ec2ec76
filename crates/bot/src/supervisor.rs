//! Receive-loop supervisor.
//!
//! Runs the transport's long-poll loop on its own task and restarts it after
//! any failure, with a backoff chosen by failure class:
//!
//! - session conflict (another instance is polling) → short backoff
//! - transport error (network, API) → medium backoff
//! - anything else, including a panic inside the loop → longer backoff
//!
//! Repeated failures of the same class escalate the delay up to a cap; a
//! session that stayed up for `healthy_after` resets the escalation. Only the
//! shutdown signal ends the loop. The update offset lives here, outside the
//! restarted task, so a restart neither skips nor replays acknowledged updates.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Instant;

use courier_common::types::{SupervisorState, SupervisorStatus};
use courier_engine::processor::CommandProcessor;
use courier_notifier::{Transport, TransportError};

/// Why a receive session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    SessionConflict,
    Transport,
    Other,
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureClass::SessionConflict => write!(f, "session_conflict"),
            FailureClass::Transport => write!(f, "transport"),
            FailureClass::Other => write!(f, "other"),
        }
    }
}

impl From<&TransportError> for FailureClass {
    fn from(error: &TransportError) -> Self {
        match error {
            TransportError::SessionConflict(_) => FailureClass::SessionConflict,
            TransportError::Network(_) | TransportError::Api { .. } => FailureClass::Transport,
            TransportError::Attachment(_) => FailureClass::Other,
        }
    }
}

/// Backoff delays per failure class, with escalation.
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    pub session_conflict: Duration,
    pub transport: Duration,
    pub other: Duration,
    /// Factor applied per consecutive failure of the same class.
    pub multiplier: u32,
    pub max_backoff: Duration,
    /// A session running at least this long resets escalation.
    pub healthy_after: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            session_conflict: Duration::from_secs(2),
            transport: Duration::from_secs(3),
            other: Duration::from_secs(5),
            multiplier: 2,
            max_backoff: Duration::from_secs(60),
            healthy_after: Duration::from_secs(60),
        }
    }
}

impl RestartPolicy {
    /// Fixed delays, no escalation.
    pub fn fixed(session_conflict: Duration, transport: Duration, other: Duration) -> Self {
        Self {
            session_conflict,
            transport,
            other,
            multiplier: 1,
            ..Self::default()
        }
    }

    /// Delay before restart number `consecutive` (1-based) of `class`.
    pub fn backoff(&self, class: FailureClass, consecutive: u32) -> Duration {
        let base = match class {
            FailureClass::SessionConflict => self.session_conflict,
            FailureClass::Transport => self.transport,
            FailureClass::Other => self.other,
        };
        let factor = self
            .multiplier
            .max(1)
            .saturating_pow(consecutive.saturating_sub(1));
        base.saturating_mul(factor).min(self.max_backoff.max(base))
    }
}

/// Supervises the transport receive loop.
pub struct Supervisor {
    transport: Arc<dyn Transport>,
    processor: Arc<CommandProcessor>,
    policy: RestartPolicy,
    poll_timeout: Duration,
    offset: Arc<Mutex<Option<i64>>>,
    status: watch::Sender<SupervisorStatus>,
}

impl Supervisor {
    pub fn new(
        transport: Arc<dyn Transport>,
        processor: Arc<CommandProcessor>,
        policy: RestartPolicy,
        poll_timeout: Duration,
    ) -> Self {
        let (status, _) = watch::channel(SupervisorStatus::starting());
        Self {
            transport,
            processor,
            policy,
            poll_timeout,
            offset: Arc::new(Mutex::new(None)),
            status,
        }
    }

    /// Live view of the supervisor state.
    pub fn status(&self) -> watch::Receiver<SupervisorStatus> {
        self.status.subscribe()
    }

    /// Run until `shutdown` fires.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut restarts: u64 = 0;
        let mut last_error: Option<String> = None;
        let mut streak: Option<(FailureClass, u32)> = None;

        loop {
            self.transition(SupervisorState::Starting, restarts, last_error.clone());

            let session = tokio::spawn(receive_loop(
                self.transport.clone(),
                self.processor.clone(),
                self.offset.clone(),
                self.poll_timeout,
            ));
            let abort = session.abort_handle();
            let started = Instant::now();

            self.transition(SupervisorState::Running, restarts, last_error.clone());

            let joined = tokio::select! {
                joined = session => joined,
                _ = shutdown.changed() => {
                    abort.abort();
                    self.transition(SupervisorState::Stopped, restarts, last_error);
                    tracing::info!("Receive loop stopped by shutdown signal");
                    return;
                }
            };

            let (class, error) = match joined {
                Ok(Ok(())) => (
                    FailureClass::Other,
                    "receive loop exited unexpectedly".to_string(),
                ),
                Ok(Err(e)) => (FailureClass::from(&e), e.to_string()),
                Err(e) if e.is_panic() => (
                    FailureClass::Other,
                    format!("receive loop panicked: {}", panic_message(e.into_panic())),
                ),
                Err(e) => (FailureClass::Other, e.to_string()),
            };

            let consecutive = match streak {
                Some((previous, n)) if previous == class && started.elapsed() < self.policy.healthy_after => {
                    n.saturating_add(1)
                }
                _ => 1,
            };
            streak = Some((class, consecutive));

            let delay = self.policy.backoff(class, consecutive);
            restarts += 1;

            tracing::warn!(
                class = %class,
                error = %error,
                consecutive,
                restarts,
                backoff_ms = delay.as_millis() as u64,
                "Receive loop failed, restarting after backoff"
            );
            last_error = Some(error);
            self.transition(SupervisorState::Backoff, restarts, last_error.clone());

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {
                    self.transition(SupervisorState::Stopped, restarts, last_error);
                    tracing::info!("Supervisor stopped during backoff");
                    return;
                }
            }
        }
    }

    fn transition(&self, state: SupervisorState, restarts: u64, last_error: Option<String>) {
        tracing::info!(state = %state, restarts, "Supervisor state changed");
        self.status.send_replace(SupervisorStatus {
            state,
            restarts,
            last_error,
            since: Utc::now(),
        });
    }
}

/// Poll forever, dispatching every event and acknowledging it afterwards.
async fn receive_loop(
    transport: Arc<dyn Transport>,
    processor: Arc<CommandProcessor>,
    offset: Arc<Mutex<Option<i64>>>,
    poll_timeout: Duration,
) -> Result<(), TransportError> {
    loop {
        let current = *offset.lock().unwrap_or_else(|e| e.into_inner());
        let updates = transport.poll(current, poll_timeout).await?;

        for update in updates {
            if let Some(event) = update.event {
                tracing::debug!(update_id = update.update_id, "Dispatching update");
                processor.dispatch(event);
            }
            *offset.lock().unwrap_or_else(|e| e.into_inner()) = Some(update.update_id + 1);
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_base_delays() {
        let policy = RestartPolicy::default();
        assert_eq!(policy.backoff(FailureClass::SessionConflict, 1), Duration::from_secs(2));
        assert_eq!(policy.backoff(FailureClass::Transport, 1), Duration::from_secs(3));
        assert_eq!(policy.backoff(FailureClass::Other, 1), Duration::from_secs(5));
    }

    #[test]
    fn test_escalation_is_capped() {
        let policy = RestartPolicy::default();
        assert_eq!(policy.backoff(FailureClass::SessionConflict, 2), Duration::from_secs(4));
        assert_eq!(policy.backoff(FailureClass::SessionConflict, 3), Duration::from_secs(8));
        assert_eq!(policy.backoff(FailureClass::Other, 10), Duration::from_secs(60));
        assert_eq!(policy.backoff(FailureClass::Other, u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_fixed_policy_never_escalates() {
        let policy = RestartPolicy::fixed(
            Duration::from_millis(10),
            Duration::from_millis(20),
            Duration::from_millis(30),
        );
        assert_eq!(policy.backoff(FailureClass::Transport, 5), Duration::from_millis(20));
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            FailureClass::from(&TransportError::SessionConflict("409".into())),
            FailureClass::SessionConflict
        );
        assert_eq!(
            FailureClass::from(&TransportError::Api {
                code: 502,
                description: "Bad Gateway".into()
            }),
            FailureClass::Transport
        );
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("boom".to_string())), "boom");
        assert_eq!(panic_message(Box::new(42)), "unknown panic payload");
    }
}
