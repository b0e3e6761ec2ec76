//! Daily broadcast scheduler.
//!
//! One job, fired at a fixed local wall-clock time every day. Each tick takes
//! the next prompt from the shared rotation, generates one image and fans it
//! out to every allow-listed subscriber. A failed generation skips the tick;
//! the next chance is tomorrow.

use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, TimeDelta, TimeZone};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use courier_common::error::AppError;
use courier_common::types::ChatId;
use courier_notifier::DeliveryReport;

use crate::Services;

/// Result of one broadcast tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Delivered(DeliveryReport),
    /// Generation failed; nothing was sent.
    Skipped,
}

/// Longest stretch of local time a zone transition can skip.
const MAX_GAP_HOURS: i64 = 48;

/// Next occurrence of `at` strictly after `now`, in `now`'s time zone.
///
/// A wall-clock time that falls into a DST gap is moved forward by whole
/// hours until it exists; in a fold it fires at the earlier instant.
pub fn next_fire_after<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut day = now.date_naive();

    for _ in 0..3 {
        if let Some(candidate) = resolve(&tz, day.and_time(at))
            && candidate > *now
        {
            return candidate;
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }

    now.clone() + TimeDelta::days(1)
}

/// Map a local wall-clock time onto the zone, moving forward out of a gap.
fn resolve<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    (0..=MAX_GAP_HOURS)
        .find_map(|h| tz.from_local_datetime(&(naive + TimeDelta::hours(h))).earliest())
}

/// Owner of the single daily broadcast job.
pub struct BroadcastScheduler {
    at: NaiveTime,
    caption: String,
    services: Services,
}

impl BroadcastScheduler {
    pub fn new(at: NaiveTime, caption: String, services: Services) -> Self {
        Self {
            at,
            caption,
            services,
        }
    }

    /// Register the daily job on the running runtime.
    ///
    /// Must be called from inside the runtime that processes events; calling
    /// it before that runtime exists is a configuration error.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> Result<JoinHandle<()>, AppError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            AppError::Config(
                "broadcast scheduler registered before the event runtime started".to_string(),
            )
        })?;

        tracing::info!(at = %self.at, "Daily broadcast registered");
        Ok(handle.spawn(self.run(shutdown)))
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        // Each target is computed strictly after the previous one, so an early
        // wakeup or a wall-clock step back cannot fire the same day twice.
        let mut after = Local::now();
        loop {
            let next = next_fire_after(&after, self.at);
            let wait = (next - Local::now()).to_std().unwrap_or_default();

            tracing::info!(next_fire = %next, "Waiting for next broadcast");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    self.tick().await;
                    after = next.max(Local::now());
                }
                _ = shutdown.changed() => {
                    tracing::info!("Broadcast scheduler stopped");
                    return;
                }
            }
        }
    }

    /// Run one broadcast: rotate, generate, fan out.
    pub async fn tick(&self) -> TickOutcome {
        let prompt = self.services.rotator.next();
        tracing::info!(prompt = %prompt, "Broadcast tick");

        let asset = match self.services.orchestrator.generate(&prompt).await {
            Ok(asset) => asset,
            Err(e) => {
                tracing::error!(
                    prompt = %prompt,
                    error = %e,
                    "Broadcast generation failed, skipping until next tick"
                );
                return TickOutcome::Skipped;
            }
        };

        let recipients: Vec<ChatId> = self
            .services
            .access
            .subscribers()
            .map(ChatId::from)
            .collect();

        let report = self
            .services
            .delivery
            .fan_out(recipients, &asset, &self.caption)
            .await;

        tracing::info!(
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "Broadcast finished"
        );
        TickOutcome::Delivered(report)
    }
}
