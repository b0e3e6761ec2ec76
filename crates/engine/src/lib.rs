pub mod access;
pub mod commands;
pub mod processor;
pub mod rotator;
pub mod scheduler;
pub mod throttle;

use std::sync::Arc;
use std::time::Duration;

use courier_common::config::AppConfig;
use courier_common::error::AppError;
use courier_imagegen::ImageOrchestrator;
use courier_notifier::{DeliveryChannel, Transport};

use crate::access::AccessControl;
use crate::rotator::PromptRotator;
use crate::throttle::ThrottleGuard;

/// Shared components of the dispatch pipeline.
///
/// The throttle map and rotation cursor are owned here, behind their own
/// locks, and shared between the inbound path and the daily broadcast.
#[derive(Clone)]
pub struct Services {
    pub access: Arc<AccessControl>,
    pub throttle: Arc<ThrottleGuard>,
    pub rotator: Arc<PromptRotator>,
    pub orchestrator: Arc<ImageOrchestrator>,
    pub delivery: DeliveryChannel,
    pub transport: Arc<dyn Transport>,
}

impl Services {
    pub fn new(
        access: AccessControl,
        throttle: ThrottleGuard,
        rotator: PromptRotator,
        orchestrator: ImageOrchestrator,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            access: Arc::new(access),
            throttle: Arc::new(throttle),
            rotator: Arc::new(rotator),
            orchestrator: Arc::new(orchestrator),
            delivery: DeliveryChannel::new(transport.clone()),
            transport,
        }
    }

    /// Assemble the pipeline described by the configuration.
    pub fn from_config(
        config: &AppConfig,
        orchestrator: ImageOrchestrator,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, AppError> {
        Ok(Self::new(
            AccessControl::new(config.allowed_user_ids.iter().copied()),
            ThrottleGuard::new(Duration::from_secs(config.throttle_window_secs)),
            PromptRotator::new(config.prompts.clone())?,
            orchestrator,
            transport,
        ))
    }
}
