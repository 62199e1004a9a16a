use crate::prelude::BootstrapPublisher;
use crate::telemetry::MetricsRecorder;
use crate::wire::{BootstrapConfig, BootstrapMessage};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    AwaitingReady,
    Bootstrapped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// First READY of the session; the bootstrap was attempted.
    Bootstrapped { published: bool },
    AlreadyBootstrapped,
}

/// Sends the bootstrap message on the first READY and ignores the rest.
///
/// Poll transports (ZeroMQ SUB) are receive-only, so the controller may be
/// built without a publisher; the transition still happens and the missing
/// write-back path is logged.
pub struct HandshakeController {
    state: HandshakeState,
    config: BootstrapConfig,
    publisher: Option<Box<dyn BootstrapPublisher>>,
    metrics: Arc<MetricsRecorder>,
}

impl HandshakeController {
    pub fn new(
        config: BootstrapConfig,
        publisher: Option<Box<dyn BootstrapPublisher>>,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            state: HandshakeState::AwaitingReady,
            config,
            publisher,
            metrics,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn on_ready(&mut self) -> HandshakeOutcome {
        if self.state == HandshakeState::Bootstrapped {
            return HandshakeOutcome::AlreadyBootstrapped;
        }
        self.state = HandshakeState::Bootstrapped;
        info!("remote side READY, sending bootstrap for {}", self.config.patient_id);
        HandshakeOutcome::Bootstrapped {
            published: self.publish_bootstrap(),
        }
    }

    fn publish_bootstrap(&mut self) -> bool {
        let Some(publisher) = self.publisher.as_mut() else {
            warn!("transport is receive-only; bootstrap not sent");
            return false;
        };

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        let message = BootstrapMessage::from_config(&self.config, timestamp);

        let result = message
            .to_bytes()
            .and_then(|payload| publisher.publish(&payload));
        match result {
            Ok(()) => {
                self.metrics.record_bootstrap();
                info!(
                    "bootstrap sent to {} for patient {}",
                    publisher.destination(),
                    self.config.patient_id
                );
                true
            }
            Err(err) => {
                self.metrics.record_publish_failure();
                error!("bootstrap publish to {} failed: {}", publisher.destination(), err);
                false
            }
        }
    }
}
