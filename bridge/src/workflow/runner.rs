use crate::workflow::config::BridgeConfig;
use anyhow::Context;
use log::{info, warn};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Builder;
use tokio::signal;
use tokio::time::{self, MissedTickBehavior};
use twincore::prelude::{BootstrapPublisher, PublishError, VisualStateSink};
use twincore::processing::{
    HandshakeController, HandshakeState, Inbound, QueueConsumer, QueueProducer, RawPayload,
    TargetFrame, TickConsumer,
};
use twincore::telemetry::{IngestSnapshot, MetricsRecorder};
use twincore::transport::{self, ActiveTransport, ListenerHandle, ShutdownToken};

/// Offline write-back path: logs the bootstrap and remembers the last one.
#[derive(Clone, Default)]
pub struct LoggingPublisher {
    last: Arc<Mutex<Option<Vec<u8>>>>,
}

impl LoggingPublisher {
    pub fn last_payload(&self) -> Option<Vec<u8>> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl BootstrapPublisher for LoggingPublisher {
    fn publish(&mut self, payload: &[u8]) -> Result<(), PublishError> {
        info!("[offline] bootstrap {}", String::from_utf8_lossy(payload));
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(payload.to_vec());
        Ok(())
    }

    fn destination(&self) -> String {
        "offline log".into()
    }
}

pub struct OfflineResult {
    pub ticks: usize,
    pub telemetry: usize,
    pub control: usize,
    pub decode_failures: usize,
    pub bootstrapped: bool,
    pub handshake: HandshakeState,
    pub frame: TargetFrame,
    pub metrics: IngestSnapshot,
}

#[derive(Clone)]
pub struct Runner {
    config: BridgeConfig,
}

impl Runner {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    pub fn build_consumer<S: VisualStateSink>(
        &self,
        queue: QueueConsumer,
        publisher: Option<Box<dyn BootstrapPublisher>>,
        sink: S,
        metrics: Arc<MetricsRecorder>,
    ) -> anyhow::Result<TickConsumer<S>> {
        let handshake =
            HandshakeController::new(self.config.bootstrap.clone(), publisher, metrics.clone());
        TickConsumer::new(
            queue,
            self.config.schema,
            self.config.target_config(),
            self.config.tick,
            handshake,
            sink,
            metrics,
        )
        .context("building tick consumer")
    }

    pub fn start_transport(
        &self,
        producer: QueueProducer,
        metrics: Arc<MetricsRecorder>,
    ) -> anyhow::Result<ActiveTransport> {
        transport::start(
            &self.config.transport,
            self.config.schema,
            producer,
            ShutdownToken::new(),
            metrics,
        )
        .with_context(|| format!("starting {:?} transport", self.config.transport.kind))
    }

    /// Enqueues every payload, then ticks until the queue is empty.
    pub fn execute_offline<S: VisualStateSink>(
        &self,
        consumer: &mut TickConsumer<S>,
        producer: &QueueProducer,
        payloads: &[String],
    ) -> anyhow::Result<OfflineResult> {
        for payload in payloads {
            let item = Inbound::Raw(RawPayload::new(Some("offline".into()), payload.as_bytes()));
            if !producer.push(item) {
                anyhow::bail!("handoff queue closed during offline run");
            }
        }

        let mut result = OfflineResult {
            ticks: 0,
            telemetry: 0,
            control: 0,
            decode_failures: 0,
            bootstrapped: false,
            handshake: consumer.handshake_state(),
            frame: TargetFrame::default(),
            metrics: IngestSnapshot::default(),
        };
        loop {
            let report = consumer.tick();
            if report.processed == 0 {
                break;
            }
            result.ticks += 1;
            result.telemetry += report.telemetry;
            result.control += report.control;
            result.decode_failures += report.decode_failures;
            result.bootstrapped |= report.bootstrapped;
        }
        result.handshake = consumer.handshake_state();
        result.frame = consumer.frame().clone();
        result.metrics = consumer.metrics().snapshot();
        Ok(result)
    }

    /// Ticks the consumer every `tick.interval_ms` until Ctrl+C, then stops
    /// the listener with its bounded join.
    pub fn run_until_interrupted<S: VisualStateSink>(
        &self,
        consumer: &mut TickConsumer<S>,
        listener: Option<ListenerHandle>,
    ) -> anyhow::Result<IngestSnapshot> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .context("creating runtime for tick loop")?;
        let interval = Duration::from_millis(self.config.tick.interval_ms);
        let mut listener_alive = listener.is_some();

        runtime.block_on(async {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let ctrl_c = signal::ctrl_c();
            tokio::pin!(ctrl_c);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = consumer.tick();
                        if report.bootstrapped {
                            info!("handshake complete, streaming targets");
                        }
                        if listener_alive && listener.as_ref().map_or(false, |handle| handle.is_finished()) {
                            warn!("listener thread ended; targets will stay at their last values");
                            listener_alive = false;
                        }
                    }
                    result = &mut ctrl_c => {
                        result.context("awaiting Ctrl+C to exit")?;
                        break;
                    }
                }
            }
            Ok::<(), anyhow::Error>(())
        })?;

        if let Some(handle) = listener {
            let name = handle.name().to_string();
            if !handle.stop() {
                warn!("{} listener did not exit in time", name);
            }
        }
        Ok(consumer.metrics().snapshot())
    }
}
