use crate::prelude::TransportError;
use crate::processing::queue::{Inbound, QueueProducer};
use crate::telemetry::MetricsRecorder;
use crate::transport::{spawn_listener, ListenerHandle, ShutdownToken};
use crate::wire::{decode, SchemaKind};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Blocking frame receiver driven by [`PollListener`].
pub trait FrameSource {
    /// Waits at most `timeout`; `Ok(None)` means nothing arrived in time.
    fn recv_frame(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError>;
}

/// Why a poll loop returned.
#[derive(Debug)]
pub enum PollExit {
    Shutdown,
    ConsumerGone,
    Failed(TransportError),
}

pub struct PollSettings {
    pub schema: SchemaKind,
    pub producer: QueueProducer,
    pub shutdown: ShutdownToken,
    pub recv_timeout: Duration,
    pub metrics: Arc<MetricsRecorder>,
}

/// Receive, decode and enqueue until shutdown or a fatal transport error.
pub struct PollListener<S: FrameSource> {
    source: S,
    settings: PollSettings,
}

impl<S: FrameSource> PollListener<S> {
    pub fn new(source: S, settings: PollSettings) -> Self {
        Self { source, settings }
    }

    pub fn run(mut self) -> PollExit {
        let settings = &self.settings;
        loop {
            if settings.shutdown.is_signaled() {
                return PollExit::Shutdown;
            }

            let frame = match self.source.recv_frame(settings.recv_timeout) {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(err) if err.is_fatal() => {
                    error!("poll listener giving up: {}", err);
                    return PollExit::Failed(err);
                }
                Err(err) => {
                    warn!("receive failed, continuing: {}", err);
                    continue;
                }
            };
            if frame.is_empty() {
                continue;
            }

            settings.metrics.record_received();
            match decode(&frame, settings.schema) {
                Ok(decoded) => {
                    settings.metrics.record_decoded();
                    if !settings.producer.push(Inbound::Decoded(decoded)) {
                        return PollExit::ConsumerGone;
                    }
                }
                Err(err) => {
                    settings.metrics.record_decode_failure();
                    debug!("dropping undecodable frame: {}", err);
                }
            }
        }
    }
}

/// Connects with `connect` on a fresh thread and runs a poll loop there.
/// A failed connect is logged and ends the thread; `connect` returns
/// [`TransportError::Closed`] when shutdown arrives first.
pub fn spawn_poll_listener<S, F>(
    name: &str,
    connect: F,
    settings: PollSettings,
    join_timeout: Duration,
) -> Result<ListenerHandle, TransportError>
where
    S: FrameSource,
    F: FnOnce() -> Result<S, TransportError> + Send + 'static,
{
    let label = name.to_string();
    let shutdown = settings.shutdown.clone();
    spawn_listener(name, shutdown, join_timeout, move || {
        let source = match connect() {
            Ok(source) => source,
            Err(TransportError::Closed) => {
                info!("{} listener stopped before connecting", label);
                return;
            }
            Err(err) => {
                error!("{} listener could not connect: {}", label, err);
                return;
            }
        };
        let exit = PollListener::new(source, settings).run();
        info!("{} listener exited: {:?}", label, exit);
    })
}
