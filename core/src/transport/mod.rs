//! Network listeners feeding the handoff queue.
//!
//! Each transport runs on one dedicated thread and is stopped through an
//! owned [`ShutdownToken`]. Two flavours exist:
//!
//! | Transport | Style | Decodes on | Publish path |
//! |-----------|-------|------------|--------------|
//! | ZeroMQ SUB | poll loop (`poll`, `zmq`) | listener thread | none, receive-only |
//! | MQTT | library event loop + callback (`mqtt`) | consumer tick | bootstrap topic |
//!
//! Receives are bounded by `recv_timeout` so the shutdown flag is checked
//! regularly, and [`ListenerHandle::stop`] waits at most `join_timeout`
//! before releasing the connection and detaching the thread.

pub mod mqtt;
pub mod poll;
pub mod zmq;

use crate::prelude::{BootstrapPublisher, TransportError};
use crate::processing::queue::QueueProducer;
use crate::telemetry::MetricsRecorder;
use crate::wire::SchemaKind;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Cooperative stop signal shared between an owner and its listener thread.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    flag: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_signaled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    #[default]
    Zmq,
    Mqtt,
}

impl TransportKind {
    pub fn default_port(self) -> u16 {
        match self {
            TransportKind::Zmq => 5555,
            TransportKind::Mqtt => 1883,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QosLevel {
    #[default]
    AtMostOnce,
    AtLeastOnce,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
    pub host: String,
    /// Falls back to the transport's conventional port.
    pub port: Option<u16>,
    pub client_id: String,
    pub telemetry_topic: String,
    pub status_topic: String,
    pub bootstrap_topic: String,
    pub qos: QosLevel,
    pub recv_timeout_ms: u64,
    pub join_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Zmq,
            host: "localhost".into(),
            port: None,
            client_id: "twinbridge".into(),
            telemetry_topic: "digitaltwin/breast/tumor".into(),
            status_topic: "digitaltwin/system/status".into(),
            bootstrap_topic: "digitaltwin/breast/bootstrap".into(),
            qos: QosLevel::AtMostOnce,
            recv_timeout_ms: 200,
            join_timeout_ms: 500,
        }
    }
}

impl TransportConfig {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.kind.default_port())
    }

    pub fn zmq_endpoint(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port())
    }

    pub fn subscriptions(&self) -> Vec<String> {
        let mut topics = vec![self.telemetry_topic.clone()];
        if !self.status_topic.is_empty() && self.status_topic != self.telemetry_topic {
            topics.push(self.status_topic.clone());
        }
        topics
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms.max(1))
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

/// Owns a listener thread. Dropping the handle signals shutdown without
/// waiting; [`ListenerHandle::stop`] also performs the bounded join.
pub struct ListenerHandle {
    name: String,
    thread: Option<JoinHandle<()>>,
    shutdown: ShutdownToken,
    join_timeout: Duration,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenerHandle {
    /// Hook run once the join finished or timed out, e.g. to close the
    /// connection the thread may still hold.
    pub fn with_release<F: FnOnce() + Send + 'static>(mut self, release: F) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |thread| thread.is_finished())
    }

    /// Signals shutdown and waits up to `join_timeout`. Returns whether the
    /// thread exited in time; a late thread is detached.
    pub fn stop(mut self) -> bool {
        self.shutdown.signal();
        let finished = match self.thread.take() {
            None => true,
            Some(thread) => {
                let deadline = Instant::now() + self.join_timeout;
                while !thread.is_finished() && Instant::now() < deadline {
                    thread::sleep(JOIN_POLL_INTERVAL);
                }
                if thread.is_finished() {
                    if thread.join().is_err() {
                        error!("{} listener panicked", self.name);
                    }
                    true
                } else {
                    warn!(
                        "{} listener still running after {:?}, detaching",
                        self.name, self.join_timeout
                    );
                    false
                }
            }
        };
        if let Some(release) = self.release.take() {
            release();
        }
        info!("{} listener stopped", self.name);
        finished
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown.signal();
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// Spawns a named listener thread running `body`.
pub fn spawn_listener<F>(
    name: &str,
    shutdown: ShutdownToken,
    join_timeout: Duration,
    body: F,
) -> Result<ListenerHandle, TransportError>
where
    F: FnOnce() + Send + 'static,
{
    let thread = thread::Builder::new()
        .name(format!("{}-listener", name))
        .spawn(body)
        .map_err(|err| TransportError::Connection(format!("spawning {} listener: {}", name, err)))?;
    Ok(ListenerHandle {
        name: name.to_string(),
        thread: Some(thread),
        shutdown,
        join_timeout,
        release: None,
    })
}

/// A running transport: its listener thread and, for transports that can
/// write back, the bootstrap publisher.
pub struct ActiveTransport {
    pub handle: ListenerHandle,
    pub publisher: Option<Box<dyn BootstrapPublisher>>,
}

/// Starts the configured transport on its own thread.
pub fn start(
    config: &TransportConfig,
    schema: SchemaKind,
    producer: QueueProducer,
    shutdown: ShutdownToken,
    metrics: Arc<MetricsRecorder>,
) -> Result<ActiveTransport, TransportError> {
    match config.kind {
        TransportKind::Zmq => zmq::start(config, schema, producer, shutdown, metrics),
        TransportKind::Mqtt => mqtt::start(config, producer, shutdown),
    }
}
