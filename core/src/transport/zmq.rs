//! ZeroMQ SUB listener.
//!
//! Connects to `tcp://host:port`, subscribes to every topic and decodes on
//! the listener thread. The socket is receive-only, so this transport never
//! offers a bootstrap publisher.

use crate::prelude::TransportError;
use crate::processing::queue::QueueProducer;
use crate::telemetry::MetricsRecorder;
use crate::transport::poll::{spawn_poll_listener, FrameSource, PollSettings};
use crate::transport::{ActiveTransport, ShutdownToken, TransportConfig};
use crate::wire::SchemaKind;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use zeromq::{Socket, SocketRecv, SubSocket, ZmqError, ZmqMessage};

/// Consecutive receive errors after which the socket is considered unusable.
const MAX_CONSECUTIVE_ERRORS: u32 = 5;

pub struct ZmqFrameSource {
    runtime: Runtime,
    socket: SubSocket,
    endpoint: String,
    consecutive_errors: u32,
}

impl ZmqFrameSource {
    /// Connects and subscribes to every topic. The underlying connect keeps
    /// retrying while the peer refuses, so each attempt is bounded by
    /// `attempt_timeout` and `shutdown` is checked between attempts.
    pub fn connect(
        endpoint: &str,
        shutdown: &ShutdownToken,
        attempt_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| TransportError::Connection(format!("creating runtime: {}", err)))?;

        let mut socket = SubSocket::new();
        loop {
            if shutdown.is_signaled() {
                debug!("shutdown requested while connecting to {}", endpoint);
                return Err(TransportError::Closed);
            }
            let attempt = runtime
                .block_on(async { tokio::time::timeout(attempt_timeout, socket.connect(endpoint)).await });
            match attempt {
                Ok(Ok(())) => break,
                Ok(Err(err)) => {
                    return Err(TransportError::Connection(format!("{}: {}", endpoint, err)))
                }
                Err(_elapsed) => debug!("{} not reachable yet, retrying", endpoint),
            }
        }

        let subscribed: Result<(), ZmqError> = runtime.block_on(socket.subscribe(""));
        subscribed.map_err(|err| TransportError::Connection(format!("{}: {}", endpoint, err)))?;
        info!("subscribed to all topics on {}", endpoint);

        Ok(Self {
            runtime,
            socket,
            endpoint: endpoint.to_string(),
            consecutive_errors: 0,
        })
    }
}

impl FrameSource for ZmqFrameSource {
    fn recv_frame(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        let socket = &mut self.socket;
        let received = self
            .runtime
            .block_on(async move { tokio::time::timeout(timeout, socket.recv()).await });

        match received {
            Err(_elapsed) => Ok(None),
            Ok(Ok(message)) => {
                self.consecutive_errors = 0;
                Ok(Some(payload_frame(message)))
            }
            Ok(Err(err)) => {
                self.consecutive_errors += 1;
                if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    Err(TransportError::Connection(format!(
                        "{} failed {} receives in a row: {}",
                        self.endpoint, self.consecutive_errors, err
                    )))
                } else {
                    Err(TransportError::Receive(err.to_string()))
                }
            }
        }
    }
}

// Publishers may send [topic, payload]; the payload is always last.
fn payload_frame(message: ZmqMessage) -> Vec<u8> {
    message
        .into_vec()
        .pop()
        .map(|frame| frame.to_vec())
        .unwrap_or_default()
}

pub fn start(
    config: &TransportConfig,
    schema: SchemaKind,
    producer: QueueProducer,
    shutdown: ShutdownToken,
    metrics: Arc<MetricsRecorder>,
) -> Result<ActiveTransport, TransportError> {
    let endpoint = config.zmq_endpoint();
    let recv_timeout = config.recv_timeout();
    let connect_shutdown = shutdown.clone();
    let settings = PollSettings {
        schema,
        producer,
        shutdown,
        recv_timeout,
        metrics,
    };
    info!("starting ZeroMQ listener for {}", endpoint);
    let handle = spawn_poll_listener(
        "zmq",
        move || ZmqFrameSource::connect(&endpoint, &connect_shutdown, recv_timeout),
        settings,
        config.join_timeout(),
    )?;
    Ok(ActiveTransport {
        handle,
        publisher: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::queue::handoff_queue;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn connect_gives_up_when_shutdown_is_signaled() {
        let shutdown = ShutdownToken::new();
        shutdown.signal();
        let result = ZmqFrameSource::connect("tcp://127.0.0.1:1", &shutdown, Duration::from_millis(20));
        assert!(matches!(result, Err(TransportError::Closed)));
    }

    #[test]
    fn listener_stops_while_peer_refuses_connection() {
        let config = TransportConfig {
            host: "127.0.0.1".into(),
            port: Some(1),
            recv_timeout_ms: 50,
            join_timeout_ms: 1_000,
            ..TransportConfig::default()
        };
        let (producer, _queue) = handoff_queue();
        let active = start(
            &config,
            SchemaKind::Flat,
            producer,
            ShutdownToken::new(),
            Arc::new(MetricsRecorder::new()),
        )
        .unwrap();
        assert!(active.publisher.is_none());

        thread::sleep(Duration::from_millis(100));
        assert!(!active.handle.is_finished());

        let started = Instant::now();
        assert!(active.handle.stop());
        assert!(started.elapsed() < Duration::from_millis(1_000));
    }
}
