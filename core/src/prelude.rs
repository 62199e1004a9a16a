pub use crate::processing::queue::{handoff_queue, Inbound, QueueConsumer, QueueProducer, RawPayload};
pub use crate::processing::target::{EntitySlot, TargetConfig, TargetFrame, VisualTarget};
pub use crate::transport::{ShutdownToken, TransportConfig, TransportKind};
pub use crate::wire::{ControlSignal, Decoded, SchemaKind, TelemetryRecord};

/// Failure to turn a raw payload into a [`Decoded`] item.
///
/// Both variants are non-fatal: the caller logs and drops the payload.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
}

/// Errors raised by a transport listener.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("receive error: {0}")]
    Receive(String),
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// Fatal errors end the listener thread; the rest are logged and skipped.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::Receive(_))
    }
}

/// Errors raised while publishing the bootstrap message.
#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("publish rejected: {0}")]
    Rejected(String),
    #[error("failed to serialize bootstrap: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Invalid configuration values.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid target config: {0}")]
    InvalidTarget(String),
    #[error("invalid tick config: {0}")]
    InvalidTick(String),
}

pub type DecodeResult<T> = Result<T, DecodeError>;

/// Receives target frames from the tick consumer. Only the consumer writes to
/// a sink, so implementations need no locking of their own.
pub trait VisualStateSink {
    fn apply(&mut self, frame: &TargetFrame);
}

/// Write-back path used by the handshake to send the bootstrap message.
pub trait BootstrapPublisher: Send {
    fn publish(&mut self, payload: &[u8]) -> Result<(), PublishError>;

    /// Destination name used in log lines.
    fn destination(&self) -> String;
}

impl<S: VisualStateSink + ?Sized> VisualStateSink for Box<S> {
    fn apply(&mut self, frame: &TargetFrame) {
        (**self).apply(frame)
    }
}
