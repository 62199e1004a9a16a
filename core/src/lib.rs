//! Telemetry ingestion core for the breast-tumor digital twin.
//!
//! A transport listener receives payloads on its own thread, the handoff
//! queue carries them to a single consumer, and the tick consumer turns each
//! decoded record into visual targets for an external renderer.

pub mod math;
pub mod prelude;
pub mod processing;
pub mod telemetry;
pub mod transport;
pub mod wire;

pub use prelude::{
    BootstrapPublisher, ConfigError, DecodeError, PublishError, TransportError, VisualStateSink,
};
pub use processing::{HandshakeController, TickConfig, TickConsumer, TickReport};
pub use wire::decode;
