pub mod consumer;
pub mod handshake;
pub mod queue;
pub mod target;

pub use consumer::{OverflowPolicy, TickConfig, TickConsumer, TickReport};
pub use handshake::{HandshakeController, HandshakeOutcome, HandshakeState};
pub use queue::{handoff_queue, Inbound, QueueConsumer, QueueProducer, RawPayload};
pub use target::{derive_frame, EntitySlot, TargetConfig, TargetFrame, VisualTarget};
