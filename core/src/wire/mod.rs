pub mod bootstrap;
pub mod decoder;
pub mod record;

pub use bootstrap::{BootstrapConfig, BootstrapMessage};
pub use decoder::{decode, decode_str, SchemaKind, READY_SENTINEL};
pub use record::{
    Classification, ControlSignal, Decoded, EntityState, MultiEntityRecord, SingleEntityRecord,
    TelemetryRecord,
};
