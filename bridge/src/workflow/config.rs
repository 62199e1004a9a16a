use anyhow::Context;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use twincore::processing::{TargetConfig, TickConfig};
use twincore::transport::{TransportConfig, TransportKind};
use twincore::wire::{BootstrapConfig, SchemaKind};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub transport: TransportConfig,
    pub schema: SchemaKind,
    /// Overrides the schema's default target mapping when present.
    pub targets: Option<TargetConfig>,
    pub tick: TickConfig,
    pub bootstrap: BootstrapConfig,
    /// Passed through to the renderer; the bridge never animates.
    pub smoothing_rate: f32,
    pub http_bind: SocketAddr,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let transport = TransportConfig {
            client_id: random_client_id(),
            ..TransportConfig::default()
        };
        Self {
            transport,
            schema: SchemaKind::Flat,
            targets: None,
            tick: TickConfig::default(),
            bootstrap: BootstrapConfig::default(),
            smoothing_rate: 5.0,
            http_bind: SocketAddr::from(([127, 0, 0, 1], 9000)),
        }
    }
}

fn random_client_id() -> String {
    format!("twinbridge_{}", rand::thread_rng().gen_range(1000..10000))
}

impl BridgeConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading bridge config {}", path_ref.display()))?;
        let config: BridgeConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing bridge config {}", path_ref.display()))?;
        config
            .validate()
            .with_context(|| format!("validating bridge config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(
        kind: TransportKind,
        host: &str,
        port: Option<u16>,
        schema: SchemaKind,
    ) -> Self {
        let defaults = Self::default();
        Self {
            transport: TransportConfig {
                kind,
                host: host.to_string(),
                port,
                ..defaults.transport.clone()
            },
            schema,
            ..defaults
        }
    }

    pub fn target_config(&self) -> TargetConfig {
        self.targets
            .unwrap_or_else(|| TargetConfig::for_schema(self.schema))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.target_config().validate()?;
        self.tick.validate()?;
        if self.transport.host.trim().is_empty() {
            anyhow::bail!("transport host must not be empty");
        }
        if !self.smoothing_rate.is_finite() || self.smoothing_rate < 0.0 {
            anyhow::bail!("smoothing_rate must be a non-negative number");
        }
        Ok(())
    }
}
