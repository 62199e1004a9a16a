use clap::{Parser, ValueEnum};
use generator::profile::{build_session, GeneratorConfig};
use gui_bridge::bridge::GuiBridge;
use std::path::PathBuf;
use std::sync::Arc;
use twincore::processing::handoff_queue;
use twincore::telemetry::MetricsRecorder;
use twincore::transport::TransportKind;
use twincore::wire::SchemaKind;
use workflow::config::BridgeConfig;
use workflow::runner::{LoggingPublisher, Runner};

mod generator;
mod gui_bridge;
mod workflow;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TransportArg {
    Zmq,
    Mqtt,
}

impl From<TransportArg> for TransportKind {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Zmq => TransportKind::Zmq,
            TransportArg::Mqtt => TransportKind::Mqtt,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SchemaArg {
    Flat,
    Nested,
}

impl From<SchemaArg> for SchemaKind {
    fn from(arg: SchemaArg) -> Self {
        match arg {
            SchemaArg::Flat => SchemaKind::Flat,
            SchemaArg::Nested => SchemaKind::Nested,
        }
    }
}

#[derive(Parser)]
#[command(author, version, about = "Telemetry-to-render-state bridge for the tumor digital twin")]
struct Args {
    /// Load the bridge config from YAML (overrides the transport flags)
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = TransportArg::Zmq)]
    transport: TransportArg,
    #[arg(long, default_value = "localhost")]
    host: String,
    /// Defaults to 5555 for ZeroMQ and 1883 for MQTT
    #[arg(long)]
    port: Option<u16>,
    #[arg(long, value_enum, default_value_t = SchemaArg::Flat)]
    schema: SchemaArg,
    /// Replay a synthetic edge session instead of connecting
    #[arg(long, default_value_t = false)]
    offline: bool,
    #[arg(long, default_value_t = 50)]
    frames: usize,
    /// Expose the latest targets over HTTP
    #[arg(long, default_value_t = false)]
    serve: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match args.config {
        Some(path) => BridgeConfig::load(path)?,
        None => {
            let config = BridgeConfig::from_args(
                args.transport.into(),
                &args.host,
                args.port,
                args.schema.into(),
            );
            config.validate()?;
            config
        }
    };

    let runner = Runner::new(config.clone());
    let (producer, queue) = handoff_queue();
    let metrics = Arc::new(MetricsRecorder::new());
    let gui_bridge = GuiBridge::new(producer.clone(), config.smoothing_rate);
    if args.serve {
        gui_bridge.serve(config.http_bind)?;
    }

    if args.offline {
        let publisher = LoggingPublisher::default();
        let mut consumer = runner.build_consumer(
            queue,
            Some(Box::new(publisher.clone())),
            gui_bridge.sink(),
            metrics,
        )?;
        let session = build_session(&GeneratorConfig {
            frames: args.frames,
            schema: config.schema,
            dose_at_frame: Some(args.frames / 2),
            ..Default::default()
        })?;
        let result = runner.execute_offline(&mut consumer, &producer, &session)?;

        println!(
            "Offline run -> ticks {}, telemetry {}, control {}, decode failures {}, handshake {:?}",
            result.ticks,
            result.telemetry,
            result.control,
            result.decode_failures,
            result.handshake
        );
        if result.bootstrapped {
            if let Some(payload) = publisher.last_payload() {
                println!("  bootstrap: {}", String::from_utf8_lossy(&payload));
            }
        }
        for (slot, target) in &result.frame.entities {
            println!(
                "  {:?}: scale {:.3}{}",
                slot,
                target.scale,
                if target.collapsed { " (collapsed)" } else { "" }
            );
        }
        gui_bridge.publish_status(&format!(
            "Offline session results ready ({} payloads received).",
            result.metrics.received
        ));

        if args.serve {
            gui_bridge.publish_status("HTTP bridge running (Ctrl+C to stop)...");
            runner.run_until_interrupted(&mut consumer, None)?;
        }
        return Ok(());
    }

    let active = runner.start_transport(producer, metrics.clone())?;
    let mut consumer =
        runner.build_consumer(queue, active.publisher, gui_bridge.sink(), metrics)?;
    gui_bridge.publish_status("Waiting for READY from the simulation (Ctrl+C to stop)...");
    let snapshot = runner.run_until_interrupted(&mut consumer, Some(active.handle))?;

    println!(
        "Session ended -> received {}, decoded {}, decode failures {}, dropped {}, bootstraps {}",
        snapshot.received,
        snapshot.decoded,
        snapshot.decode_failures,
        snapshot.overflow_dropped,
        snapshot.bootstraps_published
    );
    Ok(())
}
