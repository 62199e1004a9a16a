use crate::prelude::{ConfigError, VisualStateSink};
use crate::processing::handshake::{HandshakeController, HandshakeOutcome, HandshakeState};
use crate::processing::queue::{Inbound, QueueConsumer};
use crate::processing::target::{derive_frame, TargetConfig, TargetFrame};
use crate::telemetry::{LogManager, MetricsRecorder};
use crate::wire::{decode, ControlSignal, Decoded, SchemaKind, READY_SENTINEL};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What to do when more items are pending than one tick may process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Process the oldest `cap` items and leave the rest for later ticks.
    #[default]
    Defer,
    /// Discard the oldest telemetry beyond `cap`. Control messages are kept
    /// so a burst cannot swallow the READY signal.
    DropOldest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    pub interval_ms: u64,
    pub max_items_per_tick: Option<usize>,
    pub overflow: OverflowPolicy,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval_ms: 16,
            max_items_per_tick: Some(256),
            overflow: OverflowPolicy::Defer,
        }
    }
}

impl TickConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms == 0 {
            return Err(ConfigError::InvalidTick("interval_ms must be positive".into()));
        }
        if self.max_items_per_tick == Some(0) {
            return Err(ConfigError::InvalidTick(
                "max_items_per_tick must be positive when set".into(),
            ));
        }
        Ok(())
    }
}

/// Summary of one `tick` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub processed: usize,
    pub telemetry: usize,
    pub control: usize,
    pub decode_failures: usize,
    pub overflow_dropped: usize,
    pub bootstrapped: bool,
}

/// Periodic, non-blocking consumer of the handoff queue.
///
/// Each `tick` drains pending items (bounded by the tick cap), decodes raw
/// payloads, routes READY to the handshake and turns telemetry into a new
/// [`TargetFrame`] for the sink. Nothing here animates: the sink owns any
/// smoothing toward the targets.
pub struct TickConsumer<S: VisualStateSink> {
    queue: QueueConsumer,
    schema: SchemaKind,
    targets: TargetConfig,
    tick: TickConfig,
    handshake: HandshakeController,
    sink: S,
    frame: TargetFrame,
    metrics: Arc<MetricsRecorder>,
    logger: LogManager,
}

impl<S: VisualStateSink> TickConsumer<S> {
    pub fn new(
        queue: QueueConsumer,
        schema: SchemaKind,
        targets: TargetConfig,
        tick: TickConfig,
        handshake: HandshakeController,
        sink: S,
        metrics: Arc<MetricsRecorder>,
    ) -> Result<Self, ConfigError> {
        targets.validate()?;
        tick.validate()?;
        Ok(Self {
            queue,
            schema,
            targets,
            tick,
            handshake,
            sink,
            frame: TargetFrame::default(),
            metrics,
            logger: LogManager::new("consumer"),
        })
    }

    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        let batch = self.take_batch(&mut report);

        for item in batch {
            report.processed += 1;
            let Some(decoded) = self.resolve(item, &mut report) else {
                continue;
            };
            match decoded {
                Decoded::Control(ControlSignal::Ready) => {
                    report.control += 1;
                    if let HandshakeOutcome::Bootstrapped { published } = self.handshake.on_ready() {
                        report.bootstrapped = true;
                        self.logger
                            .record(&format!("session bootstrapped, bootstrap sent: {}", published));
                    }
                }
                Decoded::Telemetry(record) => {
                    report.telemetry += 1;
                    let next = derive_frame(&self.frame, &record, &self.targets);
                    self.sink.apply(&next);
                    self.logger.sampled(|| describe_frame(&next));
                    self.frame = next;
                }
            }
        }

        report
    }

    fn take_batch(&mut self, report: &mut TickReport) -> Vec<Inbound> {
        let Some(cap) = self.tick.max_items_per_tick else {
            return self.queue.drain_all();
        };

        match self.tick.overflow {
            OverflowPolicy::Defer => self.queue.drain_up_to(cap),
            OverflowPolicy::DropOldest => {
                let mut batch = self.queue.drain_all();
                let mut excess = batch.len().saturating_sub(cap);
                if excess == 0 {
                    return batch;
                }
                let mut dropped = 0;
                batch.retain(|item| {
                    if excess > 0 && !is_control(item) {
                        excess -= 1;
                        dropped += 1;
                        false
                    } else {
                        true
                    }
                });
                report.overflow_dropped = dropped;
                self.metrics.record_overflow(dropped);
                self.logger.warn(&format!(
                    "tick backlog over cap {}, dropped {} oldest items",
                    cap, dropped
                ));
                batch
            }
        }
    }

    fn resolve(&self, item: Inbound, report: &mut TickReport) -> Option<Decoded> {
        match item {
            Inbound::Decoded(decoded) => Some(decoded),
            Inbound::Raw(raw) => {
                self.metrics.record_received();
                match decode(&raw.bytes, self.schema) {
                    Ok(decoded) => {
                        self.metrics.record_decoded();
                        Some(decoded)
                    }
                    Err(err) => {
                        report.decode_failures += 1;
                        self.metrics.record_decode_failure();
                        self.logger.warn(&format!(
                            "dropping payload from {}: {}",
                            raw.topic.as_deref().unwrap_or("<untopiced>"),
                            err
                        ));
                        None
                    }
                }
            }
        }
    }

    pub fn frame(&self) -> &TargetFrame {
        &self.frame
    }

    pub fn handshake_state(&self) -> HandshakeState {
        self.handshake.state()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }
}

fn is_control(item: &Inbound) -> bool {
    match item {
        Inbound::Decoded(decoded) => matches!(decoded, Decoded::Control(_)),
        Inbound::Raw(raw) => std::str::from_utf8(&raw.bytes)
            .map(|text| text.trim() == READY_SENTINEL)
            .unwrap_or(false),
    }
}

fn describe_frame(frame: &TargetFrame) -> String {
    let parts: Vec<String> = frame
        .entities
        .iter()
        .map(|(slot, target)| {
            format!(
                "{:?}: {:.3} ({})",
                slot,
                target.scale,
                target.status.as_deref().unwrap_or(if target.collapsed {
                    "collapsed"
                } else {
                    "ok"
                })
            )
        })
        .collect();
    format!("frame #{} {}", frame.sequence, parts.join(" | "))
}
