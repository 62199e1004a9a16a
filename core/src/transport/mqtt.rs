//! MQTT broker listener.
//!
//! The client library's event loop runs on the listener thread. Each incoming
//! publish is handed to a forwarding callback that copies the topic and bytes
//! into the handoff queue and returns; decoding happens later, on the
//! consumer tick, so the event loop is never held up by payload handling.

use crate::prelude::{BootstrapPublisher, PublishError, TransportError};
use crate::processing::queue::{Inbound, QueueProducer, RawPayload};
use crate::transport::{spawn_listener, ActiveTransport, QosLevel, ShutdownToken, TransportConfig};
use log::{debug, error, info, warn};
use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS, RecvTimeoutError};
use std::time::Duration;

const KEEP_ALIVE: Duration = Duration::from_secs(5);
const REQUEST_CAPACITY: usize = 10;

impl From<QosLevel> for QoS {
    fn from(level: QosLevel) -> Self {
        match level {
            QosLevel::AtMostOnce => QoS::AtMostOnce,
            QosLevel::AtLeastOnce => QoS::AtLeastOnce,
        }
    }
}

/// Publishes the bootstrap message on the configured topic, without blocking
/// the caller and without retries.
pub struct MqttPublisher {
    client: Client,
    topic: String,
    qos: QoS,
}

impl BootstrapPublisher for MqttPublisher {
    fn publish(&mut self, payload: &[u8]) -> Result<(), PublishError> {
        self.client
            .try_publish(self.topic.clone(), self.qos, false, payload.to_vec())
            .map_err(|err| PublishError::Rejected(err.to_string()))
    }

    fn destination(&self) -> String {
        self.topic.clone()
    }
}

/// Receive callback: push the raw payload and return.
pub fn forward_to_queue(producer: QueueProducer) -> impl FnMut(&str, &[u8]) + Send + 'static {
    move |topic: &str, payload: &[u8]| {
        if !producer.push(Inbound::Raw(RawPayload::new(
            Some(topic.to_string()),
            payload.to_vec(),
        ))) {
            debug!("consumer gone, discarding message on {}", topic);
        }
    }
}

fn subscribe_all(client: &mut Client, topics: &[String], qos: QoS) -> Result<(), TransportError> {
    for topic in topics {
        client
            .subscribe(topic.clone(), qos)
            .map_err(|err| TransportError::Connection(format!("subscribing to {}: {}", topic, err)))?;
        info!("subscribed to {}", topic);
    }
    Ok(())
}

/// Hands incoming publishes to `on_publish`; everything else is bookkeeping.
fn dispatch<F>(event: Event, on_publish: &mut F)
where
    F: FnMut(&str, &[u8]),
{
    match event {
        Event::Incoming(Packet::Publish(publish)) => on_publish(&publish.topic, &publish.payload),
        Event::Incoming(Packet::ConnAck(ack)) => info!("connected to broker ({:?})", ack.code),
        _ => {}
    }
}

/// Runs until shutdown (`Ok`) or until the connection fails or the event
/// loop closes (`Err`).
fn run_event_loop<F>(
    mut connection: Connection,
    shutdown: &ShutdownToken,
    recv_timeout: Duration,
    mut on_publish: F,
) -> Result<(), TransportError>
where
    F: FnMut(&str, &[u8]),
{
    while !shutdown.is_signaled() {
        match connection.recv_timeout(recv_timeout) {
            Ok(Ok(event)) => dispatch(event, &mut on_publish),
            Ok(Err(err)) => return Err(TransportError::Connection(err.to_string())),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return Err(TransportError::Closed),
        }
    }
    Ok(())
}

pub fn start(
    config: &TransportConfig,
    producer: QueueProducer,
    shutdown: ShutdownToken,
) -> Result<ActiveTransport, TransportError> {
    let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port());
    options.set_keep_alive(KEEP_ALIVE);

    let qos = QoS::from(config.qos);
    let (mut client, connection) = Client::new(options, REQUEST_CAPACITY);
    subscribe_all(&mut client, &config.subscriptions(), qos)?;
    info!(
        "starting MQTT listener for {}:{} as {}",
        config.host,
        config.port(),
        config.client_id
    );

    let recv_timeout = config.recv_timeout();
    let on_publish = forward_to_queue(producer);
    let loop_shutdown = shutdown.clone();
    let mut releaser = client.clone();
    let handle = spawn_listener("mqtt", shutdown, config.join_timeout(), move || {
        match run_event_loop(connection, &loop_shutdown, recv_timeout, on_publish) {
            Ok(()) => info!("mqtt listener exited on shutdown"),
            Err(TransportError::Closed) => warn!("broker event loop closed"),
            Err(err) => error!("broker connection lost: {}", err),
        }
    })?
    .with_release(move || {
        if let Err(err) = releaser.try_disconnect() {
            debug!("disconnect request not queued: {}", err);
        }
    });

    let publisher = MqttPublisher {
        client,
        topic: config.bootstrap_topic.clone(),
        qos,
    };
    Ok(ActiveTransport {
        handle,
        publisher: Some(Box::new(publisher)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::queue::handoff_queue;
    use crate::transport::TransportKind;
    use rumqttc::{Outgoing, Publish};
    use std::thread;
    use std::time::Instant;

    #[test]
    fn qos_levels_map_to_client_qos() {
        assert_eq!(QoS::from(QosLevel::AtMostOnce), QoS::AtMostOnce);
        assert_eq!(QoS::from(QosLevel::AtLeastOnce), QoS::AtLeastOnce);
    }

    #[test]
    fn callback_forwards_raw_bytes_without_decoding() {
        let (producer, mut consumer) = handoff_queue();
        let mut callback = forward_to_queue(producer);
        callback("digitaltwin/system/status", b"READY");
        callback("digitaltwin/breast/tumor", b"{not json");

        let items = consumer.drain_all();
        assert_eq!(
            items,
            vec![
                Inbound::Raw(RawPayload::new(
                    Some("digitaltwin/system/status".into()),
                    b"READY".to_vec()
                )),
                Inbound::Raw(RawPayload::new(
                    Some("digitaltwin/breast/tumor".into()),
                    b"{not json".to_vec()
                )),
            ]
        );
    }

    fn publish_event(topic: &str, payload: &[u8]) -> Event {
        Event::Incoming(Packet::Publish(Publish::new(topic, QoS::AtMostOnce, payload.to_vec())))
    }

    #[test]
    fn dispatch_forwards_publishes_only() {
        let mut seen: Vec<(String, Vec<u8>)> = Vec::new();
        let mut record = |topic: &str, payload: &[u8]| seen.push((topic.to_string(), payload.to_vec()));

        dispatch(publish_event("digitaltwin/system/status", b"READY"), &mut record);
        dispatch(Event::Incoming(Packet::PingResp), &mut record);
        dispatch(Event::Outgoing(Outgoing::PingReq), &mut record);
        dispatch(publish_event("digitaltwin/breast/tumor", b"{}"), &mut record);

        assert_eq!(
            seen,
            vec![
                ("digitaltwin/system/status".to_string(), b"READY".to_vec()),
                ("digitaltwin/breast/tumor".to_string(), b"{}".to_vec()),
            ]
        );
    }

    #[test]
    fn dispatched_publish_reaches_queue_raw() {
        let (producer, mut consumer) = handoff_queue();
        let mut callback = forward_to_queue(producer);
        dispatch(publish_event("digitaltwin/breast/tumor", b"{\"id\":1}"), &mut callback);
        assert_eq!(
            consumer.drain_all(),
            vec![Inbound::Raw(RawPayload::new(
                Some("digitaltwin/breast/tumor".into()),
                b"{\"id\":1}".to_vec()
            ))]
        );
    }

    #[test]
    fn refused_broker_ends_listener_and_stop_is_prompt() {
        let config = TransportConfig {
            kind: TransportKind::Mqtt,
            host: "127.0.0.1".into(),
            port: Some(1),
            recv_timeout_ms: 50,
            join_timeout_ms: 1_000,
            ..TransportConfig::default()
        };
        let (producer, _queue) = handoff_queue();
        let active = start(&config, producer, ShutdownToken::new()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(3);
        while !active.handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(active.handle.is_finished());

        let mut publisher = active.publisher.unwrap();
        assert_eq!(publisher.destination(), "digitaltwin/breast/bootstrap");
        assert!(matches!(
            publisher.publish(b"{}"),
            Err(PublishError::Rejected(_))
        ));

        let started = Instant::now();
        assert!(active.handle.stop());
        assert!(started.elapsed() < config.join_timeout());
    }

    #[test]
    fn callback_survives_dropped_consumer() {
        let (producer, consumer) = handoff_queue();
        drop(consumer);
        let mut callback = forward_to_queue(producer);
        callback("digitaltwin/breast/tumor", b"{}");
    }
}
