use crate::wire::Decoded;
use log::debug;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

/// Undecoded payload handed over by a callback transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload {
    pub topic: Option<String>,
    pub bytes: Vec<u8>,
}

impl RawPayload {
    pub fn new(topic: Option<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            topic,
            bytes: bytes.into(),
        }
    }
}

/// Item carried from a transport thread to the tick consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Raw(RawPayload),
    Decoded(Decoded),
}

/// Creates the single-consumer FIFO. The producer half can be cloned for
/// each transport thread; the consumer half cannot.
pub fn handoff_queue() -> (QueueProducer, QueueConsumer) {
    let (tx, rx) = mpsc::unbounded_channel();
    (QueueProducer { tx }, QueueConsumer { rx })
}

#[derive(Debug, Clone)]
pub struct QueueProducer {
    tx: UnboundedSender<Inbound>,
}

impl QueueProducer {
    /// Never blocks. Returns `false` once the consumer has been dropped.
    pub fn push(&self, item: Inbound) -> bool {
        match self.tx.send(item) {
            Ok(()) => true,
            Err(_) => {
                debug!("handoff queue closed, dropping item");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Debug)]
pub struct QueueConsumer {
    rx: UnboundedReceiver<Inbound>,
}

impl QueueConsumer {
    pub fn try_dequeue_one(&mut self) -> Option<Inbound> {
        match self.rx.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Everything pending right now, oldest first.
    pub fn drain_all(&mut self) -> Vec<Inbound> {
        let mut items = Vec::new();
        while let Some(item) = self.try_dequeue_one() {
            items.push(item);
        }
        items
    }

    /// At most `max` pending items, oldest first; the rest stay queued.
    pub fn drain_up_to(&mut self, max: usize) -> Vec<Inbound> {
        let mut items = Vec::with_capacity(max.min(64));
        while items.len() < max {
            match self.try_dequeue_one() {
                Some(item) => items.push(item),
                None => break,
            }
        }
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    fn raw(producer: usize, seq: usize) -> Inbound {
        Inbound::Raw(RawPayload::new(
            Some(format!("p{}", producer)),
            seq.to_le_bytes().to_vec(),
        ))
    }

    fn unpack(item: &Inbound) -> (usize, usize) {
        match item {
            Inbound::Raw(payload) => {
                let producer = payload.topic.as_deref().unwrap()[1..].parse().unwrap();
                let mut bytes = [0u8; std::mem::size_of::<usize>()];
                bytes.copy_from_slice(&payload.bytes);
                (producer, usize::from_le_bytes(bytes))
            }
            other => panic!("unexpected item {:?}", other),
        }
    }

    #[test]
    fn single_producer_is_fifo() {
        let (producer, mut consumer) = handoff_queue();
        for seq in 0..10 {
            assert!(producer.push(raw(0, seq)));
        }
        let drained = consumer.drain_all();
        let order: Vec<usize> = drained.iter().map(|item| unpack(item).1).collect();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
        assert!(consumer.try_dequeue_one().is_none());
    }

    #[test]
    fn drain_up_to_leaves_remainder_queued() {
        let (producer, mut consumer) = handoff_queue();
        for seq in 0..5 {
            producer.push(raw(0, seq));
        }
        assert_eq!(consumer.drain_up_to(3).len(), 3);
        let rest = consumer.drain_all();
        assert_eq!(rest.len(), 2);
        assert_eq!(unpack(&rest[0]).1, 3);
    }

    #[test]
    fn concurrent_producers_lose_and_duplicate_nothing() {
        const PRODUCERS: usize = 8;
        const PER_PRODUCER: usize = 5_000;

        let (producer, mut consumer) = handoff_queue();
        let workers: Vec<_> = (0..PRODUCERS)
            .map(|id| {
                let producer = producer.clone();
                thread::spawn(move || {
                    for seq in 0..PER_PRODUCER {
                        assert!(producer.push(raw(id, seq)));
                    }
                })
            })
            .collect();

        // Drain while the producers are still pushing.
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut drained = Vec::with_capacity(PRODUCERS * PER_PRODUCER);
        while drained.len() < PRODUCERS * PER_PRODUCER && Instant::now() < deadline {
            drained.extend(consumer.drain_all());
            thread::yield_now();
        }
        for worker in workers {
            worker.join().unwrap();
        }
        drained.extend(consumer.drain_all());
        assert_eq!(drained.len(), PRODUCERS * PER_PRODUCER);

        let mut next_expected = vec![0usize; PRODUCERS];
        for item in &drained {
            let (id, seq) = unpack(item);
            assert_eq!(seq, next_expected[id], "producer {} out of order", id);
            next_expected[id] += 1;
        }
        assert!(next_expected.iter().all(|&n| n == PER_PRODUCER));
    }

    #[test]
    fn push_after_consumer_dropped_reports_closed() {
        let (producer, consumer) = handoff_queue();
        drop(consumer);
        assert!(producer.is_closed());
        assert!(!producer.push(raw(0, 0)));
    }
}
