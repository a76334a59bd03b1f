//! Thread-safe inbound packet queue decoupling network I/O from the
//! session tick loop. A dedicated I/O thread enqueues packets as they
//! arrive; the tick loop drains whatever is available at the start of
//! each tick before touching client or game state.

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};

/// A received packet, tagged with the address it came from so the
/// session can resolve it to a client slot (or treat it as an
/// out-of-band connectionless packet) before decoding.
#[derive(Debug, Clone)]
pub struct QueuedPacket {
    pub from: String,
    pub data: Vec<u8>,
    pub timestamp: i64,
}

impl QueuedPacket {
    pub fn new(from: String, data: Vec<u8>, timestamp: i64) -> Self {
        Self { from, data, timestamp }
    }
}

/// Bounded channel pair; a full queue drops new packets rather than
/// blocking the I/O thread, matching the source's "producer never
/// blocks" backpressure policy.
pub struct PacketQueue {
    sender: Sender<QueuedPacket>,
    receiver: Receiver<QueuedPacket>,
}

impl PacketQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self { sender, receiver }
    }

    pub fn sender(&self) -> PacketQueueSender {
        PacketQueueSender { sender: self.sender.clone() }
    }

    pub fn try_recv(&self) -> Option<QueuedPacket> {
        self.receiver.try_recv().ok()
    }

    /// Drains every packet currently queued, oldest first -- what the
    /// tick loop's network-drain step calls once per tick.
    pub fn drain(&self) -> Vec<QueuedPacket> {
        let mut out = Vec::new();
        while let Ok(p) = self.receiver.try_recv() {
            out.push(p);
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }
}

#[derive(Clone)]
pub struct PacketQueueSender {
    sender: Sender<QueuedPacket>,
}

impl PacketQueueSender {
    /// Returns `true` if enqueued, `false` if the queue was full and the
    /// packet was dropped.
    pub fn try_send(&self, packet: QueuedPacket) -> bool {
        match self.sender.try_send(packet) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
pub const MAX_QUEUE_CAPACITY: usize = 4096;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_packets_in_arrival_order() {
        let q = PacketQueue::new(DEFAULT_QUEUE_CAPACITY);
        let tx = q.sender();
        tx.try_send(QueuedPacket::new("10.0.0.1:27960".to_string(), vec![1], 0));
        tx.try_send(QueuedPacket::new("10.0.0.1:27960".to_string(), vec![2], 1));
        let drained = q.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].data, vec![1]);
        assert_eq!(drained[1].data, vec![2]);
        assert!(q.is_empty());
    }

    #[test]
    fn full_queue_drops_new_packets_instead_of_blocking() {
        let q = PacketQueue::new(1);
        let tx = q.sender();
        assert!(tx.try_send(QueuedPacket::new("a".to_string(), vec![], 0)));
        assert!(!tx.try_send(QueuedPacket::new("a".to_string(), vec![], 0)));
        assert_eq!(q.len(), 1);
    }
}
