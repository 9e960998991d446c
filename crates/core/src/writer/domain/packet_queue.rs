use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::shared::packet::Packet;

/// Non-blocking hand-off from the dispatch path to a backend worker.
///
/// Returned by `MediaWriter::init` and valid until the matching `uninit`.
/// Cloning is cheap; every clone feeds the same worker.
#[derive(Clone, Debug)]
pub struct PacketQueue {
    tx: Sender<Packet>,
}

impl PacketQueue {
    pub fn bounded(capacity: usize) -> (Self, Receiver<Packet>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queues a packet for the worker. Returns `false` when the packet was
    /// dropped because the queue is full or the worker is gone.
    pub fn enqueue_packet(&self, packet: Packet) -> bool {
        match self.tx.try_send(packet) {
            Ok(()) => true,
            Err(TrySendError::Full(p)) => {
                log::debug!("Packet queue full, dropping packet for stream {}", p.index);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_delivers_in_order() {
        let (queue, rx) = PacketQueue::bounded(4);
        assert!(queue.enqueue_packet(Packet::new(0, vec![1])));
        assert!(queue.enqueue_packet(Packet::new(1, vec![2])));

        let received: Vec<_> = rx.try_iter().map(|p| p.index).collect();
        assert_eq!(received, vec![0, 1]);
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let (queue, rx) = PacketQueue::bounded(1);
        assert!(queue.enqueue_packet(Packet::new(0, vec![])));
        assert!(!queue.enqueue_packet(Packet::new(0, vec![])));
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn test_disconnected_worker_drops() {
        let (queue, rx) = PacketQueue::bounded(4);
        drop(rx);
        assert!(!queue.enqueue_packet(Packet::new(0, vec![])));
    }
}
