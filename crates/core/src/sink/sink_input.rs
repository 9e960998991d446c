use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use crate::shared::packet::Packet;
use crate::sink::domain::sink_state::SinkState;
use crate::writer::domain::packet_queue::PacketQueue;

#[derive(Debug, Default)]
struct DispatchTable {
    state: SinkState,
    accepted: HashSet<usize>,
    queue: Option<PacketQueue>,
}

/// Packet entry point of a sink, shareable with media threads.
///
/// Holds a snapshot of the sink's state, accepted stream indices and packet
/// queue. The control path rewrites the snapshot only on state or stream
/// changes, so delivery normally takes an uncontended read lock.
#[derive(Clone, Debug, Default)]
pub struct SinkInput {
    table: Arc<RwLock<DispatchTable>>,
}

impl SinkInput {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Hands `packet` to the backend when the sink is playing and the
    /// packet's stream is registered. Drops it silently otherwise.
    pub fn i_stream(&self, packet: Packet) {
        let Ok(table) = self.table.read() else {
            return;
        };
        if table.state != SinkState::Playing || !table.accepted.contains(&packet.index) {
            return;
        }
        if let Some(queue) = &table.queue {
            queue.enqueue_packet(packet);
        }
    }

    pub fn state(&self) -> SinkState {
        self.table
            .read()
            .map(|t| t.state)
            .unwrap_or_default()
    }

    pub fn accepts(&self, index: usize) -> bool {
        self.table
            .read()
            .map(|t| t.accepted.contains(&index))
            .unwrap_or(false)
    }

    /// Packets queued for the backend and not yet written.
    pub fn pending(&self) -> usize {
        self.table
            .read()
            .ok()
            .and_then(|t| t.queue.as_ref().map(PacketQueue::len))
            .unwrap_or(0)
    }

    pub(crate) fn set_state(&self, state: SinkState) {
        if let Ok(mut table) = self.table.write() {
            table.state = state;
        }
    }

    pub(crate) fn set_accepted(&self, accepted: HashSet<usize>) {
        if let Ok(mut table) = self.table.write() {
            table.accepted = accepted;
        }
    }

    pub(crate) fn attach(&self, state: SinkState, queue: PacketQueue) {
        if let Ok(mut table) = self.table.write() {
            table.state = state;
            table.queue = Some(queue);
        }
    }

    /// Stops delivery. Returns once no `i_stream` call is mid-flight.
    pub(crate) fn detach(&self) {
        if let Ok(mut table) = self.table.write() {
            table.state = SinkState::Null;
            table.queue = None;
        }
    }
}
