use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

use crate::shared::error::SinkError;
use crate::shared::packet::Packet;
use crate::writer::domain::packet_queue::PacketQueue;

/// Output side of an opened container, driven by a `PacketWorker`.
pub trait PacketMuxer: Send {
    fn write_packet(&mut self, packet: &Packet) -> Result<(), SinkError>;

    /// Writes trailers and flushes buffered data.
    fn finish(&mut self) -> Result<(), SinkError>;
}

/// Packet counts reported when a worker shuts down.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub written: u64,
    pub failed: u64,
}

/// Dedicated thread that owns a `PacketMuxer` and performs all blocking
/// output I/O, so packet producers never wait on the disk.
pub struct PacketWorker {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<Result<WorkerStats, SinkError>>>,
}

impl PacketWorker {
    pub fn spawn(
        name: &str,
        muxer: Box<dyn PacketMuxer>,
        capacity: usize,
    ) -> Result<(Self, PacketQueue), SinkError> {
        let (queue, packet_rx) = PacketQueue::bounded(capacity);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

        let handle = std::thread::Builder::new()
            .name(format!("{name}-writer"))
            .spawn(move || run(muxer, packet_rx, stop_rx))
            .map_err(|e| SinkError::BackendInit(format!("failed to spawn writer thread: {e}")))?;

        Ok((
            Self {
                stop_tx,
                handle: Some(handle),
            },
            queue,
        ))
    }

    /// Stops the worker after it has written every packet queued so far,
    /// then finalizes the output.
    pub fn stop(mut self) -> Result<WorkerStats, SinkError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<WorkerStats, SinkError> {
        let Some(handle) = self.handle.take() else {
            return Ok(WorkerStats::default());
        };
        let _ = self.stop_tx.send(());
        handle
            .join()
            .map_err(|_| SinkError::Worker("writer thread panicked".into()))?
    }
}

impl Drop for PacketWorker {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("Writer shutdown failed: {e}");
        }
    }
}

fn run(
    mut muxer: Box<dyn PacketMuxer>,
    packet_rx: Receiver<Packet>,
    stop_rx: Receiver<()>,
) -> Result<WorkerStats, SinkError> {
    let mut stats = WorkerStats::default();

    loop {
        crossbeam_channel::select! {
            recv(packet_rx) -> msg => match msg {
                Ok(packet) => write_one(&mut *muxer, &packet, &mut stats),
                Err(_) => break,
            },
            recv(stop_rx) -> _ => break,
        }
    }

    // Drain whatever was queued before the stop signal.
    for packet in packet_rx.try_iter() {
        write_one(&mut *muxer, &packet, &mut stats);
    }

    muxer.finish()?;
    Ok(stats)
}

fn write_one(muxer: &mut dyn PacketMuxer, packet: &Packet, stats: &mut WorkerStats) {
    match muxer.write_packet(packet) {
        Ok(()) => stats.written += 1,
        Err(e) => {
            stats.failed += 1;
            if stats.failed == 1 {
                log::warn!("Failed to write packet for stream {}: {e}", packet.index);
            } else {
                log::debug!("Failed to write packet for stream {}: {e}", packet.index);
            }
        }
    }
}
