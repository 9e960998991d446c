use std::fmt;
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender};

use crate::shared::params::Params;
use crate::sink::domain::sink_state::SinkState;
use crate::writer::domain::media_writer::StreamInfo;

/// Change notification published by the engine or its active backend.
///
/// Each variant carries the new value only.
#[derive(Clone, Debug, PartialEq)]
pub enum SinkEvent {
    LocationChanged(String),
    DefaultFormatChanged(String),
    OutputFormatChanged(String),
    FormatOptionsChanged(Params),
    CodecOptionsChanged { index: usize, options: Params },
    StreamsChanged(Vec<StreamInfo>),
    FormatsBlacklistChanged(Vec<String>),
    CodecsBlacklistChanged(Vec<String>),
    SupportedFormatsChanged(Vec<String>),
    BackendChanged(String),
    StateChanged(SinkState),
}

/// Fan-out of `SinkEvent`s to any number of channel subscribers.
///
/// The engine owns one bus and hands clones to each backend it loads, so
/// backend events reach the engine's subscribers unchanged. Subscribers whose
/// receiver was dropped are pruned on the next publish.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<SinkEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<SinkEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    pub fn publish(&self, event: SinkEvent) {
        log::debug!("Sink event: {event:?}");
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
