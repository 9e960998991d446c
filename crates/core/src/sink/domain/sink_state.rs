use std::fmt;

use serde::{Deserialize, Serialize};

use crate::shared::error::SinkError;
use crate::writer::domain::media_writer::MediaWriter;
use crate::writer::domain::packet_queue::PacketQueue;

/// Pipeline state of the sink.
///
/// Backend resources exist exactly while the state is not `Null`. `Paused`
/// and `Playing` differ only in whether incoming packets are written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkState {
    #[default]
    Null,
    Paused,
    Playing,
}

impl SinkState {
    pub fn is_active(self) -> bool {
        self != SinkState::Null
    }
}

impl fmt::Display for SinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SinkState::Null => "null",
            SinkState::Paused => "paused",
            SinkState::Playing => "playing",
        };
        f.write_str(name)
    }
}

/// Side effect of an accepted state change.
#[derive(Debug)]
pub enum Transition {
    /// Left `Null`; the backend is initialized and accepts packets here.
    Activated(PacketQueue),
    /// Entered `Null`; the backend has been drained and released.
    Deactivated,
    /// Switched between `Paused` and `Playing`.
    Changed,
    Unchanged,
}

/// Null → Paused/Playing → Null lifecycle around a borrowed writer.
#[derive(Debug, Default)]
pub struct SinkStateMachine {
    state: SinkState,
}

impl SinkStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SinkState {
        self.state
    }

    /// Moves to `target`, initializing or releasing the writer on the way.
    ///
    /// Leaving `Null` fails with `NoBackendLoaded` without a writer, or with
    /// the writer's init error; the state stays `Null` in both cases.
    /// Entering `Null` always succeeds.
    pub fn set_state(
        &mut self,
        writer: Option<&mut dyn MediaWriter>,
        target: SinkState,
    ) -> Result<Transition, SinkError> {
        let current = self.state;
        if current == target {
            return Ok(Transition::Unchanged);
        }

        let transition = match (current.is_active(), target.is_active()) {
            (false, true) => {
                let writer = writer.ok_or(SinkError::NoBackendLoaded)?;
                Transition::Activated(writer.init()?)
            }
            (true, false) => {
                if let Some(writer) = writer {
                    writer.uninit();
                }
                Transition::Deactivated
            }
            _ => Transition::Changed,
        };

        log::info!("Sink state {current} -> {target}");
        self.state = target;
        Ok(transition)
    }
}
