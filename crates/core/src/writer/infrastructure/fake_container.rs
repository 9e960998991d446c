use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::shared::caps::MediaKind;
use crate::shared::error::SinkError;
use crate::shared::packet::Packet;
use crate::writer::domain::media_writer::MediaWriter;

use super::format_table::{CodecSpec, FormatSpec, FormatTable, OptionSpec, OptionValue};
use super::muxing_writer::{ContainerBackend, MuxingWriter, OutputPlan};
use super::packet_worker::PacketMuxer;

static CODECS: &[CodecSpec] = &[
    CodecSpec {
        name: "fakevideo",
        description: "Fake video",
        kind: MediaKind::Video,
        options: &[OptionSpec {
            name: "quality",
            description: "Quality level",
            default: OptionValue::Int(5),
        }],
    },
    CodecSpec {
        name: "fakeaudio",
        description: "Fake audio",
        kind: MediaKind::Audio,
        options: &[],
    },
    CodecSpec {
        name: "fakesub",
        description: "Fake subtitle",
        kind: MediaKind::Subtitle,
        options: &[],
    },
];

static FORMATS: &[FormatSpec] = &[
    FormatSpec {
        name: "fake",
        description: "Fake container",
        extensions: &["fake"],
        codecs: &["fakevideo", "fakeaudio", "fakesub"],
        options: &[],
    },
    FormatSpec {
        name: "fakeav",
        description: "Fake audio/video container",
        extensions: &["fav"],
        codecs: &["fakeaudio", "fakevideo"],
        options: &[],
    },
];

static TABLE: FormatTable = FormatTable {
    formats: FORMATS,
    codecs: CODECS,
    default_format: "fake",
};

/// Counters shared between a test and every writer built from one `FakeContainer`.
#[derive(Debug, Default)]
pub struct FakeCounters {
    pub opened: AtomicUsize,
    pub written: AtomicUsize,
    pub finished: AtomicUsize,
    pub fail_open: AtomicBool,
}

impl FakeCounters {
    pub fn written(&self) -> usize {
        self.written.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }
}

/// In-memory backend that counts the packets it is handed.
#[derive(Clone, Debug, Default)]
pub struct FakeContainer {
    pub counters: Arc<FakeCounters>,
}

impl FakeContainer {
    pub fn writer(&self) -> Box<dyn MediaWriter> {
        Box::new(MuxingWriter::new(self.clone()))
    }
}

impl ContainerBackend for FakeContainer {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn table(&self) -> &'static FormatTable {
        &TABLE
    }

    fn open(&self, _plan: &OutputPlan) -> Result<Box<dyn PacketMuxer>, SinkError> {
        if self.counters.fail_open.load(Ordering::SeqCst) {
            return Err(SinkError::BackendInit("fake open failure".into()));
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeMuxer {
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct FakeMuxer {
    counters: Arc<FakeCounters>,
}

impl PacketMuxer for FakeMuxer {
    fn write_packet(&mut self, _packet: &Packet) -> Result<(), SinkError> {
        self.counters.written.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.counters.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
