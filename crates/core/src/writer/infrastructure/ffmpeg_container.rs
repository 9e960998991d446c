use std::collections::HashMap;

use ffmpeg_next::{codec::Id, ffi, format::context::Output, Dictionary, Rational};
use serde_json::Value;

use crate::shared::caps::MediaKind;
use crate::shared::error::SinkError;
use crate::shared::packet::{Packet, TimeBase};
use crate::shared::params;
use crate::writer::domain::media_writer::StreamInfo;
use crate::writer::infrastructure::format_table::{
    CodecSpec, FormatSpec, FormatTable, OptionSpec, OptionValue,
};
use crate::writer::infrastructure::muxing_writer::{ContainerBackend, OutputPlan};
use crate::writer::infrastructure::packet_worker::PacketMuxer;

const BITRATE: OptionSpec = OptionSpec {
    name: "bitrate",
    description: "Target bit rate in bits per second (0 = unspecified)",
    default: OptionValue::Int(0),
};

static CODECS: &[CodecSpec] = &[
    CodecSpec {
        name: "h264",
        description: "H.264 / AVC / MPEG-4 AVC / MPEG-4 part 10",
        kind: MediaKind::Video,
        options: &[BITRATE],
    },
    CodecSpec {
        name: "hevc",
        description: "H.265 / HEVC (High Efficiency Video Coding)",
        kind: MediaKind::Video,
        options: &[BITRATE],
    },
    CodecSpec {
        name: "vp8",
        description: "On2 VP8",
        kind: MediaKind::Video,
        options: &[BITRATE],
    },
    CodecSpec {
        name: "vp9",
        description: "Google VP9",
        kind: MediaKind::Video,
        options: &[BITRATE],
    },
    CodecSpec {
        name: "av1",
        description: "Alliance for Open Media AV1",
        kind: MediaKind::Video,
        options: &[BITRATE],
    },
    CodecSpec {
        name: "theora",
        description: "Theora",
        kind: MediaKind::Video,
        options: &[BITRATE],
    },
    CodecSpec {
        name: "aac",
        description: "AAC (Advanced Audio Coding)",
        kind: MediaKind::Audio,
        options: &[BITRATE],
    },
    CodecSpec {
        name: "mp3",
        description: "MP3 (MPEG audio layer 3)",
        kind: MediaKind::Audio,
        options: &[BITRATE],
    },
    CodecSpec {
        name: "opus",
        description: "Opus (Opus Interactive Audio Codec)",
        kind: MediaKind::Audio,
        options: &[BITRATE],
    },
    CodecSpec {
        name: "vorbis",
        description: "Vorbis",
        kind: MediaKind::Audio,
        options: &[BITRATE],
    },
    CodecSpec {
        name: "flac",
        description: "FLAC (Free Lossless Audio Codec)",
        kind: MediaKind::Audio,
        options: &[],
    },
    CodecSpec {
        name: "mov_text",
        description: "3GPP Timed Text subtitle",
        kind: MediaKind::Subtitle,
        options: &[],
    },
    CodecSpec {
        name: "subrip",
        description: "SubRip subtitle",
        kind: MediaKind::Subtitle,
        options: &[],
    },
    CodecSpec {
        name: "webvtt",
        description: "WebVTT subtitle",
        kind: MediaKind::Subtitle,
        options: &[],
    },
];

static FORMATS: &[FormatSpec] = &[
    FormatSpec {
        name: "mp4",
        description: "MP4 (MPEG-4 Part 14)",
        extensions: &["mp4", "m4v"],
        codecs: &["h264", "hevc", "av1", "vp9", "aac", "mp3", "opus", "mov_text"],
        options: &[OptionSpec {
            name: "movflags",
            description: "MOV muxer flags",
            default: OptionValue::Str("+faststart"),
        }],
    },
    FormatSpec {
        name: "matroska",
        description: "Matroska",
        extensions: &["mkv"],
        codecs: &[
            "h264", "hevc", "vp9", "vp8", "av1", "theora", "opus", "aac", "vorbis", "flac", "mp3",
            "subrip", "webvtt",
        ],
        options: &[],
    },
    FormatSpec {
        name: "webm",
        description: "WebM",
        extensions: &["webm"],
        codecs: &["vp9", "vp8", "av1", "opus", "vorbis", "webvtt"],
        options: &[],
    },
    FormatSpec {
        name: "mpegts",
        description: "MPEG-TS (MPEG-2 Transport Stream)",
        extensions: &["ts", "m2t", "m2ts", "mts"],
        codecs: &["h264", "hevc", "aac", "mp3", "opus"],
        options: &[],
    },
    FormatSpec {
        name: "ogg",
        description: "Ogg",
        extensions: &["ogg", "ogv", "oga"],
        codecs: &["theora", "vp8", "vorbis", "opus", "flac"],
        options: &[],
    },
];

static TABLE: FormatTable = FormatTable {
    formats: FORMATS,
    codecs: CODECS,
    default_format: "webm",
};

/// Maps a codec name of the table to FFmpeg's codec id.
pub fn codec_id(codec: &str) -> Option<Id> {
    let id = match codec {
        "h264" => Id::H264,
        "hevc" => Id::HEVC,
        "vp8" => Id::VP8,
        "vp9" => Id::VP9,
        "av1" => Id::AV1,
        "theora" => Id::THEORA,
        "aac" => Id::AAC,
        "mp3" => Id::MP3,
        "opus" => Id::OPUS,
        "vorbis" => Id::VORBIS,
        "flac" => Id::FLAC,
        "mov_text" => Id::MOV_TEXT,
        "subrip" => Id::SUBRIP,
        "webvtt" => Id::WEBVTT,
        _ => return None,
    };
    Some(id)
}

/// Stream-copy muxing through libavformat.
///
/// Packets must already be encoded with the stream's codec; this backend
/// only places them into the container.
#[derive(Clone, Copy, Debug, Default)]
pub struct FfmpegContainer;

impl ContainerBackend for FfmpegContainer {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn table(&self) -> &'static FormatTable {
        &TABLE
    }

    fn open(&self, plan: &OutputPlan) -> Result<Box<dyn PacketMuxer>, SinkError> {
        Ok(Box::new(FfmpegMuxer::open(plan)?))
    }
}

#[derive(Clone, Copy, Debug)]
struct Route {
    stream_index: usize,
    time_base: Rational,
}

struct FfmpegMuxer {
    octx: Output,
    routes: HashMap<usize, Route>,
}

// Safety: the muxer is moved into its worker thread once and used only there.
unsafe impl Send for FfmpegMuxer {}

impl FfmpegMuxer {
    fn open(plan: &OutputPlan) -> Result<Self, SinkError> {
        // Every stream is checked before any output is created.
        let checked = plan
            .streams
            .iter()
            .map(|stream| {
                let id = codec_id(&stream.codec).ok_or_else(|| {
                    SinkError::BackendInit(format!("codec '{}' has no FFmpeg id", stream.codec))
                })?;
                Ok((stream, id, StreamGeometry::from_stream(stream)?))
            })
            .collect::<Result<Vec<_>, SinkError>>()?;

        ffmpeg_next::init()?;

        let mut octx = ffmpeg_next::format::output_as(&plan.location, plan.format.name)?;
        let mut stream_indices = Vec::with_capacity(plan.streams.len());

        for (stream, id, geometry) in checked {
            let mut ost = octx.add_stream(ffmpeg_next::encoder::find(Id::None))?;
            unsafe {
                set_parameters(ost.parameters().as_mut_ptr(), id, stream.caps.kind(), &geometry);
            }
            let tb = stream_time_base(stream);
            ost.set_time_base(Rational(tb.num, tb.den));
            stream_indices.push((stream.index, ost.index()));
        }

        let mut opts = Dictionary::new();
        for (key, value) in &plan.format_options {
            opts.set(key, &option_string(value));
        }
        octx.write_header_with(opts)?;

        // The muxer may pick its own time bases while writing the header.
        let routes = stream_indices
            .into_iter()
            .map(|(index, stream_index)| {
                let time_base = octx
                    .stream(stream_index)
                    .map(|s| s.time_base())
                    .unwrap_or(Rational(1, 1000));
                (
                    index,
                    Route {
                        stream_index,
                        time_base,
                    },
                )
            })
            .collect();

        Ok(Self { octx, routes })
    }
}

impl PacketMuxer for FfmpegMuxer {
    fn write_packet(&mut self, packet: &Packet) -> Result<(), SinkError> {
        let route = *self
            .routes
            .get(&packet.index)
            .ok_or(SinkError::UnknownStream(packet.index))?;

        let mut pkt = ffmpeg_next::Packet::copy(&packet.data);
        pkt.set_stream(route.stream_index);
        pkt.set_pts(packet.pts);
        pkt.set_dts(packet.dts);
        pkt.set_duration(packet.duration);
        pkt.set_position(-1);
        pkt.rescale_ts(
            Rational(packet.time_base.num, packet.time_base.den),
            route.time_base,
        );
        if packet.keyframe {
            pkt.set_flags(ffmpeg_next::packet::Flags::KEY);
        }
        pkt.write_interleaved(&mut self.octx)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.octx.write_trailer()?;
        Ok(())
    }
}

/// Stream parameters in the integer widths `AVCodecParameters` stores them in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct StreamGeometry {
    width: i32,
    height: i32,
    sample_rate: i32,
    channels: i32,
    bit_rate: Option<i64>,
}

impl StreamGeometry {
    /// Missing keys become 0; values that do not fit are an init failure.
    fn from_stream(stream: &StreamInfo) -> Result<Self, SinkError> {
        let int = |key: &str| -> Result<i32, SinkError> {
            let value = params::get_u64(&stream.params, key).unwrap_or(0);
            i32::try_from(value).map_err(|_| out_of_range(stream, key, value))
        };
        let bit_rate = match params::get_u64(&stream.params, "bitrate").filter(|b| *b > 0) {
            Some(value) => Some(
                i64::try_from(value).map_err(|_| out_of_range(stream, "bitrate", value))?,
            ),
            None => None,
        };
        Ok(match stream.caps.kind() {
            MediaKind::Video => Self {
                width: int("width")?,
                height: int("height")?,
                bit_rate,
                ..Self::default()
            },
            MediaKind::Audio => Self {
                sample_rate: int("sample_rate")?,
                channels: int("channels")?,
                bit_rate,
                ..Self::default()
            },
            MediaKind::Subtitle => Self {
                bit_rate,
                ..Self::default()
            },
        })
    }
}

fn out_of_range(stream: &StreamInfo, key: &str, value: u64) -> SinkError {
    SinkError::BackendInit(format!(
        "stream {}: {key} {value} is out of range",
        stream.index
    ))
}

/// Fills codec parameters from the checked stream geometry.
///
/// Uses `ch_layout`, so FFmpeg 5.1 or newer headers are required.
///
/// # Safety
/// `par` must point to the codec parameters of a stream owned by a live
/// output context.
unsafe fn set_parameters(
    par: *mut ffi::AVCodecParameters,
    id: Id,
    kind: MediaKind,
    geometry: &StreamGeometry,
) {
    (*par).codec_id = id.into();
    (*par).codec_tag = 0;
    match kind {
        MediaKind::Video => {
            (*par).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_VIDEO;
            (*par).width = geometry.width;
            (*par).height = geometry.height;
        }
        MediaKind::Audio => {
            (*par).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_AUDIO;
            (*par).sample_rate = geometry.sample_rate;
            (*par).ch_layout.nb_channels = geometry.channels;
        }
        MediaKind::Subtitle => {
            (*par).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_SUBTITLE;
        }
    }
    if let Some(bit_rate) = geometry.bit_rate {
        (*par).bit_rate = bit_rate;
    }
}

/// Frame rate for video, sample rate for audio, milliseconds otherwise.
fn stream_time_base(stream: &StreamInfo) -> TimeBase {
    let key = match stream.caps.kind() {
        MediaKind::Video => "fps",
        MediaKind::Audio => "sample_rate",
        MediaKind::Subtitle => return TimeBase::MILLISECONDS,
    };
    match params::get_u64(&stream.params, key) {
        Some(rate) if rate > 0 && rate <= i32::MAX as u64 => TimeBase::new(1, rate as i32),
        _ => TimeBase::MILLISECONDS,
    }
}

fn option_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        other => other.to_string(),
    }
}
