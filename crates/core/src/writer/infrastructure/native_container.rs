use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::shared::caps::MediaKind;
use crate::shared::error::SinkError;
use crate::shared::packet::Packet;
use crate::shared::params;
use crate::writer::infrastructure::format_table::{
    CodecSpec, FormatSpec, FormatTable, OptionSpec, OptionValue,
};
use crate::writer::infrastructure::muxing_writer::{ContainerBackend, OutputPlan};
use crate::writer::infrastructure::packet_worker::PacketMuxer;

pub const FRAMED_MAGIC: &[u8; 4] = b"MSNK";
pub const FRAMED_VERSION: u8 = 1;
/// Stored in place of a missing timestamp.
pub const NO_TIMESTAMP: i64 = i64::MIN;

const ALL_CODECS: &[&str] = &["rawvideo", "pcm_s16le", "pcm_f32le", "text"];

static CODECS: &[CodecSpec] = &[
    CodecSpec {
        name: "rawvideo",
        description: "Uncompressed video frames",
        kind: MediaKind::Video,
        options: &[OptionSpec {
            name: "pixel_format",
            description: "Pixel layout of each frame",
            default: OptionValue::Str("rgb24"),
        }],
    },
    CodecSpec {
        name: "pcm_s16le",
        description: "PCM signed 16-bit little-endian",
        kind: MediaKind::Audio,
        options: &[OptionSpec {
            name: "sample_format",
            description: "Sample layout",
            default: OptionValue::Str("s16"),
        }],
    },
    CodecSpec {
        name: "pcm_f32le",
        description: "PCM 32-bit floating point little-endian",
        kind: MediaKind::Audio,
        options: &[OptionSpec {
            name: "sample_format",
            description: "Sample layout",
            default: OptionValue::Str("flt"),
        }],
    },
    CodecSpec {
        name: "text",
        description: "Plain UTF-8 text",
        kind: MediaKind::Subtitle,
        options: &[OptionSpec {
            name: "charset",
            description: "Character encoding",
            default: OptionValue::Str("utf-8"),
        }],
    },
];

static FORMATS: &[FormatSpec] = &[
    FormatSpec {
        name: "framed",
        description: "Length-prefixed packet records behind a stream table",
        extensions: &["mfr", "frames"],
        codecs: ALL_CODECS,
        options: &[OptionSpec {
            name: "header",
            description: "Write the stream table before the first packet",
            default: OptionValue::Bool(true),
        }],
    },
    FormatSpec {
        name: "elementary",
        description: "One headerless file per stream",
        extensions: &["raw", "bin"],
        codecs: ALL_CODECS,
        options: &[OptionSpec {
            name: "append",
            description: "Append to existing files instead of truncating them",
            default: OptionValue::Bool(false),
        }],
    },
];

static TABLE: FormatTable = FormatTable {
    formats: FORMATS,
    codecs: CODECS,
    default_format: "framed",
};

/// Pure-Rust backend writing packets as-is, without any codec library.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeContainer;

impl ContainerBackend for NativeContainer {
    fn name(&self) -> &'static str {
        "native"
    }

    fn table(&self) -> &'static FormatTable {
        &TABLE
    }

    fn open(&self, plan: &OutputPlan) -> Result<Box<dyn PacketMuxer>, SinkError> {
        match plan.format.name {
            "framed" => Ok(Box::new(FramedMuxer::create(plan)?)),
            "elementary" => Ok(Box::new(ElementaryMuxer::create(plan)?)),
            other => Err(SinkError::BackendInit(format!(
                "native backend cannot write format '{other}'"
            ))),
        }
    }
}

fn kind_tag(kind: MediaKind) -> u8 {
    match kind {
        MediaKind::Audio => 0,
        MediaKind::Video => 1,
        MediaKind::Subtitle => 2,
    }
}

/// Single file: optional stream table, then one record per packet.
///
/// Header: magic, version, u16 stream count, then per stream the u32 index,
/// u8 kind, u16-prefixed codec name and u32-prefixed JSON params.
/// Record: u32 index, i64 pts, i64 dts, i64 duration, i32/i32 time base,
/// u8 flags (bit 0 = keyframe), u32 payload length, payload. Little-endian.
struct FramedMuxer {
    path: PathBuf,
    out: BufWriter<File>,
    /// Streams listed in the header; packets of other streams are rejected.
    declared: HashSet<usize>,
}

impl FramedMuxer {
    fn create(plan: &OutputPlan) -> Result<Self, SinkError> {
        let path = PathBuf::from(&plan.location);
        let file = File::create(&path).map_err(|e| SinkError::io(&path, e))?;
        let mut muxer = Self {
            out: BufWriter::new(file),
            path,
            declared: plan.streams.iter().map(|s| s.index).collect(),
        };

        let header = params::get_bool(&plan.format_options, "header").unwrap_or(true);
        if header {
            let bytes = encode_header(plan);
            muxer.write_all(&bytes)?;
        }
        Ok(muxer)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        self.out
            .write_all(bytes)
            .map_err(|e| SinkError::io(&self.path, e))
    }
}

fn encode_header(plan: &OutputPlan) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(FRAMED_MAGIC);
    bytes.push(FRAMED_VERSION);
    bytes.extend_from_slice(&(plan.streams.len() as u16).to_le_bytes());
    for stream in &plan.streams {
        bytes.extend_from_slice(&(stream.index as u32).to_le_bytes());
        bytes.push(kind_tag(stream.caps.kind()));
        bytes.extend_from_slice(&(stream.codec.len() as u16).to_le_bytes());
        bytes.extend_from_slice(stream.codec.as_bytes());
        let json = serde_json::to_vec(&stream.params).unwrap_or_default();
        bytes.extend_from_slice(&(json.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&json);
    }
    bytes
}

fn encode_record(packet: &Packet) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(41 + packet.data.len());
    bytes.extend_from_slice(&(packet.index as u32).to_le_bytes());
    bytes.extend_from_slice(&packet.pts.unwrap_or(NO_TIMESTAMP).to_le_bytes());
    bytes.extend_from_slice(&packet.dts.unwrap_or(NO_TIMESTAMP).to_le_bytes());
    bytes.extend_from_slice(&packet.duration.to_le_bytes());
    bytes.extend_from_slice(&packet.time_base.num.to_le_bytes());
    bytes.extend_from_slice(&packet.time_base.den.to_le_bytes());
    bytes.push(u8::from(packet.keyframe));
    bytes.extend_from_slice(&(packet.data.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&packet.data);
    bytes
}

impl PacketMuxer for FramedMuxer {
    fn write_packet(&mut self, packet: &Packet) -> Result<(), SinkError> {
        if !self.declared.contains(&packet.index) {
            return Err(SinkError::UnknownStream(packet.index));
        }
        let record = encode_record(packet);
        self.write_all(&record)
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.out.flush().map_err(|e| SinkError::io(&self.path, e))
    }
}

/// One raw payload file per stream. A lone stream writes to the location
/// itself; otherwise each stream gets `<stem>.<index>.<ext>` next to it.
struct ElementaryMuxer {
    outputs: HashMap<usize, (PathBuf, BufWriter<File>)>,
}

impl ElementaryMuxer {
    fn create(plan: &OutputPlan) -> Result<Self, SinkError> {
        let append = params::get_bool(&plan.format_options, "append").unwrap_or(false);
        let location = Path::new(&plan.location);
        let mut opened = Vec::with_capacity(plan.streams.len());

        // Existing files are only truncated once every output has opened.
        for stream in &plan.streams {
            let path = if plan.streams.len() == 1 {
                location.to_path_buf()
            } else {
                stream_path(location, stream.index)
            };
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .append(append)
                .truncate(false)
                .open(&path)
                .map_err(|e| SinkError::io(&path, e))?;
            opened.push((stream.index, path, file));
        }

        let mut outputs = HashMap::new();
        for (index, path, file) in opened {
            if !append {
                file.set_len(0).map_err(|e| SinkError::io(&path, e))?;
            }
            outputs.insert(index, (path, BufWriter::new(file)));
        }
        Ok(Self { outputs })
    }
}

/// `/dir/out.raw` + 2 → `/dir/out.2.raw`.
pub fn stream_path(location: &Path, index: usize) -> PathBuf {
    let stem = location
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match location.extension() {
        Some(ext) => format!("{stem}.{index}.{}", ext.to_string_lossy()),
        None => format!("{stem}.{index}"),
    };
    location.with_file_name(name)
}

impl PacketMuxer for ElementaryMuxer {
    fn write_packet(&mut self, packet: &Packet) -> Result<(), SinkError> {
        let (path, out) = self
            .outputs
            .get_mut(&packet.index)
            .ok_or(SinkError::UnknownStream(packet.index))?;
        out.write_all(&packet.data)
            .map_err(|e| SinkError::io(path.as_path(), e))
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        for (path, out) in self.outputs.values_mut() {
            out.flush().map_err(|e| SinkError::io(path.as_path(), e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::caps::Caps;
    use crate::shared::packet::TimeBase;
    use crate::shared::params::Params;
    use crate::writer::domain::media_writer::{MediaWriter, StreamInfo};
    use crate::writer::infrastructure::muxing_writer::MuxingWriter;
    use serde_json::json;

    fn read_u32(bytes: &[u8], at: &mut usize) -> u32 {
        let v = u32::from_le_bytes(bytes[*at..*at + 4].try_into().unwrap());
        *at += 4;
        v
    }

    fn read_i64(bytes: &[u8], at: &mut usize) -> i64 {
        let v = i64::from_le_bytes(bytes[*at..*at + 8].try_into().unwrap());
        *at += 8;
        v
    }

    #[test]
    fn test_stream_path_inserts_index() {
        assert_eq!(
            stream_path(Path::new("/tmp/out.raw"), 2),
            PathBuf::from("/tmp/out.2.raw")
        );
        assert_eq!(
            stream_path(Path::new("/tmp/out"), 0),
            PathBuf::from("/tmp/out.0")
        );
    }

    #[test]
    fn test_default_format_is_framed() {
        let writer = MuxingWriter::new(NativeContainer);
        assert_eq!(writer.default_format(), "framed");
        assert_eq!(writer.supported_formats(), vec!["framed", "elementary"]);
        assert_eq!(
            writer.default_codec("framed", MediaKind::Audio).as_deref(),
            Some("pcm_s16le")
        );
    }

    #[test]
    fn test_framed_output_has_header_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mfr");

        let mut writer = MuxingWriter::new(NativeContainer);
        writer.set_location(path.to_str().unwrap());
        writer
            .add_stream(3, &Caps::video(2, 2, 25), &Params::new())
            .unwrap();
        let queue = writer.init().unwrap();
        queue.enqueue_packet(
            Packet::new(3, vec![9; 12])
                .with_pts(40, TimeBase::new(1, 25))
                .with_keyframe(true),
        );
        writer.uninit();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], FRAMED_MAGIC);
        assert_eq!(bytes[4], FRAMED_VERSION);
        assert_eq!(u16::from_le_bytes([bytes[5], bytes[6]]), 1);

        let mut at = 7;
        assert_eq!(read_u32(&bytes, &mut at), 3);
        assert_eq!(bytes[at], 1); // video
        at += 1;
        let codec_len = u16::from_le_bytes([bytes[at], bytes[at + 1]]) as usize;
        at += 2;
        assert_eq!(&bytes[at..at + codec_len], b"rawvideo");
        at += codec_len;
        let json_len = read_u32(&bytes, &mut at) as usize;
        let params: serde_json::Value = serde_json::from_slice(&bytes[at..at + json_len]).unwrap();
        assert_eq!(params["width"], json!(2));
        at += json_len;

        assert_eq!(read_u32(&bytes, &mut at), 3);
        assert_eq!(read_i64(&bytes, &mut at), 40);
        assert_eq!(read_i64(&bytes, &mut at), 40);
        assert_eq!(read_i64(&bytes, &mut at), 0);
        at += 8; // time base
        assert_eq!(bytes[at], 1);
        at += 1;
        assert_eq!(read_u32(&bytes, &mut at), 12);
        assert_eq!(bytes.len(), at + 12);
    }

    #[test]
    fn test_framed_without_header_starts_with_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bare.mfr");

        let mut writer = MuxingWriter::new(NativeContainer);
        writer.set_location(path.to_str().unwrap());
        writer.set_format_options(&params::params([("header", json!(false))]));
        writer
            .add_stream(0, &Caps::audio(8_000, 1), &Params::new())
            .unwrap();
        let queue = writer.init().unwrap();
        queue.enqueue_packet(Packet::new(0, vec![1, 2]));
        writer.uninit();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 41 + 2);
        assert_eq!(&bytes[0..4], &0u32.to_le_bytes());
        assert_eq!(read_i64(&bytes, &mut 4), NO_TIMESTAMP);
    }

    #[test]
    fn test_elementary_splits_streams_into_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.raw");

        let mut writer = MuxingWriter::new(NativeContainer);
        writer.set_location(path.to_str().unwrap());
        writer.set_output_format("elementary");
        writer
            .add_stream(0, &Caps::video(2, 2, 25), &Params::new())
            .unwrap();
        writer
            .add_stream(1, &Caps::audio(8_000, 1), &Params::new())
            .unwrap();

        let queue = writer.init().unwrap();
        queue.enqueue_packet(Packet::new(0, vec![1, 1]));
        queue.enqueue_packet(Packet::new(1, vec![2]));
        queue.enqueue_packet(Packet::new(0, vec![3]));
        writer.uninit();

        assert_eq!(std::fs::read(dir.path().join("out.0.raw")).unwrap(), vec![1, 1, 3]);
        assert_eq!(std::fs::read(dir.path().join("out.1.raw")).unwrap(), vec![2]);
    }

    #[test]
    fn test_unwritable_location_fails_init_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.mfr");

        let mut writer = MuxingWriter::new(NativeContainer);
        writer.set_location(path.to_str().unwrap());
        writer
            .add_stream(0, &Caps::subtitle(), &Params::new())
            .unwrap();

        assert!(matches!(writer.init(), Err(SinkError::BackendInit(_))));
        assert!(!writer.is_initialized());
    }

    fn framed_plan(location: &Path) -> OutputPlan {
        OutputPlan {
            location: location.to_string_lossy().into_owned(),
            format: TABLE.format("framed").unwrap(),
            format_options: Params::new(),
            streams: vec![StreamInfo {
                index: 0,
                caps: Caps::video(2, 2, 25),
                codec: "rawvideo".into(),
                params: Params::new(),
            }],
        }
    }

    #[test]
    fn test_framed_rejects_undeclared_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mfr");
        let plan = framed_plan(&path);

        let mut muxer = FramedMuxer::create(&plan).unwrap();
        let result = muxer.write_packet(&Packet::new(1, vec![5; 8]));
        muxer.finish().unwrap();

        assert!(matches!(result, Err(SinkError::UnknownStream(1))));
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), encode_header(&plan).len());
    }

    #[test]
    fn test_stream_added_after_init_is_not_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.mfr");

        let mut writer = MuxingWriter::new(NativeContainer);
        writer.set_location(path.to_str().unwrap());
        writer
            .add_stream(0, &Caps::video(2, 2, 25), &Params::new())
            .unwrap();
        let queue = writer.init().unwrap();
        writer
            .add_stream(1, &Caps::audio(8_000, 1), &Params::new())
            .unwrap();
        queue.enqueue_packet(Packet::new(1, vec![7; 4]));
        queue.enqueue_packet(Packet::new(0, vec![3; 2]));
        writer.uninit();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(u16::from_le_bytes([bytes[5], bytes[6]]), 1);
        let mut at = 7;
        assert_eq!(read_u32(&bytes, &mut at), 0);
        at += 1;
        let codec_len = u16::from_le_bytes([bytes[at], bytes[at + 1]]) as usize;
        at += 2 + codec_len;
        let json_len = read_u32(&bytes, &mut at) as usize;
        at += json_len;

        // One 41-byte record prefix plus the 2-byte payload of stream 0.
        assert_eq!(bytes.len(), at + 41 + 2);
        assert_eq!(read_u32(&bytes, &mut at), 0);
        assert_eq!(&bytes[bytes.len() - 2..], &[3, 3]);
    }

    #[test]
    fn test_failed_elementary_open_keeps_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.raw");
        std::fs::write(dir.path().join("out.0.raw"), b"precious").unwrap();
        std::fs::create_dir(dir.path().join("out.1.raw")).unwrap();

        let mut writer = MuxingWriter::new(NativeContainer);
        writer.set_location(path.to_str().unwrap());
        writer.set_output_format("elementary");
        writer
            .add_stream(0, &Caps::video(2, 2, 25), &Params::new())
            .unwrap();
        writer
            .add_stream(1, &Caps::audio(8_000, 1), &Params::new())
            .unwrap();

        assert!(matches!(writer.init(), Err(SinkError::BackendInit(_))));
        assert_eq!(
            std::fs::read(dir.path().join("out.0.raw")).unwrap(),
            b"precious".to_vec()
        );
    }

    #[test]
    fn test_elementary_truncates_after_successful_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("single.raw");
        std::fs::write(&path, b"stale contents").unwrap();

        let mut writer = MuxingWriter::new(NativeContainer);
        writer.set_location(path.to_str().unwrap());
        writer.set_output_format("elementary");
        writer
            .add_stream(0, &Caps::audio(8_000, 1), &Params::new())
            .unwrap();
        let queue = writer.init().unwrap();
        queue.enqueue_packet(Packet::new(0, vec![4, 2]));
        writer.uninit();

        assert_eq!(std::fs::read(&path).unwrap(), vec![4, 2]);
    }
}
