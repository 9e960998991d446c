use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};

use multisink_core::shared::caps::{Caps, MediaKind};
use multisink_core::shared::constants::{DEFAULT_BACKEND, PACKET_QUEUE_CAPACITY};
use multisink_core::shared::packet::{Packet, TimeBase};
use multisink_core::shared::params::{self, Params};
use multisink_core::sink::domain::sink_state::SinkState;
use multisink_core::sink::multi_sink_engine::MultiSinkEngine;
use multisink_core::sink::sink_input::SinkInput;
use multisink_core::sink::sink_settings::SinkSettings;
use multisink_core::writer::infrastructure::writer_factory::WriterFactory;

/// Multi-stream media sink: mux packet streams into container outputs.
#[derive(Parser)]
#[command(name = "multisink")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the available writer backends.
    Backends,
    /// List the formats a backend can write.
    Formats {
        /// Writer backend.
        #[arg(long, default_value = DEFAULT_BACKEND)]
        backend: String,
    },
    /// List the codecs a backend accepts.
    Codecs {
        /// Writer backend.
        #[arg(long, default_value = DEFAULT_BACKEND)]
        backend: String,

        /// Only codecs usable with this format.
        #[arg(long)]
        format: Option<String>,

        /// Only codecs of this kind: audio, video or subtitle.
        #[arg(long)]
        kind: Option<MediaKind>,
    },
    /// Mux input files, one stream per input, into a single output.
    Mux {
        /// Output location.
        #[arg(short, long)]
        output: PathBuf,

        /// Writer backend (overrides the settings file).
        #[arg(long)]
        backend: Option<String>,

        /// Output format; guessed from the output extension when omitted.
        #[arg(long)]
        format: Option<String>,

        /// Input stream as PATH:KIND[:CODEC]. Repeat for more streams.
        #[arg(short, long = "input", value_parser = parse_input, required = true)]
        inputs: Vec<InputSpec>,

        /// Payload bytes per packet.
        #[arg(long, default_value = "4096")]
        chunk_size: usize,

        /// Packets per second, used for timestamps.
        #[arg(long, default_value = "30")]
        packet_rate: u32,

        /// Video width.
        #[arg(long, default_value = "1280")]
        width: u32,

        /// Video height.
        #[arg(long, default_value = "720")]
        height: u32,

        /// Audio sample rate.
        #[arg(long, default_value = "48000")]
        sample_rate: u32,

        /// Audio channel count.
        #[arg(long, default_value = "2")]
        channels: u32,

        /// Settings file (defaults to the user settings).
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Save the resulting configuration as the user settings.
        #[arg(long)]
        save: bool,
    },
}

#[derive(Clone, Debug, PartialEq)]
struct InputSpec {
    path: PathBuf,
    kind: MediaKind,
    codec: Option<String>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Backends => {
            for name in WriterFactory::with_builtin().names() {
                let marker = if name == DEFAULT_BACKEND { " (default)" } else { "" };
                println!("{name}{marker}");
            }
        }
        Command::Formats { backend } => list_formats(&backend)?,
        Command::Codecs {
            backend,
            format,
            kind,
        } => list_codecs(&backend, format.as_deref().unwrap_or(""), kind)?,
        Command::Mux {
            output,
            backend,
            format,
            inputs,
            chunk_size,
            packet_rate,
            width,
            height,
            sample_rate,
            channels,
            settings,
            save,
        } => {
            validate(&inputs, chunk_size, packet_rate)?;
            let mut settings = match settings {
                Some(path) => SinkSettings::load_from(&path)?,
                None => SinkSettings::load(),
            };
            if let Some(backend) = backend {
                settings.backend = backend;
            }
            if let Some(format) = format {
                settings.output_format = format;
            }
            settings.location = output.to_string_lossy().into_owned();

            let mut engine = MultiSinkEngine::new(WriterFactory::with_builtin());
            engine.apply_settings(&settings)?;

            for (index, input) in inputs.iter().enumerate() {
                let caps = match input.kind {
                    MediaKind::Video => Caps::video(width, height, packet_rate),
                    MediaKind::Audio => Caps::audio(sample_rate, channels),
                    MediaKind::Subtitle => Caps::subtitle(),
                };
                let requested = match &input.codec {
                    Some(codec) => params::params([("codec", codec.as_str().into())]),
                    None => Params::new(),
                };
                let stream = engine.add_stream(index, &caps, &requested)?;
                log::info!(
                    "Stream {index}: {} as {}",
                    input.path.display(),
                    params::get_str(&stream.codec_params, "codec").unwrap_or("?")
                );
            }

            if !engine.set_state(SinkState::Playing) {
                return Err(format!("Could not open output {}", output.display()).into());
            }
            let sent = feed(&engine.input(), &inputs, chunk_size, packet_rate)?;
            engine.set_state(SinkState::Null);

            if save {
                engine.settings().save();
            }
            println!(
                "Wrote {sent} packets from {} inputs to {}",
                inputs.len(),
                output.display()
            );
        }
    }

    Ok(())
}

fn list_formats(backend: &str) -> Result<(), Box<dyn std::error::Error>> {
    let engine = MultiSinkEngine::with_backend(backend)?;
    let default_format = engine.default_format();
    for format in engine.catalog().formats() {
        let marker = if format.name == default_format { "*" } else { " " };
        println!(
            "{marker} {:<12} {:<24} {}",
            format.name,
            format.extensions.join(","),
            format.description
        );
    }
    Ok(())
}

fn list_codecs(
    backend: &str,
    format: &str,
    kind: Option<MediaKind>,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = MultiSinkEngine::with_backend(backend)?;
    if !format.is_empty() && engine.catalog().format(format).is_none() {
        return Err(format!("Backend '{backend}' has no format '{format}'").into());
    }
    for codec in engine.supported_codecs(format, kind) {
        let kind = engine
            .codec_type(&codec)
            .map(|k| k.to_string())
            .unwrap_or_default();
        println!(
            "{codec:<12} {kind:<9} {}",
            engine.codec_description(&codec)
        );
    }
    Ok(())
}

/// Sends every input as chunked packets, one chunk per input in turn.
/// Returns the number of packets sent.
fn feed(
    input: &SinkInput,
    inputs: &[InputSpec],
    chunk_size: usize,
    packet_rate: u32,
) -> Result<u64, Box<dyn std::error::Error>> {
    let payloads = inputs
        .iter()
        .map(|i| read_input(&i.path))
        .collect::<Result<Vec<_>, _>>()?;
    let time_base = TimeBase::new(1, packet_rate as i32);
    let mut chunks: Vec<_> = payloads.iter().map(|p| p.chunks(chunk_size)).collect();

    let mut sent = 0u64;
    let mut sequence = 0i64;
    loop {
        let mut any = false;
        for (index, stream_chunks) in chunks.iter_mut().enumerate() {
            let Some(chunk) = stream_chunks.next() else {
                continue;
            };
            any = true;
            wait_for_room(input);
            let packet = Packet::new(index, chunk.to_vec())
                .with_pts(sequence, time_base)
                .with_keyframe(true);
            input.i_stream(packet);
            sent += 1;
        }
        if !any {
            break;
        }
        sequence += 1;
    }
    Ok(sent)
}

/// The sink drops packets when its queue is full; a file source can wait.
fn wait_for_room(input: &SinkInput) {
    while input.pending() >= PACKET_QUEUE_CAPACITY / 2 {
        thread::sleep(Duration::from_millis(1));
    }
}

fn read_input(path: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    fs::read(path).map_err(|e| format!("Cannot read {}: {e}", path.display()).into())
}

fn validate(
    inputs: &[InputSpec],
    chunk_size: usize,
    packet_rate: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    if chunk_size == 0 {
        return Err("Chunk size must be greater than zero".into());
    }
    if packet_rate == 0 || packet_rate > i32::MAX as u32 {
        return Err(format!("Packet rate must be positive, got {packet_rate}").into());
    }
    for input in inputs {
        if !input.path.exists() {
            return Err(format!("Input file not found: {}", input.path.display()).into());
        }
    }
    Ok(())
}

/// Parses `PATH:KIND[:CODEC]`. The path itself may contain colons.
fn parse_input(spec: &str) -> Result<InputSpec, String> {
    let parts: Vec<&str> = spec.rsplitn(3, ':').collect();
    let invalid = || format!("expected PATH:KIND[:CODEC], got '{spec}'");

    if let [last, middle, rest] = parts.as_slice() {
        if let Ok(kind) = MediaKind::from_str(middle) {
            return Ok(InputSpec {
                path: PathBuf::from(rest),
                kind,
                codec: Some(last.to_string()).filter(|c| !c.is_empty()),
            });
        }
    }
    let (path, kind) = spec.rsplit_once(':').ok_or_else(invalid)?;
    let kind = MediaKind::from_str(kind).map_err(|_| invalid())?;
    if path.is_empty() {
        return Err(invalid());
    }
    Ok(InputSpec {
        path: PathBuf::from(path),
        kind,
        codec: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::kind_only("clip.h264:video", "clip.h264", MediaKind::Video, None)]
    #[case::with_codec("a.aac:audio:aac", "a.aac", MediaKind::Audio, Some("aac"))]
    #[case::colon_in_path("C:/media/s.srt:subtitle", "C:/media/s.srt", MediaKind::Subtitle, None)]
    #[case::colon_in_path_with_codec(
        "C:/v.ivf:video:vp9",
        "C:/v.ivf",
        MediaKind::Video,
        Some("vp9")
    )]
    fn test_parse_input(
        #[case] spec: &str,
        #[case] path: &str,
        #[case] kind: MediaKind,
        #[case] codec: Option<&str>,
    ) {
        let input = parse_input(spec).unwrap();
        assert_eq!(input.path, PathBuf::from(path));
        assert_eq!(input.kind, kind);
        assert_eq!(input.codec.as_deref(), codec);
    }

    #[rstest]
    #[case::no_kind("clip.h264")]
    #[case::bad_kind("clip.h264:picture")]
    #[case::empty_path(":video")]
    fn test_parse_input_rejects(#[case] spec: &str) {
        assert!(parse_input(spec).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        assert!(validate(&[], 0, 30).is_err());
        assert!(validate(&[], 16, 0).is_err());
        assert!(validate(&[], 16, 30).is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_input() {
        let input = InputSpec {
            path: PathBuf::from("/definitely/not/here.bin"),
            kind: MediaKind::Video,
            codec: None,
        };
        assert!(validate(&[input], 16, 30).is_err());
    }

    #[test]
    fn test_feed_round_robins_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("v.raw");
        let text = dir.path().join("t.txt");
        fs::write(&video, vec![1u8; 10]).unwrap();
        fs::write(&text, b"hello").unwrap();
        let output = dir.path().join("out.mfr");

        let mut engine = MultiSinkEngine::with_backend("native").unwrap();
        engine.set_location(&output.to_string_lossy());
        engine
            .add_stream(0, &Caps::video(2, 2, 30), &Params::new())
            .unwrap();
        engine.add_stream(1, &Caps::subtitle(), &Params::new()).unwrap();
        assert!(engine.set_state(SinkState::Playing));

        let inputs = vec![
            InputSpec {
                path: video,
                kind: MediaKind::Video,
                codec: None,
            },
            InputSpec {
                path: text,
                kind: MediaKind::Subtitle,
                codec: None,
            },
        ];
        let sent = feed(&engine.input(), &inputs, 4, 30).unwrap();
        engine.set_state(SinkState::Null);

        assert_eq!(sent, 3 + 2);
        assert!(fs::metadata(&output).unwrap().len() > 0);
    }
}
