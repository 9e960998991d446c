use std::collections::BTreeMap;

use serde_json::Value;

use crate::shared::caps::{Caps, MediaKind};
use crate::shared::constants::PACKET_QUEUE_CAPACITY;
use crate::shared::error::SinkError;
use crate::shared::params::{self, Params};
use crate::writer::domain::media_writer::{MediaWriter, OptionDescriptor, StreamInfo};
use crate::writer::domain::packet_queue::PacketQueue;
use crate::writer::domain::writer_event::{EventBus, SinkEvent};
use crate::writer::infrastructure::format_table::{FormatSpec, FormatTable};
use crate::writer::infrastructure::packet_worker::{PacketMuxer, PacketWorker};

/// Everything a container backend needs to open its output.
#[derive(Clone, Debug)]
pub struct OutputPlan {
    pub location: String,
    pub format: &'static FormatSpec,
    pub format_options: Params,
    /// Sorted by stream index.
    pub streams: Vec<StreamInfo>,
}

/// A concrete container family: its static capabilities plus a way to open
/// an output for a validated plan.
pub trait ContainerBackend: Send {
    fn name(&self) -> &'static str;
    fn table(&self) -> &'static FormatTable;
    fn open(&self, plan: &OutputPlan) -> Result<Box<dyn PacketMuxer>, SinkError>;
}

/// `MediaWriter` driven by a `FormatTable`.
///
/// Holds the configuration (location, format, options, streams, blacklists),
/// negotiates streams against the table and, once initialized, feeds packets
/// to the backend's muxer on a `PacketWorker` thread.
pub struct MuxingWriter<B: ContainerBackend> {
    backend: B,
    location: String,
    output_format: String,
    format_options: Params,
    streams: BTreeMap<usize, StreamInfo>,
    formats_blacklist: Vec<String>,
    codecs_blacklist: Vec<String>,
    active: Option<ActiveOutput>,
    events: EventBus,
}

/// An opened output: the worker feeding it and the location it was opened at.
struct ActiveOutput {
    worker: PacketWorker,
    location: String,
}

impl<B: ContainerBackend> MuxingWriter<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            location: String::new(),
            output_format: String::new(),
            format_options: Params::new(),
            streams: BTreeMap::new(),
            formats_blacklist: Vec::new(),
            codecs_blacklist: Vec::new(),
            active: None,
            events: EventBus::default(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.active.is_some()
    }

    /// Location of the open output; later `set_location` calls do not move it.
    pub fn active_location(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.location.as_str())
    }

    fn table(&self) -> &'static FormatTable {
        self.backend.table()
    }

    fn format_allowed(&self, format: &str) -> bool {
        !self.formats_blacklist.iter().any(|f| f == format)
    }

    fn codec_allowed(&self, codec: &str) -> bool {
        !self.codecs_blacklist.iter().any(|c| c == codec)
    }

    /// Format that `init` would use: the explicit output format, else the
    /// one matching the location's extension, else the default.
    fn effective_format(&self) -> String {
        if !self.output_format.is_empty() {
            return self.output_format.clone();
        }
        self.table()
            .guess_format(&self.location)
            .filter(|f| self.format_allowed(f.name))
            .map(|f| f.name.to_string())
            .unwrap_or_else(|| self.default_format())
    }

    /// Resolves the codec for a stream of `kind`, honouring an explicit
    /// `codec` key in `requested`.
    fn negotiate_codec(
        &self,
        index: usize,
        format: &str,
        kind: MediaKind,
        requested: &Params,
    ) -> Result<String, SinkError> {
        let candidates = self.supported_codecs(format, Some(kind));
        match params::get_str(requested, "codec") {
            Some(codec) if candidates.iter().any(|c| c == codec) => Ok(codec.to_string()),
            Some(codec) => Err(SinkError::invalid_capability(
                index,
                format!("codec '{codec}' is not available for {kind} in format '{format}'"),
            )),
            None => candidates.into_iter().next().ok_or_else(|| {
                SinkError::invalid_capability(
                    index,
                    format!("format '{format}' has no {kind} codec"),
                )
            }),
        }
    }

    fn negotiated_params(&self, codec: &str, caps: &Caps, overrides: &Params) -> Params {
        let mut negotiated = params::merge(&self.default_codec_params(codec), overrides);
        let derived: &[&str] = match caps.kind() {
            MediaKind::Video => &["width", "height", "fps"],
            MediaKind::Audio => &["sample_rate", "channels"],
            MediaKind::Subtitle => &[],
        };
        for key in derived {
            if let Some(value) = caps.properties().get(*key) {
                negotiated.insert(key.to_string(), value.clone());
            }
        }
        negotiated.insert("codec".to_string(), Value::from(codec));
        negotiated
    }

    fn validate(&self) -> Result<OutputPlan, SinkError> {
        if self.location.is_empty() {
            return Err(SinkError::BackendInit("no output location set".into()));
        }
        let format_name = self.effective_format();
        let format = self
            .table()
            .format(&format_name)
            .filter(|f| self.format_allowed(f.name))
            .ok_or_else(|| {
                SinkError::BackendInit(format!("format '{format_name}' is not supported"))
            })?;
        if self.streams.is_empty() {
            return Err(SinkError::BackendInit("no streams registered".into()));
        }
        for stream in self.streams.values() {
            let codecs = self.supported_codecs(format.name, Some(stream.caps.kind()));
            if !codecs.iter().any(|c| *c == stream.codec) {
                return Err(SinkError::BackendInit(format!(
                    "stream {} uses codec '{}', which format '{}' does not accept",
                    stream.index, stream.codec, format.name
                )));
            }
        }
        Ok(OutputPlan {
            location: self.location.clone(),
            format,
            format_options: self.format_options.clone(),
            streams: self.streams.values().cloned().collect(),
        })
    }

    fn publish_streams(&self) {
        self.events.publish(SinkEvent::StreamsChanged(self.streams()));
    }
}

impl<B: ContainerBackend> MediaWriter for MuxingWriter<B> {
    fn name(&self) -> &str {
        self.backend.name()
    }

    fn supported_formats(&self) -> Vec<String> {
        self.table()
            .formats
            .iter()
            .filter(|f| self.format_allowed(f.name))
            .map(|f| f.name.to_string())
            .collect()
    }

    fn file_extensions(&self, format: &str) -> Vec<String> {
        self.table()
            .format(format)
            .map(|f| f.extensions.iter().map(|e| e.to_string()).collect())
            .unwrap_or_default()
    }

    fn format_description(&self, format: &str) -> String {
        self.table()
            .format(format)
            .map(|f| f.description.to_string())
            .unwrap_or_default()
    }

    fn supported_codecs(&self, format: &str, kind: Option<MediaKind>) -> Vec<String> {
        let table = self.table();
        let names: Vec<&str> = if format.is_empty() {
            table.codecs.iter().map(|c| c.name).collect()
        } else {
            match table.format(format).filter(|f| self.format_allowed(f.name)) {
                Some(f) => f.codecs.to_vec(),
                None => return Vec::new(),
            }
        };
        names
            .into_iter()
            .filter(|name| self.codec_allowed(name))
            .filter_map(|name| table.codec(name))
            .filter(|c| kind.map_or(true, |k| c.kind == k))
            .map(|c| c.name.to_string())
            .collect()
    }

    fn default_codec(&self, format: &str, kind: MediaKind) -> Option<String> {
        self.supported_codecs(format, Some(kind)).into_iter().next()
    }

    fn codec_description(&self, codec: &str) -> String {
        self.table()
            .codec(codec)
            .map(|c| c.description.to_string())
            .unwrap_or_default()
    }

    fn codec_type(&self, codec: &str) -> Option<MediaKind> {
        self.table().codec(codec).map(|c| c.kind)
    }

    fn default_codec_params(&self, codec: &str) -> Params {
        self.table()
            .codec(codec)
            .map(|c| c.default_params())
            .unwrap_or_default()
    }

    fn default_format(&self) -> String {
        let table = self.table();
        if self.format_allowed(table.default_format) {
            return table.default_format.to_string();
        }
        self.supported_formats().into_iter().next().unwrap_or_default()
    }

    fn location(&self) -> &str {
        &self.location
    }

    fn set_location(&mut self, location: &str) {
        self.location = location.to_string();
    }

    fn output_format(&self) -> String {
        self.output_format.clone()
    }

    fn set_output_format(&mut self, format: &str) {
        self.output_format = format.to_string();
        self.events
            .publish(SinkEvent::OutputFormatChanged(self.output_format.clone()));
    }

    fn reset_output_format(&mut self) {
        self.set_output_format("");
    }

    fn format_options(&self) -> Vec<OptionDescriptor> {
        self.table()
            .format(&self.effective_format())
            .map(|f| {
                f.options
                    .iter()
                    .map(|o| o.describe(&self.format_options))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn set_format_options(&mut self, options: &Params) {
        self.format_options = params::merge(&self.format_options, options);
        self.events
            .publish(SinkEvent::FormatOptionsChanged(self.format_options.clone()));
    }

    fn reset_format_options(&mut self) {
        self.format_options.clear();
        self.events
            .publish(SinkEvent::FormatOptionsChanged(Params::new()));
    }

    fn codec_options(&self, index: usize) -> Vec<OptionDescriptor> {
        let Some(stream) = self.streams.get(&index) else {
            return Vec::new();
        };
        self.table()
            .codec(&stream.codec)
            .map(|c| c.options.iter().map(|o| o.describe(&stream.params)).collect())
            .unwrap_or_default()
    }

    fn set_codec_options(&mut self, index: usize, options: &Params) -> Result<(), SinkError> {
        let stream = self
            .streams
            .get_mut(&index)
            .ok_or(SinkError::UnknownStream(index))?;
        for (key, value) in options {
            // The codec itself is changed through update_stream.
            if key != "codec" {
                stream.params.insert(key.clone(), value.clone());
            }
        }
        let options = stream.params.clone();
        self.events
            .publish(SinkEvent::CodecOptionsChanged { index, options });
        Ok(())
    }

    fn reset_codec_options(&mut self, index: usize) -> Result<(), SinkError> {
        let stream = self
            .streams
            .get(&index)
            .ok_or(SinkError::UnknownStream(index))?;
        let defaults = self.negotiated_params(&stream.codec, &stream.caps, &Params::new());
        if let Some(stream) = self.streams.get_mut(&index) {
            stream.params = defaults.clone();
        }
        self.events.publish(SinkEvent::CodecOptionsChanged {
            index,
            options: defaults,
        });
        Ok(())
    }

    fn streams(&self) -> Vec<StreamInfo> {
        self.streams.values().cloned().collect()
    }

    fn add_stream(
        &mut self,
        index: usize,
        caps: &Caps,
        codec_params: &Params,
    ) -> Result<Params, SinkError> {
        if self.streams.contains_key(&index) {
            return Err(SinkError::StreamExists(index));
        }
        let format = self.effective_format();
        let codec = self.negotiate_codec(index, &format, caps.kind(), codec_params)?;
        let negotiated = self.negotiated_params(&codec, caps, codec_params);

        self.streams.insert(
            index,
            StreamInfo {
                index,
                caps: caps.clone(),
                codec,
                params: negotiated.clone(),
            },
        );
        self.publish_streams();
        Ok(negotiated)
    }

    fn update_stream(&mut self, index: usize, codec_params: &Params) -> Result<Params, SinkError> {
        let stream = self
            .streams
            .get(&index)
            .ok_or(SinkError::UnknownStream(index))?;
        let caps = stream.caps.clone();
        let merged_request = params::merge(&stream.params, codec_params);

        let format = self.effective_format();
        let codec = self.negotiate_codec(index, &format, caps.kind(), &merged_request)?;
        let negotiated = if codec == stream.codec {
            self.negotiated_params(&codec, &caps, &merged_request)
        } else {
            // A new codec starts from its own defaults.
            let mut request = codec_params.clone();
            request.insert("codec".to_string(), Value::from(codec.as_str()));
            self.negotiated_params(&codec, &caps, &request)
        };

        if let Some(stream) = self.streams.get_mut(&index) {
            stream.codec = codec;
            stream.params = negotiated.clone();
        }
        self.publish_streams();
        Ok(negotiated)
    }

    fn clear_streams(&mut self) {
        self.streams.clear();
        self.publish_streams();
    }

    fn formats_blacklist(&self) -> Vec<String> {
        self.formats_blacklist.clone()
    }

    fn set_formats_blacklist(&mut self, formats: &[String]) {
        self.formats_blacklist = formats.to_vec();
        self.events
            .publish(SinkEvent::FormatsBlacklistChanged(self.formats_blacklist.clone()));
    }

    fn reset_formats_blacklist(&mut self) {
        self.set_formats_blacklist(&[]);
    }

    fn codecs_blacklist(&self) -> Vec<String> {
        self.codecs_blacklist.clone()
    }

    fn set_codecs_blacklist(&mut self, codecs: &[String]) {
        self.codecs_blacklist = codecs.to_vec();
        self.events
            .publish(SinkEvent::CodecsBlacklistChanged(self.codecs_blacklist.clone()));
    }

    fn reset_codecs_blacklist(&mut self) {
        self.set_codecs_blacklist(&[]);
    }

    fn init(&mut self) -> Result<PacketQueue, SinkError> {
        if self.active.is_some() {
            return Err(SinkError::BackendInit("writer is already initialized".into()));
        }
        let plan = self.validate()?;
        let muxer = self.backend.open(&plan).map_err(|e| match e {
            SinkError::BackendInit(_) => e,
            other => SinkError::BackendInit(other.to_string()),
        })?;
        let (worker, queue) =
            PacketWorker::spawn(self.backend.name(), muxer, PACKET_QUEUE_CAPACITY)?;
        log::info!(
            "Opened {} output '{}' ({} streams)",
            plan.format.name,
            plan.location,
            plan.streams.len()
        );
        self.active = Some(ActiveOutput {
            worker,
            location: plan.location,
        });
        Ok(queue)
    }

    fn uninit(&mut self) {
        let Some(ActiveOutput { worker, location }) = self.active.take() else {
            return;
        };
        match worker.stop() {
            Ok(stats) => log::info!(
                "Closed output '{location}': {} packets written, {} failed",
                stats.written,
                stats.failed
            ),
            Err(e) => log::warn!("Closing output '{location}' failed: {e}"),
        }
    }

    fn set_event_bus(&mut self, bus: EventBus) {
        self.events = bus;
    }
}

impl<B: ContainerBackend> Drop for MuxingWriter<B> {
    fn drop(&mut self) {
        self.uninit();
    }
}
