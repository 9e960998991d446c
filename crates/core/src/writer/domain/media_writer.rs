use serde_json::Value;

use crate::shared::caps::{Caps, MediaKind};
use crate::shared::error::SinkError;
use crate::shared::params::Params;
use crate::writer::domain::packet_queue::PacketQueue;
use crate::writer::domain::writer_event::EventBus;

/// One configurable option of a format or codec, with its current value.
#[derive(Clone, Debug, PartialEq)]
pub struct OptionDescriptor {
    pub name: String,
    pub description: String,
    pub default_value: Value,
    pub value: Value,
}

/// A stream as the backend sees it after negotiation.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamInfo {
    pub index: usize,
    pub caps: Caps,
    pub codec: String,
    pub params: Params,
}

/// Container/codec engine behind the multi-sink.
///
/// Query methods never fail: unknown formats or codecs yield empty values.
/// Resources (files, muxer contexts, worker threads) exist only between a
/// successful `init` and the next `uninit`.
pub trait MediaWriter: Send {
    /// Identifier the writer was registered under.
    fn name(&self) -> &str;

    fn supported_formats(&self) -> Vec<String>;
    fn file_extensions(&self, format: &str) -> Vec<String>;
    fn format_description(&self, format: &str) -> String;

    /// Codecs usable with `format`, optionally restricted to one kind.
    fn supported_codecs(&self, format: &str, kind: Option<MediaKind>) -> Vec<String>;
    fn default_codec(&self, format: &str, kind: MediaKind) -> Option<String>;
    fn codec_description(&self, codec: &str) -> String;
    fn codec_type(&self, codec: &str) -> Option<MediaKind>;
    fn default_codec_params(&self, codec: &str) -> Params;

    fn default_format(&self) -> String;

    fn location(&self) -> &str;
    fn set_location(&mut self, location: &str);

    fn output_format(&self) -> String;
    fn set_output_format(&mut self, format: &str);
    fn reset_output_format(&mut self);

    fn format_options(&self) -> Vec<OptionDescriptor>;
    fn set_format_options(&mut self, options: &Params);
    fn reset_format_options(&mut self);

    fn codec_options(&self, index: usize) -> Vec<OptionDescriptor>;
    fn set_codec_options(&mut self, index: usize, options: &Params) -> Result<(), SinkError>;
    fn reset_codec_options(&mut self, index: usize) -> Result<(), SinkError>;

    fn streams(&self) -> Vec<StreamInfo>;

    /// Negotiates a new stream and returns its effective codec parameters.
    fn add_stream(
        &mut self,
        index: usize,
        caps: &Caps,
        codec_params: &Params,
    ) -> Result<Params, SinkError>;

    fn update_stream(&mut self, index: usize, codec_params: &Params) -> Result<Params, SinkError>;
    fn clear_streams(&mut self);

    fn formats_blacklist(&self) -> Vec<String>;
    fn set_formats_blacklist(&mut self, formats: &[String]);
    fn reset_formats_blacklist(&mut self);

    fn codecs_blacklist(&self) -> Vec<String>;
    fn set_codecs_blacklist(&mut self, codecs: &[String]);
    fn reset_codecs_blacklist(&mut self);

    /// Acquires output resources. On error nothing stays open.
    fn init(&mut self) -> Result<PacketQueue, SinkError>;

    /// Drains queued packets, finalizes the output and releases resources.
    /// Safe to call when not initialized.
    fn uninit(&mut self);

    /// Bus on which the writer publishes changes to the values it owns.
    fn set_event_bus(&mut self, bus: EventBus);
}
