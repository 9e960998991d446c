use std::collections::BTreeMap;

use crossbeam_channel::Receiver;

use crate::shared::caps::{Caps, MediaKind};
use crate::shared::error::SinkError;
use crate::shared::packet::Packet;
use crate::shared::params::{self, Params};
use crate::sink::domain::backend_catalog::BackendCatalog;
use crate::sink::domain::sink_state::{SinkState, SinkStateMachine, Transition};
use crate::sink::domain::stream_registry::{StreamDescriptor, StreamRegistry};
use crate::sink::sink_input::SinkInput;
use crate::sink::sink_settings::SinkSettings;
use crate::writer::domain::media_writer::{MediaWriter, OptionDescriptor, StreamInfo};
use crate::writer::domain::writer_event::{EventBus, SinkEvent};
use crate::writer::infrastructure::writer_factory::WriterFactory;

/// Multi-stream media sink with a swappable writer backend.
///
/// The engine is the single owner of the loaded writer. Configuration and
/// state changes go through `&mut self`; packets go through `i_stream` or a
/// `SinkInput` handle, which never block on output I/O.
pub struct MultiSinkEngine {
    factory: WriterFactory,
    writer: Option<Box<dyn MediaWriter>>,
    /// Name the loaded writer was registered under in the factory.
    backend_name: Option<String>,
    location: String,
    registry: StreamRegistry,
    catalog: BackendCatalog,
    machine: SinkStateMachine,
    input: SinkInput,
    events: EventBus,
    /// Codec option overrides applied to streams as they are added.
    pending_codec_options: BTreeMap<usize, Params>,
}

fn borrow_writer(writer: &mut Option<Box<dyn MediaWriter>>) -> Option<&mut dyn MediaWriter> {
    match writer {
        Some(writer) => Some(writer.as_mut()),
        None => None,
    }
}

impl MultiSinkEngine {
    /// An engine with no backend loaded.
    pub fn new(factory: WriterFactory) -> Self {
        Self {
            factory,
            writer: None,
            backend_name: None,
            location: String::new(),
            registry: StreamRegistry::new(),
            catalog: BackendCatalog::new(),
            machine: SinkStateMachine::new(),
            input: SinkInput::new(),
            events: EventBus::new(),
            pending_codec_options: BTreeMap::new(),
        }
    }

    /// An engine over the bundled backends with `backend` loaded.
    pub fn with_backend(backend: &str) -> Result<Self, SinkError> {
        let mut engine = Self::new(WriterFactory::with_builtin());
        engine.set_backend(backend)?;
        Ok(engine)
    }

    // --- State ---

    pub fn state(&self) -> SinkState {
        self.machine.state()
    }

    /// Requests a state change. Returns `false` when it was rejected, in
    /// which case the state is unchanged.
    pub fn set_state(&mut self, target: SinkState) -> bool {
        if self.machine.state().is_active() && !target.is_active() {
            self.input.detach();
        }

        match self
            .machine
            .set_state(borrow_writer(&mut self.writer), target)
        {
            Ok(Transition::Unchanged) => true,
            Ok(transition) => {
                match transition {
                    Transition::Activated(queue) => self.input.attach(target, queue),
                    _ => self.input.set_state(target),
                }
                self.events.publish(SinkEvent::StateChanged(target));
                true
            }
            Err(e) => {
                log::warn!("Rejected sink state change to {target}: {e}");
                false
            }
        }
    }

    // --- Packets ---

    /// Delivers a packet to the backend. Dropped silently unless the sink is
    /// playing and the stream is registered.
    pub fn i_stream(&self, packet: Packet) {
        self.input.i_stream(packet);
    }

    /// Handle for delivering packets from other threads.
    pub fn input(&self) -> SinkInput {
        self.input.clone()
    }

    pub fn subscribe(&self) -> Receiver<SinkEvent> {
        self.events.subscribe()
    }

    // --- Backend ---

    /// Factory name of the loaded backend.
    pub fn backend(&self) -> Option<&str> {
        self.backend_name.as_deref()
    }

    pub fn backends(&self) -> Vec<String> {
        self.factory.names()
    }

    pub fn catalog(&self) -> &BackendCatalog {
        &self.catalog
    }

    /// Loads backend `name`, replacing the current one.
    ///
    /// An active sink is taken through `Null`: the old writer is fully
    /// released before the new one is built. Registered streams are
    /// renegotiated on the new writer from their caps, the location is
    /// reattached and the prior state is restored if possible. Returns the
    /// resulting state. An unknown name changes nothing.
    pub fn set_backend(&mut self, name: &str) -> Result<SinkState, SinkError> {
        if !self.factory.contains(name) {
            return Err(SinkError::UnknownBackend(name.to_string()));
        }
        if self.backend() == Some(name) {
            return Ok(self.state());
        }

        let prior = self.state();
        if prior.is_active() {
            self.set_state(SinkState::Null);
        }
        self.writer = None;
        self.backend_name = None;
        self.catalog.clear();

        let previous: Vec<StreamDescriptor> = self.registry.descriptors().cloned().collect();
        self.registry.clear_streams(None);

        let mut writer = self.factory.create(name)?;
        writer.set_location(&self.location);
        for stream in previous {
            let requested = self.requested_params(stream.index, &Params::new());
            if let Err(e) =
                self.registry
                    .add_stream(writer.as_mut(), stream.index, &stream.caps, &requested)
            {
                log::warn!("Dropping stream {} on backend '{name}': {e}", stream.index);
            }
        }
        writer.set_event_bus(self.events.clone());
        self.catalog.refresh(writer.as_ref());
        let streams = writer.streams();
        let default_format = writer.default_format();
        self.writer = Some(writer);
        self.backend_name = Some(name.to_string());
        self.input.set_accepted(self.registry.accepted());

        self.events.publish(SinkEvent::BackendChanged(name.to_string()));
        self.events.publish(SinkEvent::StreamsChanged(streams));
        self.publish_catalog_change(default_format);

        if prior.is_active() && !self.set_state(prior) {
            log::warn!("Backend '{name}' could not resume {prior}; sink left in null");
        }
        Ok(self.state())
    }

    fn publish_catalog_change(&self, default_format: String) {
        self.events.publish(SinkEvent::SupportedFormatsChanged(
            self.catalog.supported_formats(),
        ));
        self.events
            .publish(SinkEvent::DefaultFormatChanged(default_format));
    }

    fn refresh_catalog(&mut self, previous_default: String) {
        let Some(writer) = self.writer.as_deref() else {
            return;
        };
        self.catalog.refresh(writer);
        let formats = self.catalog.supported_formats();
        self.events.publish(SinkEvent::SupportedFormatsChanged(formats));
        let default_format = writer.default_format();
        if default_format != previous_default {
            self.events
                .publish(SinkEvent::DefaultFormatChanged(default_format));
        }
    }

    // --- Location ---

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Sets the output target; used on the next activation.
    pub fn set_location(&mut self, location: &str) {
        if self.location == location {
            return;
        }
        self.location = location.to_string();
        if let Some(writer) = self.writer.as_mut() {
            writer.set_location(location);
        }
        self.events
            .publish(SinkEvent::LocationChanged(self.location.clone()));
    }

    pub fn reset_location(&mut self) {
        self.set_location("");
    }

    // --- Output format ---

    pub fn default_format(&self) -> String {
        self.writer
            .as_deref()
            .map(|w| w.default_format())
            .unwrap_or_default()
    }

    pub fn output_format(&self) -> String {
        self.writer
            .as_deref()
            .map(|w| w.output_format())
            .unwrap_or_default()
    }

    pub fn set_output_format(&mut self, format: &str) {
        if let Some(writer) = self.writer.as_mut() {
            writer.set_output_format(format);
        }
    }

    pub fn reset_output_format(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            writer.reset_output_format();
        }
    }

    // --- Format options ---

    pub fn format_options(&self) -> Vec<OptionDescriptor> {
        self.writer
            .as_deref()
            .map(|w| w.format_options())
            .unwrap_or_default()
    }

    pub fn set_format_options(&mut self, options: &Params) {
        if let Some(writer) = self.writer.as_mut() {
            writer.set_format_options(options);
        }
    }

    pub fn reset_format_options(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            writer.reset_format_options();
        }
    }

    // --- Codec options ---

    pub fn codec_options(&self, index: usize) -> Vec<OptionDescriptor> {
        self.writer
            .as_deref()
            .map(|w| w.codec_options(index))
            .unwrap_or_default()
    }

    pub fn set_codec_options(&mut self, index: usize, options: &Params) -> Result<(), SinkError> {
        let writer = self.writer.as_mut().ok_or(SinkError::NoBackendLoaded)?;
        if !self.registry.contains(index) {
            return Err(SinkError::UnknownStream(index));
        }
        writer.set_codec_options(index, options)?;
        Self::sync_stream_params(&mut self.registry, writer.as_ref(), index)
    }

    pub fn reset_codec_options(&mut self, index: usize) -> Result<(), SinkError> {
        let writer = self.writer.as_mut().ok_or(SinkError::NoBackendLoaded)?;
        if !self.registry.contains(index) {
            return Err(SinkError::UnknownStream(index));
        }
        writer.reset_codec_options(index)?;
        Self::sync_stream_params(&mut self.registry, writer.as_ref(), index)
    }

    fn sync_stream_params(
        registry: &mut StreamRegistry,
        writer: &dyn MediaWriter,
        index: usize,
    ) -> Result<(), SinkError> {
        let info = writer
            .streams()
            .into_iter()
            .find(|s| s.index == index)
            .ok_or(SinkError::UnknownStream(index))?;
        registry.set_codec_params(index, info.params)
    }

    // --- Streams ---

    fn requested_params(&self, index: usize, codec_params: &Params) -> Params {
        match self.pending_codec_options.get(&index) {
            Some(pending) => params::merge(pending, codec_params),
            None => codec_params.clone(),
        }
    }

    /// Registers stream `index` and returns its negotiated parameters.
    ///
    /// A stream added while the sink is active is written from the next
    /// activation on.
    pub fn add_stream(
        &mut self,
        index: usize,
        caps: &Caps,
        codec_params: &Params,
    ) -> Result<StreamDescriptor, SinkError> {
        let requested = self.requested_params(index, codec_params);
        let writer = self.writer.as_mut().ok_or(SinkError::NoBackendLoaded)?;
        let stream = self
            .registry
            .add_stream(writer.as_mut(), index, caps, &requested)?;
        self.input.set_accepted(self.registry.accepted());
        Ok(stream)
    }

    pub fn update_stream(
        &mut self,
        index: usize,
        codec_params: &Params,
    ) -> Result<StreamDescriptor, SinkError> {
        let writer = self.writer.as_mut().ok_or(SinkError::NoBackendLoaded)?;
        self.registry
            .update_stream(writer.as_mut(), index, codec_params)
    }

    pub fn clear_streams(&mut self) {
        self.registry.clear_streams(borrow_writer(&mut self.writer));
        self.input.set_accepted(self.registry.accepted());
    }

    pub fn stream(&self, index: usize) -> Option<&StreamDescriptor> {
        self.registry.get(index)
    }

    pub fn streams(&self) -> Vec<StreamInfo> {
        self.writer
            .as_deref()
            .map(|w| w.streams())
            .unwrap_or_default()
    }

    // --- Blacklists ---

    pub fn formats_blacklist(&self) -> Vec<String> {
        self.writer
            .as_deref()
            .map(|w| w.formats_blacklist())
            .unwrap_or_default()
    }

    pub fn set_formats_blacklist(&mut self, formats: &[String]) {
        let previous_default = self.default_format();
        if let Some(writer) = self.writer.as_mut() {
            writer.set_formats_blacklist(formats);
            self.refresh_catalog(previous_default);
        }
    }

    pub fn reset_formats_blacklist(&mut self) {
        let previous_default = self.default_format();
        if let Some(writer) = self.writer.as_mut() {
            writer.reset_formats_blacklist();
            self.refresh_catalog(previous_default);
        }
    }

    pub fn codecs_blacklist(&self) -> Vec<String> {
        self.writer
            .as_deref()
            .map(|w| w.codecs_blacklist())
            .unwrap_or_default()
    }

    pub fn set_codecs_blacklist(&mut self, codecs: &[String]) {
        let previous_default = self.default_format();
        if let Some(writer) = self.writer.as_mut() {
            writer.set_codecs_blacklist(codecs);
            self.refresh_catalog(previous_default);
        }
    }

    pub fn reset_codecs_blacklist(&mut self) {
        let previous_default = self.default_format();
        if let Some(writer) = self.writer.as_mut() {
            writer.reset_codecs_blacklist();
            self.refresh_catalog(previous_default);
        }
    }

    // --- Metadata queries ---

    pub fn supported_formats(&self) -> Vec<String> {
        self.catalog.supported_formats()
    }

    pub fn file_extensions(&self, format: &str) -> Vec<String> {
        self.catalog.file_extensions(format)
    }

    pub fn format_description(&self, format: &str) -> String {
        self.catalog.format_description(format)
    }

    pub fn supported_codecs(&self, format: &str, kind: Option<MediaKind>) -> Vec<String> {
        self.catalog.supported_codecs(format, kind)
    }

    pub fn default_codec(&self, format: &str, kind: MediaKind) -> Option<String> {
        self.writer
            .as_deref()
            .and_then(|w| w.default_codec(format, kind))
    }

    pub fn codec_description(&self, codec: &str) -> String {
        self.catalog.codec_description(codec)
    }

    pub fn codec_type(&self, codec: &str) -> Option<MediaKind> {
        self.catalog.codec_type(codec)
    }

    pub fn default_codec_params(&self, codec: &str) -> Params {
        self.catalog.default_codec_params(codec)
    }

    // --- Settings ---

    /// Loads the configured backend (when different) and applies every
    /// setting. Codec options are kept and applied to streams as they are
    /// added.
    pub fn apply_settings(&mut self, settings: &SinkSettings) -> Result<(), SinkError> {
        self.set_backend(&settings.backend)?;
        self.set_location(&settings.location);
        self.set_formats_blacklist(&settings.formats_blacklist);
        self.set_codecs_blacklist(&settings.codecs_blacklist);
        self.set_output_format(&settings.output_format);
        self.reset_format_options();
        if !settings.format_options.is_empty() {
            self.set_format_options(&settings.format_options);
        }
        self.pending_codec_options = settings.codec_options.clone();
        Ok(())
    }

    /// Current configuration in persistable form.
    ///
    /// Codec options combine the overrides loaded from settings with the
    /// non-default options of every registered stream.
    pub fn settings(&self) -> SinkSettings {
        let mut codec_options = self.pending_codec_options.clone();
        for stream in self.registry.descriptors() {
            let live = changed_options(self.codec_options(stream.index));
            if !live.is_empty() {
                let entry = codec_options.entry(stream.index).or_default();
                *entry = params::merge(entry, &live);
            }
        }
        SinkSettings {
            backend: self.backend().unwrap_or_default().to_string(),
            location: self.location.clone(),
            output_format: self.output_format(),
            format_options: changed_options(self.format_options()),
            codec_options,
            formats_blacklist: self.formats_blacklist(),
            codecs_blacklist: self.codecs_blacklist(),
        }
    }
}

fn changed_options(options: Vec<OptionDescriptor>) -> Params {
    options
        .into_iter()
        .filter(|o| o.value != o.default_value)
        .map(|o| (o.name, o.value))
        .collect()
}

impl Drop for MultiSinkEngine {
    fn drop(&mut self) {
        self.set_state(SinkState::Null);
    }
}
