use std::collections::BTreeMap;
use std::fmt;

use crate::shared::constants::DEFAULT_BACKEND;
use crate::shared::error::SinkError;
use crate::writer::domain::media_writer::MediaWriter;

use super::ffmpeg_container::FfmpegContainer;
use super::muxing_writer::MuxingWriter;
use super::native_container::NativeContainer;

type WriterConstructor = Box<dyn Fn() -> Box<dyn MediaWriter> + Send + Sync>;

/// Maps backend identifiers to writer constructors.
pub struct WriterFactory {
    constructors: BTreeMap<String, WriterConstructor>,
}

impl WriterFactory {
    /// A factory with no backends registered.
    pub fn new() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// A factory with the bundled `ffmpeg` and `native` backends.
    pub fn with_builtin() -> Self {
        let mut factory = Self::new();
        factory.register(DEFAULT_BACKEND, || Box::new(MuxingWriter::new(FfmpegContainer)));
        factory.register("native", || Box::new(MuxingWriter::new(NativeContainer)));
        factory
    }

    /// Registers `constructor` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: &str, constructor: F)
    where
        F: Fn() -> Box<dyn MediaWriter> + Send + Sync + 'static,
    {
        if self
            .constructors
            .insert(name.to_string(), Box::new(constructor))
            .is_some()
        {
            log::debug!("Replaced writer backend '{name}'");
        }
    }

    /// Registered backend names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn MediaWriter>, SinkError> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| SinkError::UnknownBackend(name.to_string()))?;
        log::info!("Using '{name}' writer backend");
        Ok(constructor())
    }
}

impl Default for WriterFactory {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl fmt::Debug for WriterFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterFactory")
            .field("backends", &self.names())
            .finish()
    }
}
