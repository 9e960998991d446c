use std::collections::{BTreeMap, HashSet};

use crate::shared::caps::Caps;
use crate::shared::error::SinkError;
use crate::shared::params::Params;
use crate::writer::domain::media_writer::MediaWriter;

/// A declared output stream with its negotiated codec parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamDescriptor {
    pub index: usize,
    pub caps: Caps,
    pub codec_params: Params,
}

/// Streams registered with the sink, keyed by caller-assigned index.
///
/// Every registered index is part of the accepted-input set. Registration
/// goes through the writer first, so a rejected stream never enters the
/// registry and never disturbs the others.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: BTreeMap<usize, StreamDescriptor>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stream(
        &mut self,
        writer: &mut dyn MediaWriter,
        index: usize,
        caps: &Caps,
        codec_params: &Params,
    ) -> Result<StreamDescriptor, SinkError> {
        if self.streams.contains_key(&index) {
            return Err(SinkError::StreamExists(index));
        }
        let negotiated = writer.add_stream(index, caps, codec_params)?;
        let descriptor = StreamDescriptor {
            index,
            caps: caps.clone(),
            codec_params: negotiated,
        };
        self.streams.insert(index, descriptor.clone());
        log::debug!("Registered stream {index} ({})", caps.mime());
        Ok(descriptor)
    }

    pub fn update_stream(
        &mut self,
        writer: &mut dyn MediaWriter,
        index: usize,
        codec_params: &Params,
    ) -> Result<StreamDescriptor, SinkError> {
        let stream = self
            .streams
            .get_mut(&index)
            .ok_or(SinkError::UnknownStream(index))?;
        stream.codec_params = writer.update_stream(index, codec_params)?;
        Ok(stream.clone())
    }

    /// Replaces the stored parameters of `index` after the writer changed
    /// them through its codec options.
    pub fn set_codec_params(&mut self, index: usize, codec_params: Params) -> Result<(), SinkError> {
        let stream = self
            .streams
            .get_mut(&index)
            .ok_or(SinkError::UnknownStream(index))?;
        stream.codec_params = codec_params;
        Ok(())
    }

    /// Removes every stream, from the writer too when one is given.
    pub fn clear_streams(&mut self, writer: Option<&mut dyn MediaWriter>) {
        self.streams.clear();
        if let Some(writer) = writer {
            writer.clear_streams();
        }
    }

    pub fn get(&self, index: usize) -> Option<&StreamDescriptor> {
        self.streams.get(&index)
    }

    pub fn contains(&self, index: usize) -> bool {
        self.streams.contains_key(&index)
    }

    /// Indices eligible to receive packets.
    pub fn accepted(&self) -> HashSet<usize> {
        self.streams.keys().copied().collect()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &StreamDescriptor> {
        self.streams.values()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
