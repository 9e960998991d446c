use std::collections::BTreeMap;

use crate::shared::caps::MediaKind;
use crate::shared::params::Params;
use crate::writer::domain::media_writer::MediaWriter;

#[derive(Clone, Debug, PartialEq)]
pub struct FormatDescriptor {
    pub name: String,
    pub extensions: Vec<String>,
    pub description: String,
    pub codecs: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CodecDescriptor {
    pub name: String,
    pub description: String,
    pub kind: Option<MediaKind>,
    pub default_params: Params,
}

/// Cached format and codec metadata of the loaded writer.
///
/// A codec shared by several formats is described once, by the first format
/// that lists it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BackendCatalog {
    formats: Vec<FormatDescriptor>,
    codecs: BTreeMap<String, CodecDescriptor>,
}

impl BackendCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the whole catalog from `writer` and swaps it in at once.
    pub fn refresh(&mut self, writer: &dyn MediaWriter) {
        let mut formats = Vec::new();
        let mut codecs = BTreeMap::new();

        for format in writer.supported_formats() {
            let format_codecs = writer.supported_codecs(&format, None);
            for codec in &format_codecs {
                codecs.entry(codec.clone()).or_insert_with(|| CodecDescriptor {
                    name: codec.clone(),
                    description: writer.codec_description(codec),
                    kind: writer.codec_type(codec),
                    default_params: writer.default_codec_params(codec),
                });
            }
            formats.push(FormatDescriptor {
                extensions: writer.file_extensions(&format),
                description: writer.format_description(&format),
                codecs: format_codecs,
                name: format,
            });
        }

        log::debug!(
            "Catalog refreshed from '{}': {} formats, {} codecs",
            writer.name(),
            formats.len(),
            codecs.len()
        );
        *self = Self { formats, codecs };
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    pub fn format(&self, name: &str) -> Option<&FormatDescriptor> {
        self.formats.iter().find(|f| f.name == name)
    }

    pub fn codec(&self, name: &str) -> Option<&CodecDescriptor> {
        self.codecs.get(name)
    }

    pub fn formats(&self) -> &[FormatDescriptor] {
        &self.formats
    }

    pub fn supported_formats(&self) -> Vec<String> {
        self.formats.iter().map(|f| f.name.clone()).collect()
    }

    pub fn file_extensions(&self, format: &str) -> Vec<String> {
        self.format(format)
            .map(|f| f.extensions.clone())
            .unwrap_or_default()
    }

    pub fn format_description(&self, format: &str) -> String {
        self.format(format)
            .map(|f| f.description.clone())
            .unwrap_or_default()
    }

    /// Codecs of `format` (all known codecs when `format` is empty),
    /// optionally restricted to one kind.
    pub fn supported_codecs(&self, format: &str, kind: Option<MediaKind>) -> Vec<String> {
        let names: Vec<&String> = if format.is_empty() {
            self.codecs.keys().collect()
        } else {
            match self.format(format) {
                Some(f) => f.codecs.iter().collect(),
                None => return Vec::new(),
            }
        };
        names
            .into_iter()
            .filter(|name| match kind {
                Some(kind) => self.codec_type(name) == Some(kind),
                None => true,
            })
            .cloned()
            .collect()
    }

    pub fn codec_description(&self, codec: &str) -> String {
        self.codec(codec)
            .map(|c| c.description.clone())
            .unwrap_or_default()
    }

    pub fn codec_type(&self, codec: &str) -> Option<MediaKind> {
        self.codec(codec).and_then(|c| c.kind)
    }

    pub fn default_codec_params(&self, codec: &str) -> Params {
        self.codec(codec)
            .map(|c| c.default_params.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::infrastructure::fake_container::FakeContainer;
    use rstest::rstest;
    use serde_json::json;

    fn refreshed() -> BackendCatalog {
        let writer = FakeContainer::default().writer();
        let mut catalog = BackendCatalog::new();
        catalog.refresh(writer.as_ref());
        catalog
    }

    #[test]
    fn test_refresh_collects_formats() {
        let catalog = refreshed();
        assert_eq!(catalog.supported_formats(), vec!["fake", "fakeav"]);
        assert_eq!(catalog.file_extensions("fakeav"), vec!["fav"]);
        assert_eq!(catalog.format_description("fake"), "Fake container");
    }

    #[test]
    fn test_codecs_are_described_once() {
        let catalog = refreshed();
        assert_eq!(
            catalog.supported_codecs("", None),
            vec!["fakeaudio", "fakesub", "fakevideo"]
        );
        assert_eq!(catalog.codec_description("fakevideo"), "Fake video");
        assert_eq!(catalog.default_codec_params("fakevideo")["quality"], json!(5));
    }

    #[rstest]
    #[case::video("fake", Some(MediaKind::Video), vec!["fakevideo"])]
    #[case::audio("fakeav", Some(MediaKind::Audio), vec!["fakeaudio"])]
    #[case::no_filter("fakeav", None, vec!["fakeaudio", "fakevideo"])]
    #[case::unknown_format("mkv", None, vec![])]
    fn test_supported_codecs(
        #[case] format: &str,
        #[case] kind: Option<MediaKind>,
        #[case] expected: Vec<&str>,
    ) {
        assert_eq!(refreshed().supported_codecs(format, kind), expected);
    }

    #[test]
    fn test_unknown_keys_yield_defaults() {
        let catalog = refreshed();
        assert!(catalog.file_extensions("nope").is_empty());
        assert!(catalog.format_description("nope").is_empty());
        assert!(catalog.codec_description("nope").is_empty());
        assert_eq!(catalog.codec_type("nope"), None);
        assert!(catalog.default_codec_params("nope").is_empty());
    }

    #[test]
    fn test_refresh_is_idempotent() {
        let writer = FakeContainer::default().writer();
        let mut catalog = BackendCatalog::new();
        catalog.refresh(writer.as_ref());
        let first = catalog.clone();
        catalog.refresh(writer.as_ref());
        assert_eq!(catalog, first);
    }

    #[test]
    fn test_refresh_honours_blacklists() {
        let mut writer = FakeContainer::default().writer();
        writer.set_formats_blacklist(&["fake".to_string()]);
        writer.set_codecs_blacklist(&["fakevideo".to_string()]);
        let mut catalog = BackendCatalog::new();

        catalog.refresh(writer.as_ref());

        assert_eq!(catalog.supported_formats(), vec!["fakeav"]);
        assert_eq!(catalog.supported_codecs("fakeav", None), vec!["fakeaudio"]);
    }

    #[test]
    fn test_clear_empties_catalog() {
        let mut catalog = refreshed();
        catalog.clear();
        assert!(catalog.is_empty());
        assert!(catalog.supported_codecs("", None).is_empty());
    }
}
