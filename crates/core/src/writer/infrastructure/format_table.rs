use std::path::Path;

use serde_json::Value;

use crate::shared::caps::MediaKind;
use crate::shared::params::Params;
use crate::writer::domain::media_writer::OptionDescriptor;

/// Compile-time default of an option.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Str(&'static str),
}

impl OptionValue {
    pub fn to_value(self) -> Value {
        match self {
            OptionValue::Bool(b) => Value::from(b),
            OptionValue::Int(i) => Value::from(i),
            OptionValue::Str(s) => Value::from(s),
        }
    }
}

#[derive(Debug)]
pub struct OptionSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub default: OptionValue,
}

impl OptionSpec {
    /// Describes this option using `current` as its value, falling back to
    /// the default when the option has not been set.
    pub fn describe(&self, current: &Params) -> OptionDescriptor {
        let default_value = self.default.to_value();
        let value = current
            .get(self.name)
            .cloned()
            .unwrap_or_else(|| default_value.clone());
        OptionDescriptor {
            name: self.name.to_string(),
            description: self.description.to_string(),
            default_value,
            value,
        }
    }
}

#[derive(Debug)]
pub struct CodecSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: MediaKind,
    pub options: &'static [OptionSpec],
}

impl CodecSpec {
    pub fn default_params(&self) -> Params {
        self.options
            .iter()
            .map(|o| (o.name.to_string(), o.default.to_value()))
            .collect()
    }
}

#[derive(Debug)]
pub struct FormatSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub extensions: &'static [&'static str],
    /// Codecs in order of preference; the first of each kind is the default.
    pub codecs: &'static [&'static str],
    pub options: &'static [OptionSpec],
}

/// Static description of everything a container backend can produce.
#[derive(Debug)]
pub struct FormatTable {
    pub formats: &'static [FormatSpec],
    pub codecs: &'static [CodecSpec],
    pub default_format: &'static str,
}

impl FormatTable {
    pub fn format(&self, name: &str) -> Option<&'static FormatSpec> {
        self.formats.iter().find(|f| f.name == name)
    }

    pub fn codec(&self, name: &str) -> Option<&'static CodecSpec> {
        self.codecs.iter().find(|c| c.name == name)
    }

    /// Picks the format whose extension list contains the location's
    /// extension (case-insensitive).
    pub fn guess_format(&self, location: &str) -> Option<&'static FormatSpec> {
        let ext = Path::new(location)
            .extension()
            .and_then(|e| e.to_str())?
            .to_ascii_lowercase();
        self.formats
            .iter()
            .find(|f| f.extensions.iter().any(|e| *e == ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    static CODECS: &[CodecSpec] = &[
        CodecSpec {
            name: "vid",
            description: "Test video",
            kind: MediaKind::Video,
            options: &[OptionSpec {
                name: "gop",
                description: "Keyframe interval",
                default: OptionValue::Int(12),
            }],
        },
        CodecSpec {
            name: "aud",
            description: "Test audio",
            kind: MediaKind::Audio,
            options: &[],
        },
    ];

    static FORMATS: &[FormatSpec] = &[
        FormatSpec {
            name: "box",
            description: "Box container",
            extensions: &["box", "bx"],
            codecs: &["vid", "aud"],
            options: &[],
        },
        FormatSpec {
            name: "tube",
            description: "Tube container",
            extensions: &["tube"],
            codecs: &["aud"],
            options: &[],
        },
    ];

    static TABLE: FormatTable = FormatTable {
        formats: FORMATS,
        codecs: CODECS,
        default_format: "box",
    };

    #[rstest]
    #[case::primary_ext("/tmp/out.box", Some("box"))]
    #[case::secondary_ext("out.BX", Some("box"))]
    #[case::other_format("song.tube", Some("tube"))]
    #[case::unknown_ext("out.mp4", None)]
    #[case::no_ext("out", None)]
    fn test_guess_format(#[case] location: &str, #[case] expected: Option<&str>) {
        assert_eq!(TABLE.guess_format(location).map(|f| f.name), expected);
    }

    #[test]
    fn test_codec_default_params_from_options() {
        let params = TABLE.codec("vid").unwrap().default_params();
        assert_eq!(params.get("gop"), Some(&Value::from(12)));
        assert!(TABLE.codec("aud").unwrap().default_params().is_empty());
    }

    #[test]
    fn test_describe_prefers_current_value() {
        let spec = &TABLE.codec("vid").unwrap().options[0];
        let mut current = Params::new();
        assert_eq!(spec.describe(&current).value, Value::from(12));

        current.insert("gop".into(), Value::from(30));
        let described = spec.describe(&current);
        assert_eq!(described.value, Value::from(30));
        assert_eq!(described.default_value, Value::from(12));
    }

    #[test]
    fn test_lookup_unknown_returns_none() {
        assert!(TABLE.format("nope").is_none());
        assert!(TABLE.codec("nope").is_none());
    }
}
