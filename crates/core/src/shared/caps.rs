use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::shared::params::Params;

/// Kind of elementary stream a caps descriptor or codec belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
    Subtitle,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Subtitle => "subtitle",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "audio" => Ok(MediaKind::Audio),
            "video" => Ok(MediaKind::Video),
            "subtitle" | "text" => Ok(MediaKind::Subtitle),
            other => Err(format!("unknown media kind '{other}'")),
        }
    }
}

/// Capability descriptor for one input stream.
///
/// `properties` carries format parameters such as `width`, `height`, `fps`,
/// `sample_rate` or `channels`; which keys matter is up to the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Caps {
    kind: MediaKind,
    mime: String,
    properties: Params,
}

impl Caps {
    pub fn new(kind: MediaKind, mime: impl Into<String>) -> Self {
        Self {
            kind,
            mime: mime.into(),
            properties: Params::new(),
        }
    }

    pub fn video(width: u32, height: u32, fps: u32) -> Self {
        Self::new(MediaKind::Video, "video/x-raw")
            .with("width", width)
            .with("height", height)
            .with("fps", fps)
    }

    pub fn audio(sample_rate: u32, channels: u32) -> Self {
        Self::new(MediaKind::Audio, "audio/x-raw")
            .with("sample_rate", sample_rate)
            .with("channels", channels)
    }

    pub fn subtitle() -> Self {
        Self::new(MediaKind::Subtitle, "text/x-raw")
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn properties(&self) -> &Params {
        &self.properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_video_caps_carry_geometry() {
        let caps = Caps::video(640, 480, 30);
        assert_eq!(caps.kind(), MediaKind::Video);
        assert_eq!(caps.mime(), "video/x-raw");
        assert_eq!(caps.properties()["width"], 640);
        assert_eq!(caps.properties()["height"], 480);
        assert_eq!(caps.properties()["fps"], 30);
    }

    #[test]
    fn test_audio_caps_carry_rate_and_channels() {
        let caps = Caps::audio(48_000, 2);
        assert_eq!(caps.kind(), MediaKind::Audio);
        assert_eq!(caps.properties()["sample_rate"], 48_000);
        assert_eq!(caps.properties()["channels"], 2);
    }

    #[rstest]
    #[case::audio("audio", MediaKind::Audio)]
    #[case::video("Video", MediaKind::Video)]
    #[case::subtitle("subtitle", MediaKind::Subtitle)]
    #[case::text_alias("text", MediaKind::Subtitle)]
    fn test_media_kind_parses(#[case] input: &str, #[case] expected: MediaKind) {
        assert_eq!(input.parse::<MediaKind>().unwrap(), expected);
    }

    #[test]
    fn test_media_kind_rejects_unknown() {
        assert!("data".parse::<MediaKind>().is_err());
    }

    #[test]
    fn test_media_kind_display_matches_as_str() {
        for kind in [MediaKind::Audio, MediaKind::Video, MediaKind::Subtitle] {
            assert_eq!(kind.to_string(), kind.as_str());
        }
    }
}
