use serde::{Deserialize, Serialize};

/// One of the elementary media types a track fetches, decrypts and injects.
///
/// Subtitle is carried through the type even though §4.4 only details the
/// video/audio fetch and inject loops in depth — the same state machine
/// applies, just with a much lower duty cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MediaType {
    Video,
    Audio,
    Subtitle,
    /// I-frame-only track used for trickplay, tracked separately from
    /// `Video` so the fetch loop can pick the iframe index without
    /// disturbing normal-play bookkeeping.
    IFrame,
}

impl MediaType {
    #[must_use]
    pub fn is_audio(self) -> bool {
        matches!(self, MediaType::Audio)
    }

    #[must_use]
    pub fn is_video(self) -> bool {
        matches!(self, MediaType::Video | MediaType::IFrame)
    }
}

/// One variant stream of the video at a given bandwidth/resolution.
/// Immutable after manifest parse (§3); identified by a stable index into
/// `StreamAbstraction::profiles`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub is_iframe_track: bool,
    pub bandwidth_bps: i64,
    pub width: u32,
    pub height: u32,
    pub uri: String,
    pub codecs: String,
    pub audio_group: Option<String>,
}

impl Profile {
    #[must_use]
    pub fn new(bandwidth_bps: i64, width: u32, height: u32, uri: impl Into<String>) -> Self {
        Self {
            is_iframe_track: false,
            bandwidth_bps,
            width,
            height,
            uri: uri.into(),
            codecs: String::new(),
            audio_group: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariantType {
    Audio,
    Video,
    Subtitle,
}

/// Elementary video codec, as sniffed from a profile's `CODECS` attribute.
/// Used only to tell the sink what to expect from `Configure` (§6); the
/// core never inspects payload bytes to make this determination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoFormat {
    H264,
    Hevc,
    Unknown,
}

/// Elementary audio codec, as sniffed from a profile's `CODECS` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioFormat {
    Aac,
    Ac3,
    Eac3,
    Unknown,
}

impl VideoFormat {
    /// Scans a comma-separated `CODECS` attribute value (e.g.
    /// `"avc1.64001f,mp4a.40.2"`) for the first token naming a video
    /// codec this core recognizes.
    #[must_use]
    pub fn from_codecs(codecs: &str) -> Self {
        for token in codecs.split(',').map(str::trim) {
            if token.starts_with("avc1") || token.starts_with("avc3") {
                return VideoFormat::H264;
            }
            if token.starts_with("hvc1") || token.starts_with("hev1") {
                return VideoFormat::Hevc;
            }
        }
        VideoFormat::Unknown
    }
}

impl AudioFormat {
    #[must_use]
    pub fn from_codecs(codecs: &str) -> Self {
        for token in codecs.split(',').map(str::trim) {
            if token.starts_with("ec-3") || token.starts_with("eac3") {
                return AudioFormat::Eac3;
            }
            if token.starts_with("ac-3") {
                return AudioFormat::Ac3;
            }
            if token.starts_with("mp4a") {
                return AudioFormat::Aac;
            }
        }
        AudioFormat::Unknown
    }
}

/// An alternate media rendition (audio language / subtitle) referenced
/// from a profile's `EXT-X-MEDIA` group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub kind: VariantType,
    pub group_id: String,
    pub name: String,
    pub language_tag: Option<String>,
    pub auto_select: bool,
    pub default: bool,
    pub uri: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_format_recognizes_avc_and_hevc_tokens() {
        assert_eq!(VideoFormat::from_codecs("avc1.64001f,mp4a.40.2"), VideoFormat::H264);
        assert_eq!(VideoFormat::from_codecs("hvc1.1.6.L93.90"), VideoFormat::Hevc);
        assert_eq!(VideoFormat::from_codecs("opus"), VideoFormat::Unknown);
    }

    #[test]
    fn audio_format_prefers_the_first_recognized_token() {
        assert_eq!(AudioFormat::from_codecs("avc1.64001f,mp4a.40.2"), AudioFormat::Aac);
        assert_eq!(AudioFormat::from_codecs("ec-3"), AudioFormat::Eac3);
        assert_eq!(AudioFormat::from_codecs("ac-3"), AudioFormat::Ac3);
    }
}
