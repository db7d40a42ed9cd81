//! §9 redesign: HLS and DASH are tagged variants over one contract
//! rather than parallel class hierarchies. `ManifestFormat` is the tag;
//! everything downstream of parsing works on `PlaylistSnapshot` and
//! doesn't match on it again.

use aamp_playlist::dash::{AdaptationSet, Mpd};
use aamp_types::Profile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Hls,
    Dash,
}

#[must_use]
pub fn sniff_format(url: &str, body: &[u8]) -> ManifestFormat {
    if url.ends_with(".mpd") || body.trim_ascii_start().starts_with(b"<?xml") || body.trim_ascii_start().starts_with(b"<MPD") {
        ManifestFormat::Dash
    } else {
        ManifestFormat::Hls
    }
}

fn is_video_set(set: &AdaptationSet) -> bool {
    set.content_type.as_deref() == Some("video") || set.mime_type.as_deref().is_some_and(|m| m.starts_with("video/"))
}

fn is_audio_set(set: &AdaptationSet) -> bool {
    set.content_type.as_deref() == Some("audio") || set.mime_type.as_deref().is_some_and(|m| m.starts_with("audio/"))
}

/// Video representations across every period, flattened into the same
/// profile-ladder shape `profiles_from_mpd` produces for the whole MPD,
/// but scoped to video `AdaptationSet`s so ABR never considers an audio
/// representation's bandwidth a video rung.
#[must_use]
pub fn dash_video_profiles(mpd: &Mpd) -> Vec<Profile> {
    mpd.periods
        .iter()
        .flat_map(|period| &period.adaptation_sets)
        .filter(|set| is_video_set(set))
        .flat_map(|set| &set.representations)
        .map(|representation| Profile {
            is_iframe_track: false,
            bandwidth_bps: representation.bandwidth,
            width: representation.width.unwrap_or(0),
            height: representation.height.unwrap_or(0),
            uri: representation.id.clone(),
            codecs: representation.codecs.clone().unwrap_or_default(),
            audio_group: None,
        })
        .collect()
}

/// The first audio representation found in period 0, if any. Multi-period
/// audio-track switching isn't modeled; single-period live/VOD content is
/// the common case this targets.
#[must_use]
pub fn dash_default_audio_representation_id(mpd: &Mpd) -> Option<String> {
    mpd.periods.first()?.adaptation_sets.iter().find(|set| is_audio_set(set)).and_then(|set| set.representations.first()).map(|representation| representation.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_dash_from_url_suffix() {
        assert_eq!(sniff_format("https://example/manifest.mpd", b""), ManifestFormat::Dash);
    }

    #[test]
    fn sniffs_dash_from_xml_prelude() {
        assert_eq!(sniff_format("https://example/stream", b"<?xml version=\"1.0\"?><MPD/>"), ManifestFormat::Dash);
    }

    #[test]
    fn falls_back_to_hls() {
        assert_eq!(sniff_format("https://example/master.m3u8", b"#EXTM3U\n"), ManifestFormat::Hls);
    }
}
