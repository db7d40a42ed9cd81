//! Master-playlist parsing: turns `#EXT-X-STREAM-INF`/`#EXT-X-MEDIA` tag
//! pairs into the profile and variant tables `StreamAbstraction` selects
//! from at tune time (§4.7 step 1).

use super::attribute_list;
use crate::error::{ParseErrorKind, ParseOutcome, ParseWarning};
use aamp_types::{Profile, Variant, VariantType};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct MasterPlaylist {
    pub profiles: Vec<Profile>,
    pub variants: Vec<Variant>,
}

fn build_profile(attrs: &HashMap<String, String>, uri: Option<String>, is_iframe_track: bool) -> Option<Profile> {
    let bandwidth_bps: i64 = attrs.get("BANDWIDTH")?.parse().ok()?;
    let uri = uri?;
    let (width, height) = attrs
        .get("RESOLUTION")
        .and_then(|resolution| resolution.split_once('x'))
        .and_then(|(w, h)| Some((w.parse().ok()?, h.parse().ok()?)))
        .unwrap_or((0, 0));
    Some(Profile {
        is_iframe_track,
        bandwidth_bps,
        width,
        height,
        uri,
        codecs: attrs.get("CODECS").cloned().unwrap_or_default(),
        audio_group: attrs.get("AUDIO").cloned(),
    })
}

fn build_variant(attrs: &HashMap<String, String>) -> Option<Variant> {
    let kind = match attrs.get("TYPE")?.as_str() {
        "AUDIO" => VariantType::Audio,
        "VIDEO" => VariantType::Video,
        "SUBTITLES" => VariantType::Subtitle,
        _ => return None,
    };
    Some(Variant {
        kind,
        group_id: attrs.get("GROUP-ID")?.clone(),
        name: attrs.get("NAME")?.clone(),
        language_tag: attrs.get("LANGUAGE").cloned(),
        auto_select: attrs.get("AUTOSELECT").is_some_and(|v| v == "YES"),
        default: attrs.get("DEFAULT").is_some_and(|v| v == "YES"),
        uri: attrs.get("URI").cloned(),
    })
}

/// Parses a master playlist's `#EXT-X-STREAM-INF`, `#EXT-X-I-FRAME-STREAM-INF`
/// and `#EXT-X-MEDIA` tags into profile and variant tables.
#[must_use]
pub fn parse_master_playlist(text: &str) -> ParseOutcome<MasterPlaylist> {
    if text.trim().is_empty() {
        return ParseOutcome::Error(ParseErrorKind::EmptyInput, "<start>".to_string());
    }

    let mut warnings = Vec::new();
    let mut profiles = Vec::new();
    let mut variants = Vec::new();
    let mut pending_stream_inf: Option<HashMap<String, String>> = None;

    for (line_no, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("#EXT-X-STREAM-INF:") {
            pending_stream_inf = Some(attribute_list(rest));
        } else if let Some(rest) = line.strip_prefix("#EXT-X-I-FRAME-STREAM-INF:") {
            let attrs = attribute_list(rest);
            let uri = attrs.get("URI").cloned();
            match build_profile(&attrs, uri, true) {
                Some(profile) => profiles.push(profile),
                None => warnings.push(ParseWarning {
                    message: "EXT-X-I-FRAME-STREAM-INF missing BANDWIDTH or URI".to_string(),
                    location: line_no.to_string(),
                }),
            }
        } else if let Some(rest) = line.strip_prefix("#EXT-X-MEDIA:") {
            let attrs = attribute_list(rest);
            match build_variant(&attrs) {
                Some(variant) => variants.push(variant),
                None => warnings.push(ParseWarning {
                    message: "EXT-X-MEDIA missing TYPE, GROUP-ID or NAME".to_string(),
                    location: line_no.to_string(),
                }),
            }
        } else if !line.starts_with('#') {
            if let Some(attrs) = pending_stream_inf.take() {
                match build_profile(&attrs, Some(line.to_string()), false) {
                    Some(profile) => profiles.push(profile),
                    None => warnings.push(ParseWarning {
                        message: "EXT-X-STREAM-INF missing BANDWIDTH".to_string(),
                        location: line_no.to_string(),
                    }),
                }
            }
        }
    }

    if profiles.is_empty() {
        return ParseOutcome::Error(ParseErrorKind::UnsupportedManifest("no variant streams found".to_string()), "<eof>".to_string());
    }

    let playlist = MasterPlaylist { profiles, variants };
    if warnings.is_empty() {
        ParseOutcome::Ok(playlist)
    } else {
        ParseOutcome::Warning(playlist, warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "\
#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=1500000,RESOLUTION=640x360,CODECS=\"avc1.4d401e\",AUDIO=\"aud\"
low.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=6000000,RESOLUTION=1920x1080,AUDIO=\"aud\"
high.m3u8
#EXT-X-I-FRAME-STREAM-INF:BANDWIDTH=300000,URI=\"iframe.m3u8\"
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aud\",NAME=\"English\",LANGUAGE=\"en\",DEFAULT=YES,URI=\"audio-en.m3u8\"
";

    #[test]
    fn parses_profiles_and_variants() {
        let playlist = parse_master_playlist(MASTER).into_result().expect("clean parse");
        assert_eq!(playlist.profiles.len(), 3);
        assert!(playlist.profiles.iter().any(|p| p.is_iframe_track));
        assert_eq!(playlist.variants.len(), 1);
        assert_eq!(playlist.variants[0].language_tag.as_deref(), Some("en"));
        assert!(playlist.variants[0].default);
    }

    #[test]
    fn empty_master_is_an_error() {
        assert!(parse_master_playlist("").is_fatal());
    }

    #[test]
    fn master_with_no_variants_is_an_error() {
        assert!(parse_master_playlist("#EXTM3U\n#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"a\",NAME=\"n\"\n").is_fatal());
    }
}
