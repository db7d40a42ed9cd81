//! Media-playlist indexing: the single line-oriented pass described for
//! `PlaylistIndex` that turns one track's downloaded manifest text into a
//! `PlaylistSnapshot`, grounded on the tag dispatch in
//! `original_source/fragmentcollector_hls.cpp`'s `IndexPlaylist`.

use super::{attribute_list, parse_iv_hex};
use crate::error::{ParseErrorKind, ParseOutcome, ParseWarning};
use aamp_types::{
    DeferredLicense, DrmMetadata, DrmMethod, IndexNode, PlaylistSnapshot, PlaylistType,
    TimedMetadataTag,
};
use base64::Engine;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn fog_bandwidth_hint_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[?&]bandwidth-(\d+)").unwrap())
}

fn extract_fog_bandwidth_hint(uri: &str) -> Option<i64> {
    fog_bandwidth_hint_regex()
        .captures(uri)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn parse_byte_range(rest: &str, prev_end: Option<u64>) -> Option<(u64, u64)> {
    let rest = rest.trim();
    let mut parts = rest.splitn(2, '@');
    let length: u64 = parts.next()?.trim().parse().ok()?;
    let offset = match parts.next() {
        Some(off) => off.trim().parse().ok()?,
        None => prev_end?,
    };
    Some((offset, length))
}

fn find_or_insert_drm_metadata(table: &mut Vec<DrmMetadata>, metadata: DrmMetadata) -> usize {
    if let Some(idx) = table.iter().position(|m| m.sha1_hash == metadata.sha1_hash) {
        idx
    } else {
        table.push(metadata);
        table.len() - 1
    }
}

/// Parses one media playlist's text into a `PlaylistSnapshot`.
///
/// `mac_address` is forwarded to the deferred-license delay computation
/// when a deferred-license tag is observed; passing `None` falls back to
/// a non-deterministic PRNG draw for that computation.
#[must_use]
pub fn index_media_playlist(text: &str, mac_address: Option<&str>) -> ParseOutcome<PlaylistSnapshot> {
    if text.trim().is_empty() {
        return ParseOutcome::Error(ParseErrorKind::EmptyInput, "<start>".to_string());
    }

    let mut warnings = Vec::new();
    let mut index_nodes = Vec::new();
    let mut drm_meta_table: Vec<DrmMetadata> = Vec::new();
    let mut period_start_positions = BTreeMap::new();
    let mut timed_metadata = Vec::new();

    let mut target_duration_sec = 0.0_f64;
    let mut first_media_sequence_number: Option<i64> = None;
    let mut playlist_type = PlaylistType::Undefined;
    let mut has_end_list_tag = false;
    let mut total_duration_sec = 0.0_f64;
    let mut fog_bandwidth_hint_bps = None;

    let mut pending_duration: Option<f64> = None;
    let mut pending_byte_range: Option<(u64, u64)> = None;
    let mut pending_discontinuity = false;
    let mut last_byte_range_end: Option<u64> = None;
    let mut current_drm_context_index: Option<usize> = None;
    let mut deferred_license: Option<DeferredLicense> = None;
    let mut pdt_anchor: Option<(DateTime<Utc>, f64)> = None;

    for (line_no, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("#EXTINF:") {
            let duration_str = rest.split(',').next().unwrap_or("0");
            match duration_str.trim().parse::<f64>() {
                Ok(duration) => pending_duration = Some(duration),
                Err(_) => warnings.push(ParseWarning {
                    message: format!("unparseable EXTINF duration {duration_str:?}"),
                    location: line_no.to_string(),
                }),
            }
        } else if let Some(rest) = line.strip_prefix("#EXT-X-BYTERANGE:") {
            match parse_byte_range(rest, last_byte_range_end) {
                Some(range) => {
                    last_byte_range_end = Some(range.0 + range.1);
                    pending_byte_range = Some(range);
                }
                None => warnings.push(ParseWarning {
                    message: format!("unparseable BYTERANGE {rest:?}"),
                    location: line_no.to_string(),
                }),
            }
        } else if let Some(rest) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
            if target_duration_sec == 0.0 {
                target_duration_sec = rest.trim().parse().unwrap_or(0.0);
            }
        } else if let Some(rest) = line.strip_prefix("#EXT-X-MEDIA-SEQUENCE:") {
            first_media_sequence_number = rest.trim().parse().ok();
        } else if let Some(rest) = line.strip_prefix("#EXT-X-KEY:") {
            let attrs = attribute_list(rest);
            match attrs.get("METHOD").map(String::as_str) {
                Some("NONE") => current_drm_context_index = None,
                method_tag => {
                    let method = match method_tag {
                        Some("SAMPLE-AES") => DrmMethod::SampleAes,
                        _ => DrmMethod::Aes128,
                    };
                    let key_uri = attrs.get("URI").cloned();
                    let iv = attrs.get("IV").and_then(|raw| parse_iv_hex(raw));
                    let identity = format!("{method:?}|{key_uri:?}|{iv:?}");
                    let sha1_hash = aamp_drm::sha1_hex(identity.as_bytes());
                    let idx = find_or_insert_drm_metadata(
                        &mut drm_meta_table,
                        DrmMetadata {
                            sha1_hash,
                            blob: Vec::new(),
                            method,
                            iv,
                            key_uri,
                        },
                    );
                    current_drm_context_index = Some(idx);
                }
            }
        } else if let Some(rest) = line.strip_prefix("#EXT-X-CONTENT-METADATA:") {
            match base64::engine::general_purpose::STANDARD.decode(rest.trim()) {
                Ok(blob) => {
                    let sha1_hash = aamp_drm::sha1_hex(&blob);
                    let idx = find_or_insert_drm_metadata(
                        &mut drm_meta_table,
                        DrmMetadata {
                            sha1_hash,
                            blob,
                            method: DrmMethod::SampleAes,
                            iv: None,
                            key_uri: None,
                        },
                    );
                    current_drm_context_index = Some(idx);
                }
                Err(err) => warnings.push(ParseWarning {
                    message: format!("EXT-X-CONTENT-METADATA was not valid base64: {err}"),
                    location: line_no.to_string(),
                }),
            }
        } else if line.starts_with("#EXT-X-DISCONTINUITY") {
            pending_discontinuity = true;
            if total_duration_sec > 0.0 {
                period_start_positions.insert(index_nodes.len(), total_duration_sec);
            }
        } else if let Some(rest) = line.strip_prefix("#EXT-X-PROGRAM-DATE-TIME:") {
            match DateTime::parse_from_rfc3339(rest.trim()) {
                Ok(dt) => pdt_anchor = Some((dt.with_timezone(&Utc), total_duration_sec)),
                Err(err) => warnings.push(ParseWarning {
                    message: format!("unparseable EXT-X-PROGRAM-DATE-TIME: {err}"),
                    location: line_no.to_string(),
                }),
            }
        } else if line.starts_with("#EXT-X-ENDLIST") {
            has_end_list_tag = true;
            if playlist_type == PlaylistType::Undefined {
                playlist_type = PlaylistType::Vod;
            }
        } else if let Some(rest) = line.strip_prefix("#EXT-X-PLAYLIST-TYPE:") {
            playlist_type = match rest.trim() {
                "VOD" => PlaylistType::Vod,
                "EVENT" => PlaylistType::Event,
                other => {
                    warnings.push(ParseWarning {
                        message: format!("unrecognized playlist type {other:?}"),
                        location: line_no.to_string(),
                    });
                    PlaylistType::Undefined
                }
            };
        } else if let Some(rest) = line.strip_prefix("#EXT-X-DEFERRED-LICENSE:") {
            let attrs = attribute_list(rest);
            let max_time_secs = attrs
                .get("MAXTIME")
                .and_then(|value| value.parse::<f64>().ok())
                .unwrap_or(0.0);
            if !index_nodes.is_empty() && drm_meta_table.len() > 1 {
                if let Some(newest) = drm_meta_table.last() {
                    let due_ms = aamp_drm::deferred::compute_deferred_due_ms(max_time_secs, mac_address);
                    deferred_license = Some(DeferredLicense {
                        sha1_hash: newest.sha1_hash.clone(),
                        due_ms,
                    });
                }
            }
        } else if let Some(rest) = line.strip_prefix("#EXT-X-APP-METADATA:") {
            if let Some((name, content)) = rest.split_once('=') {
                timed_metadata.push(TimedMetadataTag {
                    time_ms: (total_duration_sec * 1000.0) as i64,
                    name: name.trim().to_string(),
                    content: content.trim().to_string(),
                });
            } else {
                warnings.push(ParseWarning {
                    message: format!("unparseable EXT-X-APP-METADATA: {rest:?}"),
                    location: line_no.to_string(),
                });
            }
        } else if line.starts_with('#') {
            warnings.push(ParseWarning {
                message: format!("unrecognized tag: {line}"),
                location: line_no.to_string(),
            });
        } else {
            let duration = pending_duration.take().unwrap_or(0.0);
            let node_start_sec = total_duration_sec;
            if let Some(bps) = extract_fog_bandwidth_hint(line) {
                fog_bandwidth_hint_bps = Some(bps);
            }
            let program_date_time = pdt_anchor.map(|(anchor, anchor_at_sec)| {
                anchor + chrono::Duration::milliseconds(((node_start_sec - anchor_at_sec) * 1000.0) as i64)
            });
            index_nodes.push(IndexNode {
                completion_time_from_start_sec: node_start_sec + duration,
                duration_sec: duration,
                uri: line.to_string(),
                byte_range: pending_byte_range.take(),
                drm_context_index: current_drm_context_index,
                discontinuity: pending_discontinuity,
                program_date_time,
            });
            total_duration_sec += duration;
            pending_discontinuity = false;
        }
    }

    let Some(first_media_sequence_number) = first_media_sequence_number else {
        return ParseOutcome::Error(ParseErrorKind::MissingMediaSequence, "<eof>".to_string());
    };
    if target_duration_sec <= 0.0 {
        warnings.push(ParseWarning {
            message: "missing #EXT-X-TARGETDURATION".to_string(),
            location: "<eof>".to_string(),
        });
    }

    let snapshot = PlaylistSnapshot {
        index_nodes,
        drm_meta_table,
        target_duration_sec,
        first_media_sequence_number,
        period_start_positions,
        playlist_type,
        has_end_list_tag,
        total_duration_sec,
        deferred_license,
        timed_metadata,
        fog_bandwidth_hint_bps,
    };

    if warnings.is_empty() {
        ParseOutcome::Ok(snapshot)
    } else {
        ParseOutcome::Warning(snapshot, warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOD_PLAYLIST: &str = "\
#EXTM3U
#EXT-X-TARGETDURATION:6
#EXT-X-MEDIA-SEQUENCE:100
#EXT-X-PLAYLIST-TYPE:VOD
#EXTINF:6.000,
seg100.ts
#EXTINF:6.000,
seg101.ts
#EXT-X-ENDLIST
";

    #[test]
    fn indexes_a_simple_vod_playlist() {
        let outcome = index_media_playlist(VOD_PLAYLIST, None);
        let snapshot = outcome.into_result().expect("should parse cleanly");
        assert_eq!(snapshot.first_media_sequence_number, 100);
        assert_eq!(snapshot.index_nodes.len(), 2);
        assert_eq!(snapshot.index_nodes[0].uri, "seg100.ts");
        assert!(snapshot.has_end_list_tag);
        assert_eq!(snapshot.playlist_type, PlaylistType::Vod);
        assert!((snapshot.total_duration_sec - 12.0).abs() < 1e-9);
    }

    #[test]
    fn empty_text_is_a_fatal_error() {
        let outcome = index_media_playlist("", None);
        assert!(outcome.is_fatal());
    }

    #[test]
    fn missing_media_sequence_is_a_fatal_error() {
        let outcome = index_media_playlist("#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXTINF:6,\nseg.ts\n", None);
        assert!(outcome.is_fatal());
    }

    #[test]
    fn byte_range_without_offset_continues_from_previous_end() {
        let playlist = "\
#EXTM3U
#EXT-X-TARGETDURATION:6
#EXT-X-MEDIA-SEQUENCE:0
#EXTINF:6,
#EXT-X-BYTERANGE:1000@0
seg.ts
#EXTINF:6,
#EXT-X-BYTERANGE:500
seg.ts
";
        let snapshot = index_media_playlist(playlist, None).into_result().unwrap();
        assert_eq!(snapshot.index_nodes[1].byte_range, Some((1000, 500)));
    }

    #[test]
    fn encryption_key_tag_creates_a_shared_drm_context() {
        let playlist = "\
#EXTM3U
#EXT-X-TARGETDURATION:6
#EXT-X-MEDIA-SEQUENCE:0
#EXT-X-KEY:METHOD=AES-128,URI=\"https://example/key\",IV=0x000102030405060708090a0b0c0d0e0f
#EXTINF:6,
seg0.ts
#EXTINF:6,
seg1.ts
";
        let snapshot = index_media_playlist(playlist, None).into_result().unwrap();
        assert_eq!(snapshot.drm_meta_table.len(), 1);
        assert_eq!(snapshot.index_nodes[0].drm_context_index, Some(0));
        assert_eq!(snapshot.index_nodes[1].drm_context_index, Some(0));
    }

    #[test]
    fn discontinuity_records_a_period_start_position() {
        let playlist = "\
#EXTM3U
#EXT-X-TARGETDURATION:6
#EXT-X-MEDIA-SEQUENCE:0
#EXTINF:6,
seg0.ts
#EXT-X-DISCONTINUITY
#EXTINF:6,
seg1.ts
";
        let snapshot = index_media_playlist(playlist, None).into_result().unwrap();
        assert!(snapshot.index_nodes[1].discontinuity);
        assert_eq!(snapshot.period_start_positions.get(&1), Some(&6.0));
    }

    #[test]
    fn deferred_license_tag_is_only_recorded_with_two_or_more_drm_contexts() {
        let playlist = "\
#EXTM3U
#EXT-X-TARGETDURATION:6
#EXT-X-MEDIA-SEQUENCE:0
#EXT-X-KEY:METHOD=AES-128,URI=\"https://example/key-a\",IV=0x000102030405060708090a0b0c0d0e0f
#EXTINF:6,
seg0.ts
#EXT-X-KEY:METHOD=AES-128,URI=\"https://example/key-b\",IV=0x0f0e0d0c0b0a09080706050403020100
#EXT-X-DEFERRED-LICENSE:MAXTIME=60
#EXTINF:6,
seg1.ts
";
        let snapshot = index_media_playlist(playlist, None).into_result().unwrap();
        let deferred = snapshot.deferred_license.expect("deferred license expected");
        assert!(deferred.due_ms >= 5_000);
        assert!(deferred.due_ms <= 55_000);
    }

    #[test]
    fn fog_bandwidth_hint_is_surfaced_from_redirected_uri() {
        let playlist = "\
#EXTM3U
#EXT-X-TARGETDURATION:6
#EXT-X-MEDIA-SEQUENCE:0
#EXTINF:6,
seg0.ts?bandwidth-2500000=1
";
        let snapshot = index_media_playlist(playlist, None).into_result().unwrap();
        assert_eq!(snapshot.fog_bandwidth_hint_bps, Some(2_500_000));
    }
}
