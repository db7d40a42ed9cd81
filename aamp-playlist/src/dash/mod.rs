//! DASH MPD parsing (supplemental: the distilled HLS-first design only
//! details the HLS `PlaylistIndex` variant in depth, but §1/§9 name DASH
//! as a sibling protocol family `StreamAbstraction` must also support).
//! Grounded on the serde-over-quick-xml struct shapes used by
//! `dash-mpd-rs`, trimmed to the subset this core actually consumes:
//! static (VOD) manifests with `SegmentTemplate`-based addressing.

use crate::error::{ParseErrorKind, ParseOutcome, ParseWarning};
use aamp_types::{IndexNode, PlaylistSnapshot, PlaylistType, Profile};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Deserialize)]
pub struct SegmentTimelineEntry {
    #[serde(rename = "@t")]
    pub t: Option<u64>,
    #[serde(rename = "@d")]
    pub d: u64,
    #[serde(rename = "@r")]
    pub r: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SegmentTimeline {
    #[serde(rename = "S", default)]
    pub entries: Vec<SegmentTimelineEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SegmentTemplate {
    #[serde(rename = "@media")]
    pub media: Option<String>,
    #[serde(rename = "@initialization")]
    pub initialization: Option<String>,
    #[serde(rename = "@duration")]
    pub duration: Option<u64>,
    #[serde(rename = "@timescale")]
    pub timescale: Option<u64>,
    #[serde(rename = "@startNumber")]
    pub start_number: Option<u64>,
    #[serde(rename = "SegmentTimeline")]
    pub segment_timeline: Option<SegmentTimeline>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Representation {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@bandwidth")]
    pub bandwidth: i64,
    #[serde(rename = "@width")]
    pub width: Option<u32>,
    #[serde(rename = "@height")]
    pub height: Option<u32>,
    #[serde(rename = "@codecs")]
    pub codecs: Option<String>,
    #[serde(rename = "SegmentTemplate")]
    pub segment_template: Option<SegmentTemplate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdaptationSet {
    #[serde(rename = "@contentType")]
    pub content_type: Option<String>,
    #[serde(rename = "@mimeType")]
    pub mime_type: Option<String>,
    #[serde(rename = "@lang")]
    pub lang: Option<String>,
    #[serde(rename = "SegmentTemplate")]
    pub segment_template: Option<SegmentTemplate>,
    #[serde(rename = "Representation", default)]
    pub representations: Vec<Representation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Period {
    #[serde(rename = "@id")]
    pub id: Option<String>,
    #[serde(rename = "@start")]
    pub start: Option<String>,
    #[serde(rename = "@duration")]
    pub duration: Option<String>,
    #[serde(rename = "AdaptationSet", default)]
    pub adaptation_sets: Vec<AdaptationSet>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename = "MPD")]
pub struct Mpd {
    #[serde(rename = "@type")]
    pub mpd_type: Option<String>,
    #[serde(rename = "@mediaPresentationDuration")]
    pub media_presentation_duration: Option<String>,
    #[serde(rename = "@minimumUpdatePeriod")]
    pub minimum_update_period: Option<String>,
    #[serde(rename = "Period", default)]
    pub periods: Vec<Period>,
}

/// Parses an `ISO 8601` duration of the limited form DASH manifests use
/// (`PT#H#M#S`, any component optional) into seconds.
#[must_use]
pub fn parse_iso8601_duration_secs(raw: &str) -> Option<f64> {
    let rest = raw.strip_prefix("PT")?;
    let mut seconds = 0.0;
    let mut number = String::new();
    for ch in rest.chars() {
        match ch {
            '0'..='9' | '.' => number.push(ch),
            'H' => {
                seconds += number.parse::<f64>().ok()? * 3600.0;
                number.clear();
            }
            'M' => {
                seconds += number.parse::<f64>().ok()? * 60.0;
                number.clear();
            }
            'S' => {
                seconds += number.parse::<f64>().ok()?;
                number.clear();
            }
            _ => return None,
        }
    }
    Some(seconds)
}

/// Parses MPD XML text into the typed document tree.
#[must_use]
pub fn parse_mpd(xml: &str) -> ParseOutcome<Mpd> {
    if xml.trim().is_empty() {
        return ParseOutcome::Error(ParseErrorKind::EmptyInput, "<start>".to_string());
    }
    match quick_xml::de::from_str::<Mpd>(xml) {
        Ok(mpd) if mpd.periods.is_empty() => {
            ParseOutcome::Error(ParseErrorKind::MalformedMpd("no Period elements".to_string()), "<root>".to_string())
        }
        Ok(mpd) => ParseOutcome::Ok(mpd),
        Err(err) => ParseOutcome::Error(ParseErrorKind::MalformedMpd(err.to_string()), "<root>".to_string()),
    }
}

/// Flattens every `Representation` in every video/audio `AdaptationSet`
/// across all periods into the profile table `StreamAbstraction` selects
/// from, mirroring the HLS-side `parse_master_playlist` output shape.
#[must_use]
pub fn profiles_from_mpd(mpd: &Mpd) -> Vec<Profile> {
    mpd.periods
        .iter()
        .flat_map(|period| &period.adaptation_sets)
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

/// Builds a `PlaylistSnapshot` for one representation's `SegmentTemplate`,
/// expanding `$Number$`/`$Time$`/`$RepresentationID$`/`$Bandwidth$`
/// identifiers the way a `SegmentTemplate`-addressed DASH segment stream
/// is resolved into concrete fragment URIs.
#[must_use]
pub fn index_representation(
    mpd: &Mpd,
    period_index: usize,
    representation_id: &str,
) -> ParseOutcome<PlaylistSnapshot> {
    let Some(period) = mpd.periods.get(period_index) else {
        return ParseOutcome::Error(ParseErrorKind::MalformedMpd("period index out of range".to_string()), "<period>".to_string());
    };

    let mut found = None;
    for set in &period.adaptation_sets {
        for representation in &set.representations {
            if representation.id == representation_id {
                let template = representation
                    .segment_template
                    .clone()
                    .or_else(|| set.segment_template.clone());
                found = Some((representation, template));
            }
        }
    }
    let Some((representation, template)) = found else {
        return ParseOutcome::Error(
            ParseErrorKind::MalformedMpd(format!("representation {representation_id} not found")),
            "<representation>".to_string(),
        );
    };
    let Some(template) = template else {
        return ParseOutcome::Error(
            ParseErrorKind::MalformedMpd("representation has no SegmentTemplate".to_string()),
            "<segment-template>".to_string(),
        );
    };
    let Some(media) = template.media.as_ref() else {
        return ParseOutcome::Error(
            ParseErrorKind::MalformedMpd("SegmentTemplate missing @media".to_string()),
            "<segment-template>".to_string(),
        );
    };

    let timescale = template.timescale.unwrap_or(1).max(1);
    let start_number = template.start_number.unwrap_or(1);
    let mut warnings = Vec::new();
    let mut index_nodes = Vec::new();
    let period_start_positions = BTreeMap::new();
    let mut total_duration_sec = 0.0_f64;

    let mut push_node = |number: u64, duration_units: u64| {
        let duration_sec = duration_units as f64 / timescale as f64;
        let uri = expand_template(media, representation, number);
        index_nodes.push(IndexNode {
            completion_time_from_start_sec: total_duration_sec + duration_sec,
            duration_sec,
            uri,
            byte_range: None,
            drm_context_index: None,
            discontinuity: false,
            program_date_time: None,
        });
        total_duration_sec += duration_sec;
    };

    if let Some(timeline) = &template.segment_timeline {
        let mut number = start_number;
        for entry in &timeline.entries {
            let repeats = entry.r.unwrap_or(0).max(0) as u64 + 1;
            for _ in 0..repeats {
                push_node(number, entry.d);
                number += 1;
            }
        }
    } else if let Some(fixed_duration) = template.duration {
        let total_secs = mpd
            .media_presentation_duration
            .as_deref()
            .and_then(parse_iso8601_duration_secs)
            .unwrap_or(0.0);
        if total_secs <= 0.0 {
            warnings.push(ParseWarning {
                message: "no @duration-based count: mediaPresentationDuration missing".to_string(),
                location: "<mpd>".to_string(),
            });
        }
        let fragment_duration_sec = fixed_duration as f64 / timescale as f64;
        let fragment_count = if fragment_duration_sec > 0.0 {
            (total_secs / fragment_duration_sec).ceil() as u64
        } else {
            0
        };
        for offset in 0..fragment_count {
            push_node(start_number + offset, fixed_duration);
        }
    } else {
        return ParseOutcome::Error(
            ParseErrorKind::MalformedMpd("SegmentTemplate has neither SegmentTimeline nor @duration".to_string()),
            "<segment-template>".to_string(),
        );
    }

    let is_dynamic = mpd.mpd_type.as_deref() == Some("dynamic");
    let snapshot = PlaylistSnapshot {
        index_nodes,
        drm_meta_table: Vec::new(),
        target_duration_sec: template.duration.unwrap_or(0) as f64 / timescale as f64,
        first_media_sequence_number: start_number as i64,
        period_start_positions,
        playlist_type: if is_dynamic { PlaylistType::Event } else { PlaylistType::Vod },
        has_end_list_tag: !is_dynamic,
        total_duration_sec,
        deferred_license: None,
        timed_metadata: Vec::new(),
        fog_bandwidth_hint_bps: None,
    };

    if warnings.is_empty() {
        ParseOutcome::Ok(snapshot)
    } else {
        ParseOutcome::Warning(snapshot, warnings)
    }
}

fn expand_template(media: &str, representation: &Representation, number: u64) -> String {
    media
        .replace("$RepresentationID$", &representation.id)
        .replace("$Bandwidth$", &representation.bandwidth.to_string())
        .replace("$Number$", &number.to_string())
        .replace("$Time$", &number.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MPD_WITH_TIMELINE: &str = r#"<?xml version="1.0"?>
<MPD type="static" mediaPresentationDuration="PT1M0S">
  <Period id="p0">
    <AdaptationSet contentType="video">
      <Representation id="v0" bandwidth="3000000" width="1280" height="720">
        <SegmentTemplate media="chunk-$RepresentationID$-$Number$.m4s" initialization="init-$RepresentationID$.m4s" startNumber="1" timescale="1000">
          <SegmentTimeline>
            <S t="0" d="6000" r="1"/>
            <S d="4000"/>
          </SegmentTimeline>
        </SegmentTemplate>
      </Representation>
    </AdaptationSet>
  </Period>
</MPD>
"#;

    #[test]
    fn parses_periods_and_representations() {
        let mpd = parse_mpd(MPD_WITH_TIMELINE).into_result().expect("clean parse");
        assert_eq!(mpd.periods.len(), 1);
        let profiles = profiles_from_mpd(&mpd);
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].bandwidth_bps, 3_000_000);
    }

    #[test]
    fn indexes_a_segment_timeline_with_repeat_counts() {
        let mpd = parse_mpd(MPD_WITH_TIMELINE).into_result().unwrap();
        let snapshot = index_representation(&mpd, 0, "v0").into_result().expect("clean index");
        assert_eq!(snapshot.index_nodes.len(), 3);
        assert_eq!(snapshot.index_nodes[0].uri, "chunk-v0-1.m4s");
        assert_eq!(snapshot.index_nodes[1].uri, "chunk-v0-2.m4s");
        assert!((snapshot.index_nodes[0].duration_sec - 6.0).abs() < 1e-9);
        assert!((snapshot.index_nodes[2].duration_sec - 4.0).abs() < 1e-9);
    }

    #[test]
    fn missing_period_elements_is_malformed() {
        assert!(parse_mpd("<MPD type=\"static\"></MPD>").is_fatal());
    }

    #[test]
    fn duration_parser_handles_hours_minutes_seconds() {
        assert_eq!(parse_iso8601_duration_secs("PT1H2M3S"), Some(3723.0));
        assert_eq!(parse_iso8601_duration_secs("PT30S"), Some(30.0));
        assert_eq!(parse_iso8601_duration_secs("bogus"), None);
    }
}
