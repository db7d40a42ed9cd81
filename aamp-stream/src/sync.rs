//! §4.7 step 4: lines up the audio track's start position with the
//! video track's rather than handing both the same raw `playTarget`.
//!
//! VOD assets carrying discontinuities are aligned period-by-period
//! (`period_start_positions`); live channels fall back to a
//! program-date-time delta, and failing that to the media-sequence-number
//! gap already used to bound live refreshes.

use aamp_types::{AampError, PlaylistSnapshot};
use tracing::warn;

/// Sequence-number discontinuity past this many segments between two
/// tracks' windows is a desync the core can't reconcile (§4.7 step 4/5).
pub const MAX_SEQ_NUMBER_LAG_COUNT: i64 = 50;

pub struct TrackSyncConfig {
    pub is_live: bool,
    pub fragment_duration_sec: f64,
}

/// Resolves the audio track's `playTarget` given the video track's, so a
/// VOD period boundary or a live program-date-time anchor lines the two
/// tracks up instead of each starting at the same raw offset.
pub fn sync_audio_play_target(
    video: &PlaylistSnapshot,
    audio: &PlaylistSnapshot,
    video_target_sec: f64,
    cfg: TrackSyncConfig,
) -> Result<f64, AampError> {
    if !cfg.is_live && (!video.period_start_positions.is_empty() || !audio.period_start_positions.is_empty()) {
        return Ok(sync_vod_periods(video, audio, video_target_sec));
    }
    sync_live_or_sequence(video, audio, video_target_sec, cfg.fragment_duration_sec)
}

fn period_boundaries(snapshot: &PlaylistSnapshot) -> Vec<f64> {
    let mut boundaries: Vec<f64> = std::iter::once(0.0).chain(snapshot.period_start_positions.values().copied()).collect();
    boundaries.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    boundaries.dedup_by(|a, b| (*a - *b).abs() < f64::EPSILON);
    boundaries
}

fn sync_vod_periods(video: &PlaylistSnapshot, audio: &PlaylistSnapshot, video_target_sec: f64) -> f64 {
    let video_periods = period_boundaries(video);
    let audio_periods = period_boundaries(audio);
    if video_periods.len() != audio_periods.len() {
        warn!(
            video_periods = video_periods.len(),
            audio_periods = audio_periods.len(),
            "video/audio period counts disagree; starting audio at the raw play target"
        );
        return video_target_sec;
    }

    let period_idx = video_periods.iter().rposition(|&boundary| boundary <= video_target_sec).unwrap_or(0);
    let offset_into_period = video_target_sec - video_periods[period_idx];
    let audio_period_start = audio_periods.get(period_idx).copied().unwrap_or(0.0);
    audio_period_start + offset_into_period
}

fn first_program_date_time(snapshot: &PlaylistSnapshot) -> Option<chrono::DateTime<chrono::Utc>> {
    snapshot.index_nodes.iter().find_map(|node| node.program_date_time)
}

fn sync_live_or_sequence(
    video: &PlaylistSnapshot,
    audio: &PlaylistSnapshot,
    video_target_sec: f64,
    fragment_duration_sec: f64,
) -> Result<f64, AampError> {
    if let (Some(video_anchor), Some(audio_anchor)) = (first_program_date_time(video), first_program_date_time(audio)) {
        let delta_sec = (audio_anchor - video_anchor).num_milliseconds() as f64 / 1000.0;
        if delta_sec.abs() >= 0.5 * fragment_duration_sec.max(0.0) {
            return Ok(video_target_sec + delta_sec);
        }
        return Ok(video_target_sec);
    }

    let lag = (video.first_media_sequence_number - audio.first_media_sequence_number).abs();
    if lag > MAX_SEQ_NUMBER_LAG_COUNT {
        return Err(AampError::SequenceNumberGap { gap: lag, max: MAX_SEQ_NUMBER_LAG_COUNT });
    }
    Ok(video_target_sec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aamp_types::IndexNode;
    use std::collections::BTreeMap;

    fn snapshot_with_periods(periods: BTreeMap<usize, f64>, first_seq: i64) -> PlaylistSnapshot {
        PlaylistSnapshot {
            period_start_positions: periods,
            first_media_sequence_number: first_seq,
            ..Default::default()
        }
    }

    /// §8 scenario 5: video's period 2 starts at 180s, audio's at
    /// 179.8s; a video play target of 182s (2s into period 2) must land
    /// audio at 179.8 + 2 = 181.8s.
    #[test]
    fn vod_period_alignment_matches_scenario_five() {
        let video = snapshot_with_periods(BTreeMap::from([(40, 180.0)]), 0);
        let audio = snapshot_with_periods(BTreeMap::from([(40, 179.8)]), 0);

        let audio_target = sync_audio_play_target(
            &video,
            &audio,
            182.0,
            TrackSyncConfig { is_live: false, fragment_duration_sec: 6.0 },
        )
        .unwrap();

        assert!((audio_target - 181.8).abs() < 1e-9, "got {audio_target}");
    }

    #[test]
    fn vod_target_before_any_discontinuity_stays_in_period_zero() {
        let video = snapshot_with_periods(BTreeMap::from([(40, 180.0)]), 0);
        let audio = snapshot_with_periods(BTreeMap::from([(40, 179.8)]), 0);

        let audio_target = sync_audio_play_target(
            &video,
            &audio,
            90.0,
            TrackSyncConfig { is_live: false, fragment_duration_sec: 6.0 },
        )
        .unwrap();

        assert!((audio_target - 90.0).abs() < 1e-9, "got {audio_target}");
    }

    #[test]
    fn mismatched_period_counts_fall_back_to_the_raw_target() {
        let video = snapshot_with_periods(BTreeMap::from([(40, 180.0), (80, 360.0)]), 0);
        let audio = snapshot_with_periods(BTreeMap::new(), 0);

        let audio_target = sync_audio_play_target(
            &video,
            &audio,
            200.0,
            TrackSyncConfig { is_live: false, fragment_duration_sec: 6.0 },
        )
        .unwrap();

        assert!((audio_target - 200.0).abs() < 1e-9);
    }

    fn node_with_pdt(pdt: chrono::DateTime<chrono::Utc>) -> IndexNode {
        IndexNode {
            completion_time_from_start_sec: 6.0,
            duration_sec: 6.0,
            uri: "seg.ts".to_string(),
            byte_range: None,
            drm_context_index: None,
            discontinuity: false,
            program_date_time: Some(pdt),
        }
    }

    #[test]
    fn live_pdt_delta_past_half_a_fragment_shifts_the_lagging_track() {
        let base = chrono::DateTime::parse_from_rfc3339("2026-07-31T00:00:00Z").unwrap().with_timezone(&chrono::Utc);
        let video = PlaylistSnapshot { index_nodes: vec![node_with_pdt(base)], ..Default::default() };
        let audio = PlaylistSnapshot {
            index_nodes: vec![node_with_pdt(base + chrono::Duration::milliseconds(4_000))],
            ..Default::default()
        };

        let audio_target = sync_audio_play_target(
            &video,
            &audio,
            30.0,
            TrackSyncConfig { is_live: true, fragment_duration_sec: 6.0 },
        )
        .unwrap();

        assert!((audio_target - 34.0).abs() < 1e-9, "got {audio_target}");
    }

    #[test]
    fn live_pdt_delta_under_half_a_fragment_is_ignored() {
        let base = chrono::DateTime::parse_from_rfc3339("2026-07-31T00:00:00Z").unwrap().with_timezone(&chrono::Utc);
        let video = PlaylistSnapshot { index_nodes: vec![node_with_pdt(base)], ..Default::default() };
        let audio = PlaylistSnapshot {
            index_nodes: vec![node_with_pdt(base + chrono::Duration::milliseconds(500))],
            ..Default::default()
        };

        let audio_target = sync_audio_play_target(
            &video,
            &audio,
            30.0,
            TrackSyncConfig { is_live: true, fragment_duration_sec: 6.0 },
        )
        .unwrap();

        assert!((audio_target - 30.0).abs() < 1e-9);
    }

    #[test]
    fn sequence_number_fallback_errors_past_the_lag_bound() {
        let video = snapshot_with_periods(BTreeMap::new(), 1_000);
        let audio = snapshot_with_periods(BTreeMap::new(), 0);

        let err = sync_audio_play_target(
            &video,
            &audio,
            30.0,
            TrackSyncConfig { is_live: true, fragment_duration_sec: 6.0 },
        )
        .unwrap_err();

        assert!(matches!(err, AampError::SequenceNumberGap { gap: 1_000, max: MAX_SEQ_NUMBER_LAG_COUNT }));
    }

    #[test]
    fn sequence_number_fallback_within_bound_keeps_raw_target() {
        let video = snapshot_with_periods(BTreeMap::new(), 10);
        let audio = snapshot_with_periods(BTreeMap::new(), 0);

        let audio_target = sync_audio_play_target(
            &video,
            &audio,
            30.0,
            TrackSyncConfig { is_live: true, fragment_duration_sec: 6.0 },
        )
        .unwrap();

        assert!((audio_target - 30.0).abs() < 1e-9);
    }
}
