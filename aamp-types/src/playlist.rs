use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Encryption method carried on an HLS `EXT-X-KEY` tag or DASH
/// `ContentProtection` descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrmMethod {
    None,
    Aes128,
    SampleAes,
}

/// One DRM key context referenced by one or more `IndexNode`s in a
/// playlist snapshot. A playlist may carry several of these (key
/// rotation); each `IndexNode` points at one by table index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrmMetadata {
    /// 40-byte hex SHA-1 digest of `blob`, used as the cross-track dedup
    /// key in the DRM session registry (§4.6).
    pub sha1_hash: String,
    pub blob: Vec<u8>,
    pub method: DrmMethod,
    pub iv: Option<[u8; 16]>,
    pub key_uri: Option<String>,
}

/// One scheduled fragment as produced by `PlaylistIndex` parsing (§4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexNode {
    pub completion_time_from_start_sec: f64,
    pub duration_sec: f64,
    pub uri: String,
    pub byte_range: Option<(u64, u64)>,
    pub drm_context_index: Option<usize>,
    pub discontinuity: bool,
    pub program_date_time: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaylistType {
    #[default]
    Undefined,
    Vod,
    Event,
}

/// The result of one `PlaylistIndex` parse pass: a fully rebuilt
/// snapshot of one track's manifest. The tuple
/// `(first_media_sequence_number, index_nodes)` identifies this snapshot
/// per §3.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaylistSnapshot {
    pub index_nodes: Vec<IndexNode>,
    pub drm_meta_table: Vec<DrmMetadata>,
    pub target_duration_sec: f64,
    pub first_media_sequence_number: i64,
    /// `indexOffset -> positionSec` recorded at each discontinuity
    /// boundary, used to align VOD period-based sync (§4.7 step 4).
    pub period_start_positions: BTreeMap<usize, f64>,
    pub playlist_type: PlaylistType,
    pub has_end_list_tag: bool,
    pub total_duration_sec: f64,
    /// Set when a deferred-license tag was observed and a sha1 was
    /// selected for delayed key acquisition (§4.6).
    pub deferred_license: Option<DeferredLicense>,
    pub timed_metadata: Vec<TimedMetadataTag>,
    /// Bandwidth observed on a FOG-rewritten fragment URI's `bandwidth-<n>`
    /// query parameter, surfaced to `AbrController` as a post-pass hint.
    pub fog_bandwidth_hint_bps: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredLicense {
    pub sha1_hash: String,
    pub due_ms: i64,
}

/// One subscribed-application tag observed while indexing, carried
/// through to the timed-metadata event once the track layer processes it
/// (§4.3, §6 `TIMED_METADATA`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedMetadataTag {
    pub time_ms: i64,
    pub name: String,
    pub content: String,
}

impl PlaylistSnapshot {
    /// Round-trip identity key per §8: two snapshots parsed from the same
    /// text are expected to agree on these four fields.
    #[must_use]
    pub fn identity(&self) -> (i64, f64, i64, usize) {
        (
            self.first_media_sequence_number,
            self.target_duration_sec,
            self.total_duration_sec.round() as i64,
            self.index_nodes.len(),
        )
    }

    /// Resolve the media sequence number of the node at `offset`.
    #[must_use]
    pub fn sequence_number_at(&self, offset: usize) -> i64 {
        self.first_media_sequence_number + offset as i64
    }

    /// Find the index of the node carrying `seq`, if it's still in the
    /// window described by this snapshot.
    #[must_use]
    pub fn find_by_sequence_number(&self, seq: i64) -> Option<usize> {
        let offset = seq - self.first_media_sequence_number;
        if offset < 0 || offset as usize >= self.index_nodes.len() {
            None
        } else {
            Some(offset as usize)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(uri: &str) -> IndexNode {
        IndexNode {
            completion_time_from_start_sec: 0.0,
            duration_sec: 6.0,
            uri: uri.to_string(),
            byte_range: None,
            drm_context_index: None,
            discontinuity: false,
            program_date_time: None,
        }
    }

    #[test]
    fn identity_matches_for_two_snapshots_built_the_same_way() {
        let a = PlaylistSnapshot {
            index_nodes: vec![node("a.ts"), node("b.ts")],
            first_media_sequence_number: 10,
            target_duration_sec: 6.0,
            total_duration_sec: 12.0,
            ..Default::default()
        };
        let b = a.clone();
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn find_by_sequence_number_respects_the_window() {
        let snapshot = PlaylistSnapshot {
            index_nodes: vec![node("a.ts"), node("b.ts"), node("c.ts")],
            first_media_sequence_number: 100,
            ..Default::default()
        };
        assert_eq!(snapshot.find_by_sequence_number(100), Some(0));
        assert_eq!(snapshot.find_by_sequence_number(102), Some(2));
        assert_eq!(snapshot.find_by_sequence_number(99), None);
        assert_eq!(snapshot.find_by_sequence_number(103), None);
    }

    #[test]
    fn sequence_number_at_offsets_from_the_first_sequence_number() {
        let snapshot = PlaylistSnapshot {
            first_media_sequence_number: 50,
            ..Default::default()
        };
        assert_eq!(snapshot.sequence_number_at(0), 50);
        assert_eq!(snapshot.sequence_number_at(5), 55);
    }
}
