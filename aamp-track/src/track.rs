//! §4.4 MediaTrack: one elementary stream's fetch loop (producer) and
//! inject loop (consumer), sharing a `FragmentBuffer`. Neither loop
//! reaches back to the owning `StreamAbstraction`/`PlayerCore` through a
//! pointer; everything they need crosses through `TrackCapabilities`,
//! the §9 redesign's small-surface capability handles.

use crate::pacer::TrackPacer;
use aamp_config::{BufferingConfig, LiveConfig};
use aamp_drm::{BucketType, DrmRegistry};
use aamp_net::{DownloadError, Downloader, FileKind};
use aamp_types::{
    AampEvent, DownloadsGate, DrmMetadata, EventListener, Fragment, IndexNode, MediaType,
    PlaylistSnapshot, StreamSink, TuneFailureCode,
};
use parking_lot::Mutex as SyncMutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

const MAX_SEG_DOWNLOAD_FAIL_COUNT: u32 = 10;
const MAX_DECRYPT_FAIL_COUNT: u32 = 10;
const MAX_INJECT_DISCARD_COUNT: u32 = 10;
const DECRYPT_TIMEOUT_MS: u64 = 3_000;
const LIVE_EDGE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Narrow capability a fetch loop uses to ask the owning coordinator to
/// lower this track's profile, rather than mutating shared ABR state
/// itself (§9). The track stops fetching once it calls this; the
/// coordinator is expected to tear it down and start a replacement at
/// the new profile.
pub trait RampDownRequester: Send + Sync {
    fn request_ramp_down(&self);
}

/// How the fetch loop advances `play_target_sec` between selections.
/// `SequentialByDuration` (audio/video) follows the index's own
/// durations; `Stepped` (an I-frame track driven during trickplay)
/// jumps by `rate / fps` each time, matching a frame-stepped scrub.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdvanceMode {
    SequentialByDuration,
    Stepped { rate: f32, fps: u32 },
}

pub struct TrackCapabilities {
    pub downloader: Arc<Downloader>,
    pub drm_downloader: Arc<Downloader>,
    pub drm_registry: Arc<DrmRegistry>,
    pub downloads_gate: DownloadsGate,
    pub inject_gate: DownloadsGate,
    pub event_sink: Arc<dyn EventListener>,
    pub sink: Arc<dyn StreamSink>,
    pub ramp_down: Option<Arc<dyn RampDownRequester>>,
    pub pacer: TrackPacer,
}

fn file_kind_for(media_type: MediaType) -> FileKind {
    match media_type {
        MediaType::Video | MediaType::IFrame => FileKind::VideoFragment,
        MediaType::Audio => FileKind::AudioFragment,
        MediaType::Subtitle => FileKind::SubtitleFragment,
    }
}

fn bucket_for(media_type: MediaType) -> BucketType {
    match media_type {
        MediaType::Audio => BucketType::Audio,
        _ => BucketType::Video,
    }
}

/// One elementary stream. Constructed per tune/profile-switch by the
/// owning coordinator; `run_fetch_loop`, `run_inject_loop` and
/// `run_buffer_health_monitor` are independent tasks sharing `self` by
/// `Arc`.
pub struct MediaTrack {
    media_type: MediaType,
    profile_index: usize,
    buffer: aamp_buffer::FragmentBuffer,
    snapshot: Arc<RwLock<PlaylistSnapshot>>,
    capabilities: TrackCapabilities,
    advance: SyncMutex<AdvanceMode>,
    buffering: BufferingConfig,
    live: LiveConfig,
    enable_subscribed_tags: bool,
    emitted_timed_metadata: SyncMutex<usize>,
}

impl MediaTrack {
    #[must_use]
    pub fn new(
        media_type: MediaType,
        profile_index: usize,
        snapshot: PlaylistSnapshot,
        capabilities: TrackCapabilities,
        buffering: BufferingConfig,
        live: LiveConfig,
        enable_subscribed_tags: bool,
    ) -> Self {
        Self {
            media_type,
            profile_index,
            buffer: aamp_buffer::FragmentBuffer::new(buffering.fragment_cache_length),
            snapshot: Arc::new(RwLock::new(snapshot)),
            capabilities,
            advance: SyncMutex::new(AdvanceMode::SequentialByDuration),
            buffering,
            live,
            enable_subscribed_tags,
            emitted_timed_metadata: SyncMutex::new(0),
        }
    }

    /// §4.3 "subscribed application tags": emits a `TIMED_METADATA` event
    /// for every tag past the last one already emitted, so repeated calls
    /// across playlist refreshes only report newly-appended tags. A no-op
    /// when `enableSubscribedTags` is off.
    pub async fn emit_new_timed_metadata(&self) {
        if !self.enable_subscribed_tags {
            return;
        }
        let tags = self.snapshot.read().await.timed_metadata.clone();
        let mut emitted = self.emitted_timed_metadata.lock();
        for tag in tags.iter().skip(*emitted) {
            self.capabilities.event_sink.on_event(AampEvent::TimedMetadata {
                time_ms: tag.time_ms,
                name: tag.name.clone(),
                content: tag.content.clone(),
            });
        }
        *emitted = tags.len();
    }

    #[must_use]
    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    #[must_use]
    pub fn buffer(&self) -> &aamp_buffer::FragmentBuffer {
        &self.buffer
    }

    /// Swaps in a freshly-parsed snapshot, called by the manifest
    /// refresh loop (§4.7). The fetch loop picks it up on its next
    /// iteration; readers never block on the refresh itself.
    pub async fn apply_snapshot(&self, snapshot: PlaylistSnapshot) {
        *self.snapshot.write().await = snapshot;
        self.emit_new_timed_metadata().await;
    }

    /// The `first_media_sequence_number` of the snapshot currently being
    /// fetched from, used by the refresh loop to measure how far a new
    /// manifest has moved relative to what this track already has (§4.7
    /// step 5).
    pub async fn current_first_media_sequence_number(&self) -> i64 {
        self.snapshot.read().await.first_media_sequence_number
    }

    /// Whether the current snapshot carries an end-of-list marker
    /// (`EXT-X-ENDLIST` / a static MPD) — the signal `PlayerCore` uses
    /// to tell a VOD asset from a live one.
    pub async fn has_end_list(&self) -> bool {
        self.snapshot.read().await.has_end_list_tag
    }

    /// Whether the current snapshot references any DRM key context,
    /// used to populate `MEDIA_METADATA.hasDrm` (§6) without the
    /// coordinator reaching into track internals.
    pub async fn has_drm(&self) -> bool {
        !self.snapshot.read().await.drm_meta_table.is_empty()
    }

    /// A copy of the snapshot this track is currently fetching from, used
    /// by the coordinator to align a sibling track's start position
    /// against this one's period boundaries / program-date-time (§4.7
    /// step 4) without holding a lock across the call.
    pub async fn snapshot_clone(&self) -> PlaylistSnapshot {
        self.snapshot.read().await.clone()
    }

    pub fn set_advance_mode(&self, mode: AdvanceMode) {
        *self.advance.lock() = mode;
    }

    pub async fn abort(&self, immediate: bool) {
        self.buffer.abort(immediate).await;
    }

    fn find_next_node(snapshot: &PlaylistSnapshot, play_target_sec: f64) -> Option<(usize, IndexNode)> {
        snapshot
            .index_nodes
            .iter()
            .enumerate()
            .find(|(_, node)| node.completion_time_from_start_sec > play_target_sec)
            .map(|(idx, node)| (idx, node.clone()))
    }

    /// §4.4 producer side: reserves a slot, selects the next fragment per
    /// `AdvanceMode`, downloads and decrypts it, then publishes.
    /// Returns once the buffer is aborted or a VOD end-of-list is hit.
    pub async fn run_fetch_loop(&self, start_play_target_sec: f64) {
        let mut play_target_sec = start_play_target_sec.max(0.0);
        let mut consecutive_download_failures = 0u32;
        let mut consecutive_decrypt_failures = 0u32;

        loop {
            if !self.capabilities.downloads_gate.is_enabled() {
                debug!(media_type = ?self.media_type, "fetch loop stopping: downloads disabled");
                return;
            }

            let Some(write_slot) = self.buffer.reserve_write_slot().await else {
                return;
            };

            let snapshot = self.snapshot.read().await.clone();
            let Some((offset, node)) = Self::find_next_node(&snapshot, play_target_sec) else {
                drop(write_slot);
                if snapshot.has_end_list_tag {
                    self.buffer.abort(false).await;
                    return;
                }
                tokio::time::sleep(LIVE_EDGE_POLL_INTERVAL).await;
                continue;
            };

            let advance = *self.advance.lock();
            play_target_sec = match advance {
                AdvanceMode::SequentialByDuration => node.completion_time_from_start_sec,
                AdvanceMode::Stepped { rate, fps } => {
                    play_target_sec + f64::from(rate) / f64::from(fps.max(1))
                }
            };

            let outcome = self
                .capabilities
                .downloader
                .get(&node.uri, node.byte_range, file_kind_for(self.media_type))
                .await;

            if !outcome.ok {
                consecutive_download_failures += 1;
                warn!(
                    media_type = ?self.media_type,
                    uri = %node.uri,
                    status = ?outcome.http_status,
                    error = ?outcome.error,
                    consecutive_download_failures,
                    "fragment download failed"
                );

                let should_ramp_down = matches!(outcome.http_status, Some(404) | Some(500) | Some(503))
                    && !self.live.tsb_enabled;
                if should_ramp_down {
                    if let Some(ramp_down) = &self.capabilities.ramp_down {
                        ramp_down.request_ramp_down();
                    }
                    drop(write_slot);
                    self.buffer.abort(true).await;
                    return;
                }

                if outcome.error == Some(DownloadError::AbortedByGate) {
                    drop(write_slot);
                    return;
                }

                if consecutive_download_failures >= MAX_SEG_DOWNLOAD_FAIL_COUNT {
                    self.capabilities.event_sink.on_event(AampEvent::tune_failed(
                        TuneFailureCode::FragmentDownloadFailure,
                        format!("{consecutive_download_failures} consecutive fragment download failures"),
                    ));
                    drop(write_slot);
                    self.buffer.abort(true).await;
                    return;
                }
                drop(write_slot);
                continue;
            }
            consecutive_download_failures = 0;

            let mut payload = outcome.body;
            if let Some(drm_index) = node.drm_context_index {
                if let Some(meta) = snapshot.drm_meta_table.get(drm_index) {
                    match self.decrypt(meta, &mut payload).await {
                        Ok(()) => consecutive_decrypt_failures = 0,
                        Err(code) => {
                            consecutive_decrypt_failures += 1;
                            if consecutive_decrypt_failures >= MAX_DECRYPT_FAIL_COUNT {
                                self.capabilities.event_sink.on_event(AampEvent::tune_failed(
                                    code,
                                    format!(
                                        "{consecutive_decrypt_failures} consecutive fragment decrypt failures"
                                    ),
                                ));
                                drop(write_slot);
                                self.buffer.abort(true).await;
                                return;
                            }
                            drop(write_slot);
                            continue;
                        }
                    }
                }
            }

            let fragment = Fragment {
                payload,
                pts_sec: node.completion_time_from_start_sec - node.duration_sec,
                dts_sec: node.completion_time_from_start_sec - node.duration_sec,
                duration_sec: node.duration_sec,
                profile_index: self.profile_index,
                media_type: self.media_type,
                discontinuity: node.discontinuity,
                sequence_number: snapshot.sequence_number_at(offset),
                uri: node.uri,
            };
            write_slot.publish(fragment).await;
        }
    }

    async fn decrypt(&self, meta: &DrmMetadata, payload: &mut Vec<u8>) -> Result<(), TuneFailureCode> {
        let Some(key_uri) = meta.key_uri.clone() else {
            return Err(TuneFailureCode::FailedToGetKeyId);
        };
        let session = self.capabilities.drm_registry.get_or_create(&meta.sha1_hash);
        session
            .set_decrypt_info(
                aamp_drm::DrmInfo {
                    key_uri,
                    iv: meta.iv.unwrap_or([0u8; 16]),
                    sha1_hash: meta.sha1_hash.clone(),
                },
                self.capabilities.drm_downloader.clone(),
            )
            .await;

        match session
            .decrypt(bucket_for(self.media_type), payload, DECRYPT_TIMEOUT_MS)
            .await
        {
            aamp_drm::DrmReturn::Success => {
                if session.claim_metadata_emission() {
                    self.capabilities.event_sink.on_event(AampEvent::DrmMetadata {
                        access_status: 0,
                        access_status_value: 0,
                    });
                }
                Ok(())
            }
            aamp_drm::DrmReturn::KeyAcquisitionTimeout => Err(TuneFailureCode::LicenceTimeout),
            aamp_drm::DrmReturn::Error => Err(TuneFailureCode::DrmDecryptFailed),
        }
    }

    /// §4.4 consumer side: pulls a fragment, waits for the sink to be
    /// ready, passes through discontinuities and cross-track pacing,
    /// then hands the payload to the sink.
    pub async fn run_inject_loop(&self) {
        let mut consecutive_discards = 0u32;

        loop {
            let read_slot = match self.buffer.consume_read_slot().await {
                Ok(Some(slot)) => slot,
                Ok(None) => {
                    self.capabilities.sink.end_of_stream_reached(self.media_type);
                    self.capabilities.event_sink.on_event(AampEvent::Eos);
                    return;
                }
                Err(()) => return,
            };

            while !self.capabilities.inject_gate.is_enabled() {
                self.capabilities.inject_gate.changed().await;
            }

            let (media_type, duration_sec, discontinuity) = {
                let fragment = read_slot.fragment();
                (fragment.media_type, fragment.duration_sec, fragment.discontinuity)
            };

            if discontinuity {
                let keep_going = self.capabilities.sink.discontinuity(media_type).await;
                if !keep_going {
                    read_slot.release().await;
                    return;
                }
            }

            let injected_so_far = self.buffer.injected_duration_sec().await;
            self.capabilities
                .pacer
                .wait_if_ahead(media_type, injected_so_far, duration_sec)
                .await;

            let outcome = {
                let fragment = read_slot.fragment();
                self.capabilities
                    .sink
                    .send(fragment.media_type, &fragment.payload, fragment.pts_sec, fragment.dts_sec, fragment.duration_sec)
                    .await
            };

            read_slot.release().await;

            match outcome {
                aamp_types::SendOutcome::Accepted => {
                    consecutive_discards = 0;
                    if media_type != MediaType::Audio {
                        self.capabilities
                            .pacer
                            .record_injected(media_type, self.buffer.injected_duration_sec().await);
                    }
                }
                aamp_types::SendOutcome::Discarded => {
                    consecutive_discards += 1;
                    if consecutive_discards >= MAX_INJECT_DISCARD_COUNT {
                        self.capabilities.event_sink.on_event(AampEvent::tune_failed(
                            TuneFailureCode::UnsupportedStreamType,
                            format!("{consecutive_discards} consecutive fragments discarded by sink"),
                        ));
                    }
                }
            }
        }
    }

    /// §4.4 buffer health monitor: a fixed startup delay, then a
    /// periodic classification. Runs until its task is cancelled by the
    /// owning coordinator; never exits on its own.
    pub async fn run_buffer_health_monitor(&self) {
        tokio::time::sleep(Duration::from_secs(self.buffering.buffer_health_monitor_delay_secs)).await;
        let mut last = None;
        loop {
            let cached = self.buffer.cached_count().await;
            let buffered_ahead_sec =
                (self.buffer.fetched_duration_sec().await - self.buffer.injected_duration_sec().await).max(0.0);
            let health = crate::health::classify(cached, buffered_ahead_sec);
            if last != Some(health) {
                debug!(media_type = ?self.media_type, ?health, buffered_ahead_sec, "buffer health transition");
                last = Some(health);
            }
            tokio::time::sleep(Duration::from_secs(self.buffering.buffer_health_monitor_interval_secs)).await;
        }
    }
}
