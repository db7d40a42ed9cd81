//! §4.7 StreamAbstraction: bootstraps a tune from a manifest URL,
//! selects profiles via `AbrController`, builds one `MediaTrack` per
//! elementary stream and keeps them in sync with periodic manifest
//! refreshes.

use crate::format::{dash_default_audio_representation_id, dash_video_profiles, sniff_format, ManifestFormat};
use crate::ramp::RampDownHandle;
use crate::sync::{sync_audio_play_target, TrackSyncConfig, MAX_SEQ_NUMBER_LAG_COUNT};
use aamp_abr::{AbrController, BandwidthEstimator, RampState};
use aamp_config::Config;
use aamp_drm::DrmRegistry;
use aamp_net::{Downloader, FileKind};
use aamp_playlist::dash::Mpd;
use aamp_playlist::hls::{index_media_playlist, parse_master_playlist};
use aamp_playlist::{index_representation, parse_mpd};
use aamp_track::{AdvanceMode, MediaTrack, TrackCapabilities, TrackPacer};
use aamp_types::{
    AampError, AampEvent, AampResult, AudioFormat, DownloadsGate, EventListener, MediaType,
    PlaylistSnapshot, Profile, StreamSink, TuneFailureCode, Variant, VideoFormat,
};
use parking_lot::Mutex as SyncMutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const MIN_REFRESH_INTERVAL_MS: i64 = 2_000;

/// Speeds the `rw{4|8|16|32}`/`sf`/`play`/`ff{4|16|32}` CLI surface (§6)
/// can drive `SetRate` with, reported once per tune via `SPEEDS_CHANGED`.
const SUPPORTED_TRICK_SPEEDS: [f32; 10] = [-32.0, -16.0, -8.0, -4.0, 0.0, 0.5, 1.0, 4.0, 16.0, 32.0];

pub struct StreamCapabilities {
    pub downloader: Arc<Downloader>,
    pub drm_downloader: Arc<Downloader>,
    pub drm_registry: Arc<DrmRegistry>,
    pub downloads_gate: DownloadsGate,
    pub inject_gate: DownloadsGate,
    pub event_sink: Arc<dyn EventListener>,
    pub sink: Arc<dyn StreamSink>,
    pub bandwidth: Arc<BandwidthEstimator>,
    /// Shared with `Downloader`'s throughput sampling so
    /// `BandwidthEstimator::measured_bandwidth_bps`'s `now_ms` and each
    /// recorded sample's `timestamp_ms` are read off the same clock
    /// (§4.2, §4.5).
    pub epoch: Instant,
}

struct DashState {
    mpd: Mpd,
    period_index: usize,
    audio_representation_id: Option<String>,
}

/// One tuned asset: a resolved profile ladder, the live video/audio
/// tracks currently playing, and the background tasks keeping them fed.
pub struct StreamAbstraction {
    format: ManifestFormat,
    manifest_url: String,
    capabilities: StreamCapabilities,
    config: Config,
    abr: AbrController,
    profiles: Vec<Profile>,
    variants: Vec<Variant>,
    dash: RwLock<Option<DashState>>,
    ramp_state: SyncMutex<RampState>,
    active_profile_index: AtomicUsize,
    pacer: TrackPacer,
    video_track: RwLock<Option<Arc<MediaTrack>>>,
    audio_track: RwLock<Option<Arc<MediaTrack>>>,
    tasks: SyncMutex<Vec<JoinHandle<()>>>,
}

impl StreamAbstraction {
    /// Downloads and parses the top-level manifest, picks an initial
    /// profile and builds the video (and, where a rendition is
    /// available, audio) tracks, then spawns their fetch/inject/health
    /// tasks. Returns once the first fragment of each track has been
    /// scheduled to fetch, mirroring the original tune's "index then
    /// start pumping" ordering (§4.7 step 1-3).
    pub async fn tune(
        manifest_url: &str,
        capabilities: StreamCapabilities,
        config: Config,
        start_position_sec: f64,
    ) -> AampResult<Arc<Self>> {
        let manifest = capabilities.downloader.get(manifest_url, None, FileKind::Manifest).await;
        if !manifest.ok {
            capabilities.event_sink.on_event(AampEvent::tune_failed(
                TuneFailureCode::ManifestReqFailed,
                format!("manifest GET failed: status {:?}", manifest.http_status),
            ));
            return Err(AampError::ManifestDownload(format!("status {:?}", manifest.http_status)));
        }

        let format = sniff_format(&manifest.effective_url, &manifest.body);
        let text = String::from_utf8_lossy(&manifest.body).into_owned();

        let (profiles, variants, dash) = match format {
            ManifestFormat::Hls => {
                let master = parse_master_playlist(&text)
                    .into_result()
                    .map_err(|(kind, location)| AampError::PlaylistParse { line: 0, message: format!("{kind} at {location}") })?;
                (master.profiles, master.variants, None)
            }
            ManifestFormat::Dash => {
                let mpd = parse_mpd(&text)
                    .into_result()
                    .map_err(|(kind, location)| AampError::PlaylistParse { line: 0, message: format!("{kind} at {location}") })?;
                let profiles = dash_video_profiles(&mpd);
                let audio_representation_id = dash_default_audio_representation_id(&mpd);
                (profiles, Vec::new(), Some(DashState { mpd, period_index: 0, audio_representation_id }))
            }
        };

        if profiles.is_empty() {
            capabilities.event_sink.on_event(AampEvent::tune_failed(
                TuneFailureCode::ManifestReqFailed,
                "manifest carried no usable video profiles".to_string(),
            ));
            return Err(AampError::PlaylistParse { line: 0, message: "no profiles".to_string() });
        }

        let abr = AbrController::new(profiles.clone(), config.abr.clone());
        let initial_index = abr.initial_profile_index(false, false);

        let this = Arc::new(Self {
            format,
            manifest_url: manifest_url.to_string(),
            capabilities,
            config,
            abr,
            profiles,
            variants,
            dash: RwLock::new(dash),
            ramp_state: SyncMutex::new(RampState::default()),
            active_profile_index: AtomicUsize::new(initial_index),
            pacer: TrackPacer::new(),
            video_track: RwLock::new(None),
            audio_track: RwLock::new(None),
            tasks: SyncMutex::new(Vec::new()),
        });

        this.start_video_track(initial_index, start_position_sec).await?;
        this.start_audio_track(start_position_sec).await?;

        this.announce_media_metadata(initial_index).await;
        Ok(this)
    }

    /// §6 tune-time announcements: `Configure`s the sink with the
    /// elementary formats of the initial profile, then emits
    /// `MEDIA_METADATA` and `SPEEDS_CHANGED` describing the asset as a
    /// whole (§8 scenario 1 expects both before the first `PLAYING`
    /// state change).
    async fn announce_media_metadata(&self, initial_index: usize) {
        let profile = &self.profiles[initial_index];
        let video_format = VideoFormat::from_codecs(&profile.codecs);
        let audio_format = AudioFormat::from_codecs(&profile.codecs);
        self.capabilities.sink.configure(video_format, audio_format, false);

        let duration_ms = self.playback_extent_ms().await.map_or(0, |(_, duration_ms)| duration_ms);
        let languages: Vec<String> = self
            .variants
            .iter()
            .filter(|v| v.kind == aamp_types::VariantType::Audio)
            .filter_map(|v| v.language_tag.clone())
            .collect();
        let has_drm = self.any_track_has_drm().await;
        let (max_width, max_height) = self
            .profiles
            .iter()
            .map(|p| (p.width, p.height))
            .max_by_key(|&(w, h)| w * h)
            .unwrap_or((0, 0));

        self.capabilities.event_sink.on_event(AampEvent::MediaMetadata {
            duration_ms,
            languages,
            bitrates: self.profiles.iter().map(|p| p.bandwidth_bps).collect(),
            width: max_width,
            height: max_height,
            has_drm,
            supported_speeds: SUPPORTED_TRICK_SPEEDS.to_vec(),
        });
        self.capabilities.event_sink.on_event(AampEvent::SpeedsChanged {
            supported_speeds: SUPPORTED_TRICK_SPEEDS.to_vec(),
        });
    }

    async fn any_track_has_drm(&self) -> bool {
        if let Some(track) = self.video_track.read().await.as_ref() {
            if track.has_drm().await {
                return true;
            }
        }
        if let Some(track) = self.audio_track.read().await.as_ref() {
            if track.has_drm().await {
                return true;
            }
        }
        false
    }

    #[must_use]
    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    #[must_use]
    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    #[must_use]
    pub fn active_profile_index(&self) -> usize {
        self.active_profile_index.load(Ordering::Acquire)
    }

    async fn fetch_and_index(&self, uri: &str) -> AampResult<PlaylistSnapshot> {
        match self.format {
            ManifestFormat::Hls => {
                let outcome = self.capabilities.downloader.get(uri, None, FileKind::Playlist).await;
                if !outcome.ok {
                    return Err(AampError::ManifestDownload(format!("playlist GET failed: status {:?}", outcome.http_status)));
                }
                let text = String::from_utf8_lossy(&outcome.body).into_owned();
                index_media_playlist(&text, None)
                    .into_result()
                    .map_err(|(kind, location)| AampError::PlaylistParse { line: 0, message: format!("{kind} at {location}") })
            }
            ManifestFormat::Dash => {
                let dash = self.dash.read().await;
                let state = dash.as_ref().ok_or_else(|| AampError::PlaylistParse { line: 0, message: "no MPD loaded".to_string() })?;
                index_representation(&state.mpd, state.period_index, uri)
                    .into_result()
                    .map_err(|(kind, location)| AampError::PlaylistParse { line: 0, message: format!("{kind} at {location}") })
            }
        }
    }

    async fn start_video_track(self: &Arc<Self>, profile_index: usize, play_target_sec: f64) -> AampResult<()> {
        let uri = self.profiles[profile_index].uri.clone();
        let snapshot = self.fetch_and_index(&uri).await?;
        let track = Arc::new(self.build_track(MediaType::Video, profile_index, snapshot));
        track.emit_new_timed_metadata().await;
        self.spawn_track_tasks(&track, play_target_sec);
        *self.video_track.write().await = Some(track);
        Ok(())
    }

    async fn start_audio_track(self: &Arc<Self>, play_target_sec: f64) -> AampResult<()> {
        let uri = match self.format {
            ManifestFormat::Hls => self
                .variants
                .iter()
                .find(|variant| variant.kind == aamp_types::VariantType::Audio && variant.default)
                .or_else(|| self.variants.iter().find(|variant| variant.kind == aamp_types::VariantType::Audio))
                .and_then(|variant| variant.uri.clone()),
            ManifestFormat::Dash => self.dash.read().await.as_ref().and_then(|state| state.audio_representation_id.clone()),
        };
        let Some(uri) = uri else {
            debug!("no audio rendition found; continuing video-only");
            return Ok(());
        };

        let snapshot = self.fetch_and_index(&uri).await?;
        let synced_target_sec = match self.video_track.read().await.as_ref() {
            Some(video_track) => {
                let video_snapshot = video_track.snapshot_clone().await;
                let is_live = !video_snapshot.has_end_list_tag;
                let fragment_duration_sec = if video_snapshot.target_duration_sec > 0.0 {
                    video_snapshot.target_duration_sec
                } else {
                    snapshot.target_duration_sec
                };
                sync_audio_play_target(
                    &video_snapshot,
                    &snapshot,
                    play_target_sec,
                    TrackSyncConfig { is_live, fragment_duration_sec },
                )?
            }
            None => play_target_sec,
        };

        let track = Arc::new(self.build_track(MediaType::Audio, 0, snapshot));
        track.emit_new_timed_metadata().await;
        self.spawn_track_tasks(&track, synced_target_sec);
        *self.audio_track.write().await = Some(track);
        Ok(())
    }

    fn build_track(self: &Arc<Self>, media_type: MediaType, profile_index: usize, snapshot: PlaylistSnapshot) -> MediaTrack {
        let ramp_down: Option<Arc<dyn aamp_track::RampDownRequester>> = if media_type == MediaType::Video {
            Some(Arc::new(RampDownHandle(Arc::downgrade(self))))
        } else {
            None
        };
        let track_capabilities = TrackCapabilities {
            downloader: self.capabilities.downloader.clone(),
            drm_downloader: self.capabilities.drm_downloader.clone(),
            drm_registry: self.capabilities.drm_registry.clone(),
            downloads_gate: self.capabilities.downloads_gate.clone(),
            inject_gate: self.capabilities.inject_gate.clone(),
            event_sink: self.capabilities.event_sink.clone(),
            sink: self.capabilities.sink.clone(),
            ramp_down,
            pacer: self.pacer.clone(),
        };
        MediaTrack::new(
            media_type,
            profile_index,
            snapshot,
            track_capabilities,
            self.config.buffering.clone(),
            self.config.live.clone(),
            self.config.events.enable_subscribed_tags,
        )
    }

    fn spawn_track_tasks(&self, track: &Arc<MediaTrack>, play_target_sec: f64) {
        let fetch_track = track.clone();
        let fetch_handle = tokio::spawn(async move { fetch_track.run_fetch_loop(play_target_sec).await });

        let inject_track = track.clone();
        let inject_handle = tokio::spawn(async move { inject_track.run_inject_loop().await });

        let health_track = track.clone();
        let health_handle = tokio::spawn(async move { health_track.run_buffer_health_monitor().await });

        let mut tasks = self.tasks.lock();
        tasks.push(fetch_handle);
        tasks.push(inject_handle);
        tasks.push(health_handle);
    }

    /// §4.5/§9: executed off a `MediaTrack`'s `RampDownRequester` call.
    /// Tears down the current video track and replaces it with one built
    /// against the next-lower profile, continuing from wherever the
    /// outgoing track's buffer left off.
    pub async fn ramp_down(self: &Arc<Self>) {
        let cur_idx = self.active_profile_index();
        let next_idx = self.abr.ramped_down_profile_index(cur_idx);
        if next_idx == cur_idx {
            warn!("ramp down requested but already at the lowest video profile");
            return;
        }
        self.switch_video_profile(next_idx).await;
    }

    async fn switch_video_profile(self: &Arc<Self>, profile_index: usize) {
        let play_target_sec = {
            let guard = self.video_track.read().await;
            match guard.as_ref() {
                Some(track) => track.buffer().injected_duration_sec().await,
                None => 0.0,
            }
        };
        if let Some(old) = self.video_track.write().await.take() {
            old.abort(true).await;
        }
        self.active_profile_index.store(profile_index, Ordering::Release);
        if let Err(err) = self.start_video_track(profile_index, play_target_sec).await {
            warn!(?err, "failed to start replacement video track after profile switch");
        } else {
            let profile = &self.profiles[profile_index];
            self.capabilities.event_sink.on_event(AampEvent::BitrateChanged {
                time_ms: 0,
                bitrate_bps: profile.bandwidth_bps,
                description: "rampdown".to_string(),
                width: profile.width,
                height: profile.height,
            });
        }
    }

    /// §4.5: runs for the lifetime of the tune, reassessing bandwidth
    /// against the active profile on a fixed tick and promoting/demoting
    /// as `AbrController::ramp_up_or_down` decides.
    pub async fn run_abr_loop(self: &Arc<Self>) {
        if !self.config.abr.enabled {
            return;
        }
        loop {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let elapsed_since_start = self.capabilities.epoch.elapsed();
            let elapsed_since_start_sec = elapsed_since_start.as_secs_f64();
            let now_ms = elapsed_since_start.as_millis() as i64;
            let Some(measured_bps) = self.capabilities.bandwidth.measured_bandwidth_bps(now_ms) else {
                continue;
            };
            let cur_idx = self.active_profile_index();
            if self.abr.abr_suppressed(elapsed_since_start_sec, cur_idx, measured_bps) {
                continue;
            }
            let cur_bps = self.profiles.get(cur_idx).map_or(0, |p| p.bandwidth_bps);
            let next_idx = {
                let mut state = self.ramp_state.lock();
                self.abr.ramp_up_or_down(cur_idx, cur_bps, measured_bps, &mut state)
            };
            if next_idx != cur_idx {
                info!(cur_idx, next_idx, measured_bps, "ABR switching video profile");
                self.switch_video_profile(next_idx).await;
            }
        }
    }

    /// §4.7 step 5: periodically refetches the live video/audio
    /// playlists and swaps each track's snapshot, bailing into a
    /// `SequenceNumberGap` error when the window jumped further than
    /// the core can reconcile without a fresh tune.
    pub async fn run_refresh_loop(self: &Arc<Self>) {
        loop {
            let interval_ms = self.config.live.max_refresh_interval_ms.max(MIN_REFRESH_INTERVAL_MS);
            tokio::time::sleep(Duration::from_millis(interval_ms as u64)).await;

            if !self.is_live().await {
                debug!("asset carries an end-list; no more manifest refreshes are needed");
                return;
            }

            if let Some(track) = self.video_track.read().await.clone() {
                if let Err(err) = self.refresh_track(&track, self.profiles[self.active_profile_index()].uri.clone()).await {
                    warn!(?err, "live video playlist refresh failed");
                }
            }
            if let Some(track) = self.audio_track.read().await.clone() {
                let uri = match self.format {
                    ManifestFormat::Hls => self.variants.iter().find(|v| v.kind == aamp_types::VariantType::Audio).and_then(|v| v.uri.clone()),
                    ManifestFormat::Dash => self.dash.read().await.as_ref().and_then(|s| s.audio_representation_id.clone()),
                };
                if let Some(uri) = uri {
                    if let Err(err) = self.refresh_track(&track, uri).await {
                        warn!(?err, "live audio playlist refresh failed");
                    }
                }
            }
        }
    }

    async fn refresh_track(&self, track: &Arc<MediaTrack>, uri: String) -> AampResult<()> {
        let fresh = self.fetch_and_index(&uri).await?;
        let lag = {
            let current = track.current_first_media_sequence_number().await;
            (fresh.first_media_sequence_number - current).abs()
        };
        if lag > MAX_SEQ_NUMBER_LAG_COUNT {
            return Err(AampError::SequenceNumberGap { gap: lag, max: MAX_SEQ_NUMBER_LAG_COUNT });
        }
        track.apply_snapshot(fresh).await;
        Ok(())
    }

    /// §4.7 step 6 seek-range check: rejects a target outside
    /// `[0, total_duration]` for VOD. For a live channel without an
    /// endlist, a target past the live edge re-live-adjusts to
    /// `total - live_offset` and reports `ENTERING_LIVE` instead of
    /// failing, rather than erroring the way a VOD out-of-range seek does.
    pub async fn validate_seek(&self, position_sec: f64) -> AampResult<f64> {
        let guard = self.video_track.read().await;
        let Some(track) = guard.as_ref() else {
            return Err(AampError::SeekRangeError);
        };
        let total = track.buffer().fetched_duration_sec().await.max(track.buffer().injected_duration_sec().await);
        if position_sec < 0.0 {
            return Err(AampError::SeekRangeError);
        }
        if track.has_end_list().await {
            if total > 0.0 && position_sec > total {
                return Err(AampError::SeekRangeError);
            }
            return Ok(position_sec);
        }

        let live_edge = (total - self.config.live.live_offset_secs).max(0.0);
        if total > 0.0 && position_sec > live_edge {
            self.capabilities.event_sink.on_event(AampEvent::EnteringLive);
            return Ok(live_edge);
        }
        Ok(position_sec)
    }

    /// Position and known total duration of the active video track, in
    /// milliseconds. `None` before any video track has been started.
    pub async fn playback_extent_ms(&self) -> Option<(i64, i64)> {
        let guard = self.video_track.read().await;
        let track = guard.as_ref()?;
        let position_sec = track.buffer().injected_duration_sec().await;
        let duration_sec = track.buffer().fetched_duration_sec().await.max(position_sec);
        Some(((position_sec * 1000.0) as i64, (duration_sec * 1000.0) as i64))
    }

    /// Approximates "is this a live channel" from the absence of an
    /// `EXT-X-ENDLIST`/MPD-static marker on the active video track,
    /// rather than tracking a separate live/VOD flag end to end.
    pub async fn is_live(&self) -> bool {
        match self.video_track.read().await.as_ref() {
            Some(track) => !track.has_end_list().await,
            None => false,
        }
    }

    pub fn set_trickplay_rate(&self, rate: f32, fps: u32) {
        let mode = if (rate - 1.0).abs() < f32::EPSILON {
            AdvanceMode::SequentialByDuration
        } else {
            AdvanceMode::Stepped { rate, fps }
        };
        // Trickplay drives the video track's own index directly; a
        // dedicated I-frame track is a capability enhancement left for
        // a future profile ladder that advertises one (§4.4 Open Question).
        if let Ok(guard) = self.video_track.try_read() {
            if let Some(track) = guard.as_ref() {
                track.set_advance_mode(mode);
            }
        }
    }

    /// Tears down every running task and disables further downloads.
    /// `PlayerCore::stop` calls this before releasing the sink.
    pub async fn stop(&self) {
        self.capabilities.downloads_gate.disable();
        self.capabilities.inject_gate.disable();
        if let Some(track) = self.video_track.write().await.take() {
            track.abort(true).await;
        }
        if let Some(track) = self.audio_track.write().await.take() {
            track.abort(true).await;
        }
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aamp_types::Fragment;

    fn test_capabilities() -> StreamCapabilities {
        let gate = DownloadsGate::new();
        let epoch = Instant::now();
        StreamCapabilities {
            downloader: Arc::new(Downloader::new(aamp_config::NetworkConfig::default(), Vec::new(), gate.clone(), None, epoch)),
            drm_downloader: Arc::new(Downloader::new(aamp_config::NetworkConfig::default(), Vec::new(), gate.clone(), None, epoch)),
            drm_registry: Arc::new(DrmRegistry::new()),
            downloads_gate: gate.clone(),
            inject_gate: gate,
            event_sink: Arc::new(aamp_sink_null::CapturingEventListener::new()),
            sink: Arc::new(aamp_sink_null::NullSink::new()),
            bandwidth: Arc::new(BandwidthEstimator::new(&Config::default().abr)),
            epoch,
        }
    }

    /// Builds a `StreamAbstraction` with a video track already carrying
    /// `total_duration_sec` worth of published fragments, bypassing
    /// `tune`'s manifest download so `validate_seek`/`is_live` can be
    /// exercised without network access.
    async fn stream_with_video_track(has_end_list_tag: bool, total_duration_sec: f64) -> Arc<StreamAbstraction> {
        let config = Config::default();
        let capabilities = test_capabilities();
        let profiles = vec![Profile::new(1_000_000, 640, 360, "video.m3u8")];
        let abr = AbrController::new(profiles.clone(), config.abr.clone());

        let this = Arc::new(StreamAbstraction {
            format: ManifestFormat::Hls,
            manifest_url: "http://example/master.m3u8".to_string(),
            capabilities,
            config: config.clone(),
            abr,
            profiles,
            variants: Vec::new(),
            dash: RwLock::new(None),
            ramp_state: SyncMutex::new(RampState::default()),
            active_profile_index: AtomicUsize::new(0),
            pacer: TrackPacer::new(),
            video_track: RwLock::new(None),
            audio_track: RwLock::new(None),
            tasks: SyncMutex::new(Vec::new()),
        });

        let snapshot = PlaylistSnapshot { has_end_list_tag, ..PlaylistSnapshot::default() };
        let track = Arc::new(this.build_track(MediaType::Video, 0, snapshot));
        if total_duration_sec > 0.0 {
            let slot = track.buffer().reserve_write_slot().await.expect("fresh buffer always has room");
            slot.publish(Fragment {
                payload: Vec::new(),
                pts_sec: 0.0,
                dts_sec: 0.0,
                duration_sec: total_duration_sec,
                profile_index: 0,
                media_type: MediaType::Video,
                discontinuity: false,
                sequence_number: 0,
                uri: "seg0.ts".to_string(),
            })
            .await;
        }
        *this.video_track.write().await = Some(track);
        this
    }

    #[tokio::test]
    async fn validate_seek_rejects_past_vod_duration() {
        let stream = stream_with_video_track(true, 100.0).await;
        let err = stream.validate_seek(150.0).await.unwrap_err();
        assert!(matches!(err, AampError::SeekRangeError));
    }

    #[tokio::test]
    async fn validate_seek_allows_in_range_vod_position() {
        let stream = stream_with_video_track(true, 100.0).await;
        let validated = stream.validate_seek(50.0).await.unwrap();
        assert!((validated - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn is_live_reflects_the_video_track_end_list_flag() {
        let live = stream_with_video_track(false, 0.0).await;
        assert!(live.is_live().await);
        let vod = stream_with_video_track(true, 0.0).await;
        assert!(!vod.is_live().await);
    }

    /// §4.7 step 5: a VOD asset has nothing left to refresh, so the loop
    /// must return on its first wakeup rather than polling forever.
    #[tokio::test(start_paused = true)]
    async fn refresh_loop_returns_immediately_for_a_vod_asset() {
        let stream = stream_with_video_track(true, 100.0).await;
        let result = tokio::time::timeout(Duration::from_secs(10), stream.run_refresh_loop()).await;
        assert!(result.is_ok(), "refresh loop should have returned instead of looping forever on a VOD asset");
    }
}
