//! §4.8 PlayerCore: the host-facing state machine that owns one
//! `StreamAbstraction` at a time, drives tune/retune/seek/rate-change
//! through it, and reports progress back through the host's
//! `EventListener`.

use crate::rate::{self, TrickStep};
use crate::retune::RetuneScheduler;
use crate::url_rewrite::normalize_manifest_url;
use aamp_abr::BandwidthEstimator;
use aamp_config::Config;
use aamp_drm::DrmRegistry;
use aamp_net::Downloader;
use aamp_stream::{StreamAbstraction, StreamCapabilities};
use aamp_types::{AampError, AampEvent, AampResult, DownloadsGate, EventListener, PlayerState, StreamSink, ThroughputSink};
use parking_lot::Mutex as SyncMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TuneType {
    Tune,
    Retune,
    Seek,
}

#[derive(Debug, Clone, Copy)]
struct ProgressSnapshot {
    position_sec: f64,
    observed_at: Instant,
}

/// One tuned player instance. A host creates exactly one of these per
/// playback session and drives it through `tune`/`seek`/`set_rate`/
/// `stop`, observing state and progress through the supplied
/// `EventListener`.
pub struct PlayerCore {
    config: SyncMutex<Config>,
    event_sink: Arc<dyn EventListener>,
    sink: Arc<dyn StreamSink>,
    state: SyncMutex<PlayerState>,
    rate: SyncMutex<f32>,
    paused: AtomicBool,
    current_url: SyncMutex<Option<String>>,
    last_progress: SyncMutex<Option<ProgressSnapshot>>,
    retune: RetuneScheduler,
    stream: RwLock<Option<Arc<StreamAbstraction>>>,
    tasks: SyncMutex<Vec<JoinHandle<()>>>,
}

impl PlayerCore {
    #[must_use]
    pub fn new(config: Config, event_sink: Arc<dyn EventListener>, sink: Arc<dyn StreamSink>) -> Arc<Self> {
        Arc::new(Self {
            retune: RetuneScheduler::new(config.live.pts_error_threshold),
            config: SyncMutex::new(config),
            event_sink,
            sink,
            state: SyncMutex::new(PlayerState::Idle),
            rate: SyncMutex::new(1.0),
            paused: AtomicBool::new(false),
            current_url: SyncMutex::new(None),
            last_progress: SyncMutex::new(None),
            stream: RwLock::new(None),
            tasks: SyncMutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn state(&self) -> PlayerState {
        *self.state.lock()
    }

    #[must_use]
    pub fn rate(&self) -> f32 {
        *self.rate.lock()
    }

    fn set_state(&self, next: PlayerState) {
        let mut guard = self.state.lock();
        if !guard.can_transition_to(next) {
            debug!(from = ?*guard, to = ?next, "state transition not in the named table; applying anyway");
        }
        *guard = next;
        drop(guard);
        self.event_sink.on_event(AampEvent::StateChanged { state: next });
    }

    /// §4.8 Tune algorithm, steps 1-4 (step 5's ad-insertion window
    /// check is a host-layer concern outside this core).
    pub async fn tune(self: &Arc<Self>, url: &str) -> AampResult<()> {
        self.tune_internal(url, TuneType::Tune, 0.0).await
    }

    /// Re-enters the tune algorithm preserving the current play
    /// position, the way a `SetRate` trickplay change or a scheduled
    /// retune does (§4.8 "Retune", "Rate control").
    async fn tune_internal(self: &Arc<Self>, url: &str, tune_type: TuneType, start_position_sec: f64) -> AampResult<()> {
        self.teardown_previous(tune_type).await;

        if matches!(tune_type, TuneType::Tune) {
            self.set_state(PlayerState::Initializing);
        }

        let config = self.config.lock().clone();
        let normalized = normalize_manifest_url(url, &config.rewrite, config.network.force_http);

        self.set_state(PlayerState::Preparing);

        let downloads_gate = DownloadsGate::new();
        let inject_gate = DownloadsGate::new();
        let bandwidth = Arc::new(BandwidthEstimator::new(&config.abr));
        // One clock shared by every throughput sample this tune records
        // and by the ABR loop that reads them back, so `timestamp_ms` and
        // `now_ms` never drift apart (§4.2, §4.5).
        let epoch = Instant::now();
        let capabilities = StreamCapabilities {
            downloader: Arc::new(Downloader::new(
                config.network.clone(),
                Vec::new(),
                downloads_gate.clone(),
                Some(bandwidth.clone() as Arc<dyn ThroughputSink>),
                epoch,
            )),
            drm_downloader: Arc::new(Downloader::new(config.network.clone(), Vec::new(), downloads_gate.clone(), None, epoch)),
            drm_registry: Arc::new(DrmRegistry::new()),
            downloads_gate,
            inject_gate,
            event_sink: self.event_sink.clone(),
            sink: self.sink.clone(),
            bandwidth,
            epoch,
        };

        match StreamAbstraction::tune(&normalized, capabilities, config, start_position_sec).await {
            Ok(stream) => {
                let initial_profile = stream.profiles()[stream.active_profile_index()].clone();
                *self.current_url.lock() = Some(url.to_string());
                self.spawn_stream_tasks(&stream);
                *self.stream.write().await = Some(stream);
                self.set_state(PlayerState::Prepared);
                self.event_sink.on_event(AampEvent::PlaylistIndexed);
                self.set_state(PlayerState::Playing);
                self.event_sink.on_event(AampEvent::BitrateChanged {
                    time_ms: 0,
                    bitrate_bps: initial_profile.bandwidth_bps,
                    description: "initial".to_string(),
                    width: initial_profile.width,
                    height: initial_profile.height,
                });
                self.paused.store(false, Ordering::Release);
                self.event_sink.on_event(AampEvent::Tuned);
                Ok(())
            }
            Err(AampError::SeekRangeError) => {
                self.event_sink.on_event(AampEvent::Eos);
                self.set_state(PlayerState::Complete);
                Ok(())
            }
            Err(err) => {
                self.set_state(PlayerState::Error);
                Err(err)
            }
        }
    }

    /// §4.8 Teardown: waits out nothing here since discontinuity
    /// handling lives entirely inside `StreamAbstraction`'s own task
    /// set, destroys the previous `StreamAbstraction`, and — on a fresh
    /// `Tune` rather than a `Retune` — clears the PTS-error window so a
    /// burst against the old content doesn't count toward the new one.
    async fn teardown_previous(&self, tune_type: TuneType) {
        if let Some(stream) = self.stream.write().await.take() {
            stream.stop().await;
        }
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
        if !matches!(tune_type, TuneType::Retune) {
            self.retune.reset_pts_errors();
        }
        *self.last_progress.lock() = None;
    }

    fn spawn_stream_tasks(self: &Arc<Self>, stream: &Arc<StreamAbstraction>) {
        let abr_stream = stream.clone();
        let abr_handle = tokio::spawn(async move { abr_stream.run_abr_loop().await });

        let refresh_stream = stream.clone();
        let refresh_handle = tokio::spawn(async move { refresh_stream.run_refresh_loop().await });

        let progress_self = self.clone();
        let progress_handle = tokio::spawn(async move { progress_self.run_progress_loop().await });

        let mut tasks = self.tasks.lock();
        tasks.push(abr_handle);
        tasks.push(refresh_handle);
        tasks.push(progress_handle);
    }

    /// §4.8 Progress reporting: emits `{positionMs, durationMs, startMs,
    /// endMs, playbackRate}` on the configured cadence, clamped into
    /// `[startMs, endMs]`; a live channel without time-shift buffering
    /// reports `-1`/`-1` for the start/end bounds.
    async fn run_progress_loop(self: Arc<Self>) {
        loop {
            let interval_ms = { self.config.lock().events.report_progress_interval_ms.max(1) };
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;

            let Some(stream) = self.stream.read().await.clone() else {
                continue;
            };
            let Some((position_ms, duration_ms)) = stream.playback_extent_ms().await else {
                continue;
            };

            *self.last_progress.lock() = Some(ProgressSnapshot {
                position_sec: position_ms as f64 / 1000.0,
                observed_at: Instant::now(),
            });

            let tsb_enabled = { self.config.lock().live.tsb_enabled };
            let is_live = stream.is_live().await;
            let (start_ms, end_ms) = if is_live && !tsb_enabled { (-1, -1) } else { (0, duration_ms) };
            let clamped_position_ms = if end_ms >= 0 {
                position_ms.clamp(start_ms.max(0), end_ms)
            } else {
                position_ms.max(0)
            };

            self.event_sink.on_event(AampEvent::Progress {
                position_ms: clamped_position_ms,
                duration_ms,
                start_ms,
                end_ms,
                playback_rate: self.rate(),
            });
        }
    }

    /// Current playback position, preferring the last reported
    /// progress snapshot (cheap, already clamped) over asking the
    /// stream directly.
    async fn current_position_sec(&self) -> f64 {
        if let Some(last) = *self.last_progress.lock() {
            return last.position_sec;
        }
        match self.stream.read().await.as_ref() {
            Some(stream) => stream.playback_extent_ms().await.map_or(0.0, |(position_ms, _)| position_ms as f64 / 1000.0),
            None => 0.0,
        }
    }

    async fn trickplay_fps(&self) -> u32 {
        let (live_fps, vod_fps) = {
            let config = self.config.lock();
            (config.sink_hints.linear_trickplay_fps, config.sink_hints.vod_trickplay_fps)
        };
        let is_live = match self.stream.read().await.as_ref() {
            Some(stream) => stream.is_live().await,
            None => false,
        };
        if is_live {
            live_fps
        } else {
            vod_fps
        }
    }

    async fn apply_trickplay_rate(&self, rate: f32) {
        let fps = self.trickplay_fps().await;
        if let Some(stream) = self.stream.read().await.as_ref() {
            stream.set_trickplay_rate(rate, fps);
        }
    }

    /// §3 seek-range check plus a re-tune at the validated position. A
    /// VOD seek past the end of the asset is EOS, not a failure, the
    /// same way `tune_internal` treats it at tune time.
    pub async fn seek(self: &Arc<Self>, position_sec: f64) -> AampResult<()> {
        let stream = self.stream.read().await.clone().ok_or(AampError::SeekRangeError)?;
        let validated = match stream.validate_seek(position_sec).await {
            Ok(validated) => validated,
            Err(AampError::SeekRangeError) => {
                self.event_sink.on_event(AampEvent::Eos);
                self.set_state(PlayerState::Complete);
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        let url = self.current_url.lock().clone().ok_or(AampError::SeekRangeError)?;
        self.set_state(PlayerState::Seeking);
        self.tune_internal(&url, TuneType::Seek, validated).await
    }

    /// §4.8 Rate control: `rate == current` only flips paused state;
    /// otherwise the elapsed time since the last progress report picks
    /// a trick-frame step, and playback re-tunes at the derived
    /// position with `tuneType=SEEK`.
    pub async fn set_rate(self: &Arc<Self>, new_rate: f32) -> AampResult<()> {
        let current_rate = self.rate();
        if (new_rate - current_rate).abs() < f32::EPSILON {
            let was_paused = self.paused.fetch_xor(true, Ordering::AcqRel);
            let now_paused = !was_paused;
            self.set_state(if now_paused { PlayerState::Paused } else { PlayerState::Playing });
            self.event_sink.on_event(AampEvent::SpeedChanged { rate: new_rate });
            return Ok(());
        }

        *self.rate.lock() = new_rate;
        self.apply_trickplay_rate(new_rate).await;

        let last = *self.last_progress.lock();
        let Some(last) = last else {
            self.event_sink.on_event(AampEvent::SpeedChanged { rate: new_rate });
            return Ok(());
        };
        let Some(url) = self.current_url.lock().clone() else {
            self.event_sink.on_event(AampEvent::SpeedChanged { rate: new_rate });
            return Ok(());
        };

        let elapsed = last.observed_at.elapsed();
        let step: TrickStep = rate::trick_step_for_elapsed(elapsed);
        let fps = self.trickplay_fps().await;
        let delta_sec = rate::frame_step_delta_sec(step, fps);
        let seek_pos_sec = (last.position_sec + delta_sec).max(0.0);

        self.set_state(PlayerState::Seeking);
        self.tune_internal(&url, TuneType::Seek, seek_pos_sec).await?;
        self.event_sink.on_event(AampEvent::SpeedChanged { rate: new_rate });
        Ok(())
    }

    /// §4.8 Retune: schedules a re-tune from a PTS-error burst, under
    /// the single-flight guard so a second caller observing the same
    /// burst is a no-op.
    pub async fn report_pts_error(self: &Arc<Self>, now_ms: i64) {
        if self.retune.record_pts_error(now_ms) {
            self.trigger_retune().await;
        }
    }

    /// A DASH start-time reset always forces a retune (§4.8), unlike a
    /// PTS error which only counts toward the threshold.
    pub async fn report_dash_start_time_reset(self: &Arc<Self>) {
        self.trigger_retune().await;
    }

    async fn trigger_retune(self: &Arc<Self>) {
        if !self.retune.try_begin() {
            debug!("retune already in progress; ignoring duplicate trigger");
            return;
        }
        let Some(url) = self.current_url.lock().clone() else {
            self.retune.finish();
            return;
        };
        let position_sec = self.current_position_sec().await;
        info!(position_sec, "scheduling retune");
        if let Err(err) = self.tune_internal(&url, TuneType::Retune, position_sec).await {
            warn!(?err, "retune failed");
        }
        self.retune.finish();
    }

    #[must_use]
    pub fn is_retune_in_progress(&self) -> bool {
        self.retune.is_in_progress()
    }

    pub async fn position_ms(&self) -> i64 {
        (self.current_position_sec().await * 1000.0) as i64
    }

    /// Tears down the active stream and returns to `Idle`, the way
    /// `PlayerCore::Stop` does once it has waited out any in-flight
    /// retune/discontinuity handling (§5 "suspension points").
    pub async fn stop(self: &Arc<Self>) {
        self.teardown_previous(TuneType::Tune).await;
        self.set_state(PlayerState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aamp_sink_null::{CapturingEventListener, NullSink};

    fn player() -> Arc<PlayerCore> {
        PlayerCore::new(Config::default(), Arc::new(CapturingEventListener::new()), Arc::new(NullSink::new()))
    }

    #[tokio::test]
    async fn starts_idle_and_unpaused() {
        let core = player();
        assert_eq!(core.state(), PlayerState::Idle);
        assert_eq!(core.rate(), 1.0);
    }

    #[tokio::test]
    async fn set_rate_to_same_value_only_toggles_pause() {
        let core = player();
        core.set_rate(1.0).await.expect("same-rate toggle never fails");
        assert_eq!(core.state(), PlayerState::Paused);
        core.set_rate(1.0).await.expect("same-rate toggle never fails");
        assert_eq!(core.state(), PlayerState::Playing);
    }

    #[tokio::test]
    async fn seek_without_a_tuned_stream_reports_seek_range_error() {
        let core = player();
        let err = core.seek(10.0).await.unwrap_err();
        assert!(matches!(err, AampError::SeekRangeError));
    }

    #[tokio::test]
    async fn stop_without_a_tuned_stream_returns_to_idle() {
        let core = player();
        core.stop().await;
        assert_eq!(core.state(), PlayerState::Idle);
    }

    #[tokio::test]
    async fn retune_is_single_flight() {
        let core = player();
        assert!(!core.is_retune_in_progress());
        // No current_url yet, so trigger_retune bails immediately but
        // still exercises the guard's acquire/release path.
        core.trigger_retune().await;
        assert!(!core.is_retune_in_progress());
    }
}
