//! A minimal in-memory reference `StreamSink`/`EventListener` pair,
//! kept as its own tiny crate rather than `#[cfg(test)]`-gated behind
//! whichever crate needs it. Useful for integration tests across
//! `aamp-track`/`aamp-stream`/`aamp-player` and as a reference
//! implementation of the `StreamSink` contract for host integrations
//! that just want to record what the core would have sent.

use aamp_types::{AampEvent, AudioFormat, EventListener, MediaType, SendOutcome, StreamSink, VideoFormat};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::trace;

#[derive(Debug, Default, Clone, Copy)]
pub struct SinkTally {
    pub sends: u64,
    pub bytes: u64,
    pub discontinuities: u64,
    pub eos: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LastConfigure {
    pub video_format: Option<VideoFormat>,
    pub audio_format: Option<AudioFormat>,
    pub es_change_status: bool,
}

/// Accepts every `send` call, recording byte counts per media type.
/// Never discards — set `accept` to `false` to exercise the discard
/// path from a test. Every other `StreamSink` call is recorded rather
/// than acted on, for test assertions.
pub struct NullSink {
    accept: std::sync::atomic::AtomicBool,
    tallies: Mutex<HashMap<MediaType, SinkTally>>,
    paused: std::sync::atomic::AtomicBool,
    stopped: std::sync::atomic::AtomicBool,
    muted: std::sync::atomic::AtomicBool,
    volume: std::sync::atomic::AtomicU32,
    configure: Mutex<Option<LastConfigure>>,
    flush_calls: Mutex<Vec<(f64, f32)>>,
}

impl NullSink {
    #[must_use]
    pub fn new() -> Self {
        Self {
            accept: std::sync::atomic::AtomicBool::new(true),
            tallies: Mutex::new(HashMap::new()),
            paused: std::sync::atomic::AtomicBool::new(false),
            stopped: std::sync::atomic::AtomicBool::new(false),
            muted: std::sync::atomic::AtomicBool::new(false),
            volume: std::sync::atomic::AtomicU32::new(100),
            configure: Mutex::new(None),
            flush_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_accepting(&self, accept: bool) {
        self.accept.store(accept, std::sync::atomic::Ordering::Release);
    }

    #[must_use]
    pub fn tally(&self, media_type: MediaType) -> SinkTally {
        self.tallies.lock().get(&media_type).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(std::sync::atomic::Ordering::Acquire)
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(std::sync::atomic::Ordering::Acquire)
    }

    #[must_use]
    pub fn last_configure(&self) -> Option<LastConfigure> {
        *self.configure.lock()
    }

    #[must_use]
    pub fn flush_calls(&self) -> Vec<(f64, f32)> {
        self.flush_calls.lock().clone()
    }
}

impl Default for NullSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl StreamSink for NullSink {
    async fn send(&self, media_type: MediaType, payload: &[u8], pts_sec: f64, _dts_sec: f64, _duration_sec: f64) -> SendOutcome {
        if !self.accept.load(std::sync::atomic::Ordering::Acquire) {
            return SendOutcome::Discarded;
        }
        trace!(?media_type, pts_sec, len = payload.len(), "NullSink accepted fragment");
        let mut tallies = self.tallies.lock();
        let entry = tallies.entry(media_type).or_default();
        entry.sends += 1;
        entry.bytes += payload.len() as u64;
        SendOutcome::Accepted
    }

    fn end_of_stream_reached(&self, media_type: MediaType) {
        self.tallies.lock().entry(media_type).or_default().eos = true;
    }

    async fn discontinuity(&self, media_type: MediaType) -> bool {
        self.tallies.lock().entry(media_type).or_default().discontinuities += 1;
        true
    }

    fn is_cache_empty(&self, media_type: MediaType) -> bool {
        self.tallies.lock().get(&media_type).map_or(true, |tally| tally.sends == 0)
    }

    async fn flush(&self, position_sec: f64, rate: f32) {
        self.flush_calls.lock().push((position_sec, rate));
    }

    fn pause(&self, paused: bool) {
        self.paused.store(paused, std::sync::atomic::Ordering::Release);
    }

    async fn stop(&self, _keep_last_frame: bool) {
        self.stopped.store(true, std::sync::atomic::Ordering::Release);
    }

    fn configure(&self, video_format: VideoFormat, audio_format: AudioFormat, es_change_status: bool) {
        *self.configure.lock() = Some(LastConfigure {
            video_format: Some(video_format),
            audio_format: Some(audio_format),
            es_change_status,
        });
    }

    fn set_video_rectangle(&self, _x: i32, _y: i32, _w: i32, _h: i32) {}

    fn set_zoom(&self, _enabled: bool) {}

    fn set_mute(&self, muted: bool) {
        self.muted.store(muted, std::sync::atomic::Ordering::Release);
    }

    fn set_audio_volume(&self, volume: u32) {
        self.volume.store(volume, std::sync::atomic::Ordering::Release);
    }

    fn get_video_size(&self) -> (u32, u32) {
        (1920, 1080)
    }

    fn notify_fragment_caching_complete(&self) {}

    fn dump_status(&self) -> String {
        format!("NullSink: tallies={:?}, paused={}, stopped={}", self.tallies.lock(), self.is_paused(), self.is_stopped())
    }
}

/// Collects every event handed to it, for test assertions.
pub struct CapturingEventListener {
    events: Mutex<Vec<AampEvent>>,
}

impl CapturingEventListener {
    #[must_use]
    pub fn new() -> Self {
        Self { events: Mutex::new(Vec::new()) }
    }

    #[must_use]
    pub fn events(&self) -> Vec<AampEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for CapturingEventListener {
    fn default() -> Self {
        Self::new()
    }
}

impl EventListener for CapturingEventListener {
    fn on_event(&self, event: AampEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accepts_by_default_and_tallies_bytes() {
        let sink = NullSink::new();
        let outcome = sink.send(MediaType::Video, &[0u8; 16], 0.0, 0.0, 2.0).await;
        assert_eq!(outcome, SendOutcome::Accepted);
        assert_eq!(sink.tally(MediaType::Video).bytes, 16);
        assert_eq!(sink.tally(MediaType::Video).sends, 1);
    }

    #[tokio::test]
    async fn discards_when_not_accepting() {
        let sink = NullSink::new();
        sink.set_accepting(false);
        let outcome = sink.send(MediaType::Audio, &[0u8; 4], 0.0, 0.0, 1.0).await;
        assert_eq!(outcome, SendOutcome::Discarded);
        assert_eq!(sink.tally(MediaType::Audio).sends, 0);
    }

    #[tokio::test]
    async fn end_of_stream_and_discontinuity_are_recorded() {
        let sink = NullSink::new();
        sink.end_of_stream_reached(MediaType::Video);
        assert!(sink.tally(MediaType::Video).eos);
        assert!(sink.discontinuity(MediaType::Video).await);
        assert_eq!(sink.tally(MediaType::Video).discontinuities, 1);
    }

    #[tokio::test]
    async fn configure_records_the_chosen_formats() {
        let sink = NullSink::new();
        sink.configure(VideoFormat::H264, AudioFormat::Aac, false);
        let recorded = sink.last_configure().expect("configure must record a call");
        assert_eq!(recorded.video_format, Some(VideoFormat::H264));
        assert_eq!(recorded.audio_format, Some(AudioFormat::Aac));
        assert!(!recorded.es_change_status);
    }

    #[tokio::test]
    async fn pause_and_stop_flip_their_own_flags_independently() {
        let sink = NullSink::new();
        sink.pause(true);
        assert!(sink.is_paused());
        assert!(!sink.is_stopped());
        sink.stop(true).await;
        assert!(sink.is_stopped());
    }

    #[tokio::test]
    async fn flush_is_recorded_in_call_order() {
        let sink = NullSink::new();
        sink.flush(10.0, 1.0).await;
        sink.flush(12.0, 4.0).await;
        assert_eq!(sink.flush_calls(), vec![(10.0, 1.0), (12.0, 4.0)]);
    }

    #[test]
    fn event_listener_captures_in_order() {
        let listener = CapturingEventListener::new();
        listener.on_event(AampEvent::Tuned);
        listener.on_event(AampEvent::Eos);
        let events = listener.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], AampEvent::Tuned));
        assert!(matches!(events[1], AampEvent::Eos));
    }
}
