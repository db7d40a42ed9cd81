use crate::media::{AudioFormat, MediaType, VideoFormat};

/// Whether a sink accepted or discarded one `send` call. A sink discards
/// when it has no pipeline to accept data yet (e.g. between `Stop` and
/// the next `Tune`) rather than blocking the inject loop indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Accepted,
    Discarded,
}

/// The host's media pipeline, as seen from the core (§6 `StreamSink`).
/// `MediaTrack` is the only caller; everything downstream of `send` is an
/// external collaborator (demuxer, decoder, renderer).
#[async_trait::async_trait]
pub trait StreamSink: Send + Sync {
    async fn send(
        &self,
        media_type: MediaType,
        payload: &[u8],
        pts_sec: f64,
        dts_sec: f64,
        duration_sec: f64,
    ) -> SendOutcome;

    fn end_of_stream_reached(&self, media_type: MediaType);

    /// Called on an `IndexNode` with `discontinuity` set before its
    /// payload is sent. Returning `false` tells the caller to stop
    /// injecting on this track (e.g. the sink tore down mid-discontinuity).
    async fn discontinuity(&self, media_type: MediaType) -> bool;

    fn is_cache_empty(&self, media_type: MediaType) -> bool;

    /// Seeks the pipeline to `position_sec` at `rate` without tearing it
    /// down, used on teardown when the host wants to preserve the
    /// pipeline across a retune/seek (§6 `Flush`).
    async fn flush(&self, position_sec: f64, rate: f32);

    /// Toggles the pipeline's paused state without a full stop (§6 `Pause`).
    fn pause(&self, paused: bool);

    /// Tears the pipeline down. `keep_last_frame` asks the sink to leave
    /// the last rendered video frame on screen rather than blanking it
    /// (§6 `Stop`).
    async fn stop(&self, keep_last_frame: bool);

    /// Announces the elementary formats the upcoming fragments will
    /// carry; `es_change_status` is set when this call follows a
    /// mid-stream codec change rather than the initial tune (§6 `Configure`).
    fn configure(&self, video_format: VideoFormat, audio_format: AudioFormat, es_change_status: bool);

    fn set_video_rectangle(&self, x: i32, y: i32, w: i32, h: i32);

    fn set_zoom(&self, enabled: bool);

    fn set_mute(&self, muted: bool);

    /// Volume in `[0, 100]`.
    fn set_audio_volume(&self, volume: u32);

    fn get_video_size(&self) -> (u32, u32);

    /// Tells the sink that the fragment cache has reached its configured
    /// pre-roll depth and the pipeline may leave the buffering state
    /// (§6 `NotifyFragmentCachingComplete`).
    fn notify_fragment_caching_complete(&self);

    /// Free-form diagnostic text for a `status`-style CLI command (§6
    /// `DumpStatus`). Not part of the event/error taxonomy — purely
    /// informational.
    fn dump_status(&self) -> String;
}
