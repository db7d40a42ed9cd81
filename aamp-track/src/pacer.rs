//! Cross-track injection pacing (§9 redesign: a `TrackPacer` object
//! replaces the original's back-pointer from the audio track to the
//! video track's injected-duration counter). Only the audio track ever
//! waits; video and subtitle injection always proceeds and just records
//! its progress so audio can compare against it.

use aamp_types::MediaType;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::Notify;

struct Inner {
    injected_sec: Mutex<HashMap<MediaType, f64>>,
    notify: Notify,
}

/// Shared between one track pair (video + audio) so the audio inject
/// loop can hold back when it has run too far ahead of video (§4.4 step
/// 4: "audio/video injection stays within one fragment duration of
/// each other").
#[derive(Clone)]
pub struct TrackPacer {
    inner: std::sync::Arc<Inner>,
}

impl TrackPacer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: std::sync::Arc::new(Inner {
                injected_sec: Mutex::new(HashMap::new()),
                notify: Notify::new(),
            }),
        }
    }

    /// Records how far `media_type` has injected and wakes anyone
    /// waiting on it.
    pub fn record_injected(&self, media_type: MediaType, injected_duration_sec: f64) {
        self.inner.injected_sec.lock().insert(media_type, injected_duration_sec);
        self.inner.notify.notify_waiters();
    }

    /// Blocks `MediaType::Audio` while it has injected more than
    /// `fragment_duration_sec` ahead of the last recorded video
    /// position. A no-op for every other media type, and a no-op if no
    /// video progress has been recorded yet (video track absent, e.g.
    /// audio-only content).
    pub async fn wait_if_ahead(&self, me: MediaType, my_injected_sec: f64, fragment_duration_sec: f64) {
        if me != MediaType::Audio {
            return;
        }
        loop {
            let video_sec = self.inner.injected_sec.lock().get(&MediaType::Video).copied();
            let Some(video_sec) = video_sec else {
                return;
            };
            if my_injected_sec <= video_sec + fragment_duration_sec {
                return;
            }
            self.inner.notify.notified().await;
        }
    }
}

impl Default for TrackPacer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn non_audio_never_waits() {
        let pacer = TrackPacer::new();
        tokio::time::timeout(
            Duration::from_millis(50),
            pacer.wait_if_ahead(MediaType::Video, 1000.0, 2.0),
        )
        .await
        .expect("video never blocks on the pacer");
    }

    #[tokio::test]
    async fn audio_waits_until_video_catches_up() {
        let pacer = TrackPacer::new();
        pacer.record_injected(MediaType::Video, 0.0);

        let waiter = pacer.clone();
        let handle = tokio::spawn(async move {
            waiter.wait_if_ahead(MediaType::Audio, 10.0, 2.0).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        pacer.record_injected(MediaType::Video, 9.0);
        tokio::time::timeout(Duration::from_millis(200), handle)
            .await
            .expect("audio should unblock once video catches up")
            .unwrap();
    }

    #[tokio::test]
    async fn audio_is_unblocked_when_no_video_track_exists() {
        let pacer = TrackPacer::new();
        tokio::time::timeout(
            Duration::from_millis(50),
            pacer.wait_if_ahead(MediaType::Audio, 500.0, 2.0),
        )
        .await
        .expect("audio-only content must never wait on a video track that doesn't exist");
    }
}
