use crate::error::TuneFailureCode;
use crate::state::PlayerState;

/// Every event the core can hand to the host's listener contract (§6).
/// `PlayerCore` is the only producer; components report upward through
/// their capability handles rather than emitting events directly (§9).
#[derive(Debug, Clone)]
pub enum AampEvent {
    Tuned,
    TuneFailed {
        code: TuneFailureCode,
        /// Truncated to 128 chars per §6 contract.
        description: String,
        retryable: bool,
    },
    SpeedChanged {
        rate: f32,
    },
    Eos,
    PlaylistIndexed,
    Progress {
        position_ms: i64,
        duration_ms: i64,
        start_ms: i64,
        end_ms: i64,
        playback_rate: f32,
    },
    CcHandleReceived {
        handle: u64,
    },
    BitrateChanged {
        time_ms: i64,
        bitrate_bps: i64,
        description: String,
        width: u32,
        height: u32,
    },
    TimedMetadata {
        time_ms: i64,
        name: String,
        content: String,
    },
    StateChanged {
        state: PlayerState,
    },
    MediaMetadata {
        duration_ms: i64,
        languages: Vec<String>,
        bitrates: Vec<i64>,
        width: u32,
        height: u32,
        has_drm: bool,
        supported_speeds: Vec<f32>,
    },
    SpeedsChanged {
        supported_speeds: Vec<f32>,
    },
    EnteringLive,
    DrmMetadata {
        access_status: i32,
        access_status_value: i32,
    },
}

impl AampEvent {
    /// Construct a `TuneFailed` event, truncating the description and
    /// deriving `retryable` the way §7 specifies.
    #[must_use]
    pub fn tune_failed(code: TuneFailureCode, description: impl Into<String>) -> Self {
        let mut description = description.into();
        if description.len() > 128 {
            description.truncate(128);
        }
        let retryable = code.retryable(&description);
        AampEvent::TuneFailed {
            code,
            description,
            retryable,
        }
    }
}

/// The host-supplied sink for produced events. The core only ever calls
/// `on_event`; dispatch/marshalling to the host application's thread is
/// an external collaborator per §1.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: AampEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tune_failed_truncates_description_to_128_chars() {
        let long = "x".repeat(200);
        let event = AampEvent::tune_failed(TuneFailureCode::ManifestReqFailed, long);
        match event {
            AampEvent::TuneFailed { description, .. } => assert_eq!(description.len(), 128),
            _ => unreachable!(),
        }
    }

    #[test]
    fn tune_failed_derives_retryable_from_the_code() {
        let event = AampEvent::tune_failed(TuneFailureCode::ContentNotFound, "404");
        match event {
            AampEvent::TuneFailed { retryable, .. } => assert!(!retryable),
            _ => unreachable!(),
        }
    }
}
