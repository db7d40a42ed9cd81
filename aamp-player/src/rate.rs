//! Pure helpers behind `PlayerCore::set_rate` (§4.8 "Rate control").
//! Split out from `player.rs` so the elapsed-time thresholds are
//! testable without spinning up a tune.

use std::time::Duration;

const STEP_BACK_CEILING_MS: u128 = 100;
const KEEP_FRAME_CEILING_MS: u128 = 950;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrickStep {
    StepBack,
    KeepFrame,
    StepForward,
}

/// Classifies how far the last progress report is from "now", the way
/// `SetRate` derives a seek position from `mReportProgressPosn`: a
/// report that just landed implies playback is still a frame behind
/// it, one from nearly a second ago implies it has drifted a frame
/// ahead.
#[must_use]
pub fn trick_step_for_elapsed(elapsed_since_last_progress: Duration) -> TrickStep {
    let ms = elapsed_since_last_progress.as_millis();
    if ms <= STEP_BACK_CEILING_MS {
        TrickStep::StepBack
    } else if ms <= KEEP_FRAME_CEILING_MS {
        TrickStep::KeepFrame
    } else {
        TrickStep::StepForward
    }
}

/// Seconds of position adjustment implied by a `TrickStep` at `fps`
/// frames/sec. `KeepFrame` never moves the position.
#[must_use]
pub fn frame_step_delta_sec(step: TrickStep, fps: u32) -> f64 {
    if fps == 0 {
        return 0.0;
    }
    let frame_sec = 1.0 / f64::from(fps);
    match step {
        TrickStep::StepBack => -frame_sec,
        TrickStep::KeepFrame => 0.0,
        TrickStep::StepForward => frame_sec,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_or_under_100ms_steps_back() {
        assert_eq!(trick_step_for_elapsed(Duration::from_millis(0)), TrickStep::StepBack);
        assert_eq!(trick_step_for_elapsed(Duration::from_millis(100)), TrickStep::StepBack);
    }

    #[test]
    fn between_100_and_950ms_keeps_frame() {
        assert_eq!(trick_step_for_elapsed(Duration::from_millis(101)), TrickStep::KeepFrame);
        assert_eq!(trick_step_for_elapsed(Duration::from_millis(950)), TrickStep::KeepFrame);
    }

    #[test]
    fn over_950ms_steps_forward() {
        assert_eq!(trick_step_for_elapsed(Duration::from_millis(951)), TrickStep::StepForward);
    }

    #[test]
    fn frame_delta_scales_with_fps_and_direction() {
        assert_eq!(frame_step_delta_sec(TrickStep::StepForward, 4), 0.25);
        assert_eq!(frame_step_delta_sec(TrickStep::StepBack, 4), -0.25);
        assert_eq!(frame_step_delta_sec(TrickStep::KeepFrame, 4), 0.0);
    }

    #[test]
    fn zero_fps_never_moves_the_position() {
        assert_eq!(frame_step_delta_sec(TrickStep::StepForward, 0), 0.0);
    }
}
