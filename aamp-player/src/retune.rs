//! §9 redesign: "the retune registry becomes an explicit multi-instance
//! scheduler service with a single well-defined lifecycle" rather than
//! a process-global mutable singleton. One `RetuneScheduler` lives
//! inside each `PlayerCore` and owns both the PTS-error window and the
//! single-flight guard §4.8 describes as `mIsRetuneInProgress`.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// `AAMP_MAX_TIME_BW_UNDERFLOWS_TO_TRIGGER_RETUNE_MS` from §4.8: the
/// sliding window a run of PTS errors must fall inside to count as one
/// triggering burst rather than isolated, unrelated glitches.
const UNDERFLOW_WINDOW_MS: i64 = 20_000;

pub struct RetuneScheduler {
    pts_error_times_ms: Mutex<VecDeque<i64>>,
    threshold: u32,
    in_progress: AtomicBool,
}

impl RetuneScheduler {
    #[must_use]
    pub fn new(pts_error_threshold: u32) -> Self {
        Self {
            pts_error_times_ms: Mutex::new(VecDeque::new()),
            threshold: pts_error_threshold,
            in_progress: AtomicBool::new(false),
        }
    }

    /// Records a PTS error observed at `now_ms` and reports whether the
    /// run occurring in the trailing `UNDERFLOW_WINDOW_MS` has reached
    /// `pts_error_threshold`.
    pub fn record_pts_error(&self, now_ms: i64) -> bool {
        let mut times = self.pts_error_times_ms.lock();
        times.push_back(now_ms);
        while times.front().is_some_and(|t| now_ms - *t > UNDERFLOW_WINDOW_MS) {
            times.pop_front();
        }
        times.len() as u32 >= self.threshold
    }

    pub fn reset_pts_errors(&self) {
        self.pts_error_times_ms.lock().clear();
    }

    /// Claims the single retune slot; returns `false` (and does nothing)
    /// if a retune is already running, mirroring callers observing
    /// `mIsRetuneInProgress` and declining to start a second one.
    #[must_use]
    pub fn try_begin(&self) -> bool {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn finish(&self) {
        self.in_progress.store(false, Ordering::Release);
        self.reset_pts_errors();
    }

    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn does_not_trigger_below_threshold() {
        let scheduler = RetuneScheduler::new(4);
        assert!(!scheduler.record_pts_error(0));
        assert!(!scheduler.record_pts_error(100));
        assert!(!scheduler.record_pts_error(200));
    }

    #[test]
    fn triggers_once_threshold_reached_within_window() {
        let scheduler = RetuneScheduler::new(3);
        assert!(!scheduler.record_pts_error(0));
        assert!(!scheduler.record_pts_error(5_000));
        assert!(scheduler.record_pts_error(10_000));
    }

    #[test]
    fn errors_outside_the_window_are_evicted() {
        let scheduler = RetuneScheduler::new(2);
        assert!(!scheduler.record_pts_error(0));
        assert!(!scheduler.record_pts_error(25_000));
    }

    #[test]
    fn only_one_retune_runs_at_a_time() {
        let scheduler = RetuneScheduler::new(1);
        assert!(scheduler.try_begin());
        assert!(!scheduler.try_begin());
        scheduler.finish();
        assert!(scheduler.try_begin());
    }
}
