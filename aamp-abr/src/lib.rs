//! §4.5 AbrController: a pure profile-selection policy plus the
//! outlier-rejecting throughput sample ring it reads measured bandwidth
//! from. Nothing here performs I/O or spawns tasks — `aamp-track` drives
//! it after each fetched video fragment.

use aamp_config::AbrConfig;
use aamp_types::{Profile, ThroughputSample, ThroughputSink};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Mutable ramp state the caller threads through successive
/// `ramp_up_or_down` calls; kept outside `AbrController` so the
/// controller itself stays a pure function of `(profiles, config)`.
#[derive(Debug, Clone, Default)]
pub struct RampState {
    consistency_counter: u32,
    trending_up: Option<bool>,
}

pub struct AbrController {
    profiles: Vec<Profile>,
    config: AbrConfig,
}

impl AbrController {
    #[must_use]
    pub fn new(profiles: Vec<Profile>, config: AbrConfig) -> Self {
        Self { profiles, config }
    }

    /// Largest profile with bandwidth <= the configured default (4K
    /// variant when `is_4k`), with an optional bias toward the middle
    /// of the ladder used when resuming without network history.
    #[must_use]
    pub fn initial_profile_index(&self, is_4k: bool, get_mid: bool) -> usize {
        let ceiling = if is_4k {
            self.config.default_bitrate_4k_bps
        } else {
            self.config.default_bitrate_bps
        };
        let best = self.best_matched_profile_index_by_bandwidth(ceiling);
        if get_mid {
            let non_iframe_count = self.non_iframe_indices().count();
            if non_iframe_count > 0 {
                let mid = self.non_iframe_indices().nth(non_iframe_count / 2);
                return mid.unwrap_or(best);
            }
        }
        best
    }

    /// A persisted bandwidth from a prior partial tune is honored only
    /// if it stays within the default ceiling (§4.7 step 2).
    #[must_use]
    pub fn initial_profile_index_with_persisted(
        &self,
        is_4k: bool,
        persisted_bandwidth_bps: Option<i64>,
    ) -> usize {
        let ceiling = if is_4k {
            self.config.default_bitrate_4k_bps
        } else {
            self.config.default_bitrate_bps
        };
        match persisted_bandwidth_bps {
            Some(bps) if bps <= ceiling => self.best_matched_profile_index_by_bandwidth(bps),
            _ => self.initial_profile_index(is_4k, false),
        }
    }

    /// Largest non-iframe profile with bandwidth <= `bps`.
    #[must_use]
    pub fn best_matched_profile_index_by_bandwidth(&self, bps: i64) -> usize {
        self.non_iframe_indices()
            .filter(|&idx| self.profiles[idx].bandwidth_bps <= bps)
            .max_by_key(|&idx| self.profiles[idx].bandwidth_bps)
            .unwrap_or_else(|| {
                self.non_iframe_indices()
                    .min_by_key(|&idx| self.profiles[idx].bandwidth_bps)
                    .unwrap_or(0)
            })
    }

    /// Next-lower non-iframe profile, saturating at the lowest.
    #[must_use]
    pub fn ramped_down_profile_index(&self, cur_idx: usize) -> usize {
        let cur_bps = self.profiles.get(cur_idx).map_or(i64::MAX, |p| p.bandwidth_bps);
        self.non_iframe_indices()
            .filter(|&idx| self.profiles[idx].bandwidth_bps < cur_bps)
            .max_by_key(|&idx| self.profiles[idx].bandwidth_bps)
            .unwrap_or(cur_idx)
    }

    #[must_use]
    pub fn lowest_iframe_profile(&self) -> Option<usize> {
        self.iframe_indices().min_by_key(|&idx| self.profiles[idx].bandwidth_bps)
    }

    #[must_use]
    pub fn desired_iframe_profile(&self, target_bps: i64) -> Option<usize> {
        self.iframe_indices()
            .filter(|&idx| self.profiles[idx].bandwidth_bps <= target_bps)
            .max_by_key(|&idx| self.profiles[idx].bandwidth_bps)
            .or_else(|| self.lowest_iframe_profile())
    }

    /// Ramp up after `nw_consistency_count` samples trending upward, or
    /// ramp down immediately once `cur_bps` exceeds `net_bps` by more
    /// than the hysteresis band — matching the asymmetric ramp-up/
    /// ramp-down behavior described in §4.5.
    pub fn ramp_up_or_down(
        &self,
        cur_idx: usize,
        cur_bps: i64,
        net_bps: i64,
        state: &mut RampState,
    ) -> usize {
        if cur_bps > net_bps + self.config.rampdown_hysteresis_bps {
            state.consistency_counter = 0;
            state.trending_up = None;
            return self.ramped_down_profile_index(cur_idx);
        }

        if net_bps > cur_bps {
            if state.trending_up == Some(true) {
                state.consistency_counter += 1;
            } else {
                state.trending_up = Some(true);
                state.consistency_counter = 1;
            }
            if state.consistency_counter >= self.config.nw_consistency_count {
                state.consistency_counter = 0;
                let target = net_bps * i64::from(self.config.safety_factor_percent) / 100;
                let candidate = self.best_matched_profile_index_by_bandwidth(target);
                let candidate_bps = self.profiles.get(candidate).map_or(0, |p| p.bandwidth_bps);
                let cur_bps_ladder = self.profiles.get(cur_idx).map_or(0, |p| p.bandwidth_bps);
                return if candidate_bps > cur_bps_ladder { candidate } else { cur_idx };
            }
        } else {
            state.trending_up = None;
            state.consistency_counter = 0;
        }
        cur_idx
    }

    /// ABR is suppressed for the first `abr_skip_duration` seconds of
    /// playback unless measured bandwidth is already below the current
    /// profile's bandwidth (§4.5).
    #[must_use]
    pub fn abr_suppressed(&self, elapsed_since_start_sec: f64, cur_idx: usize, measured_bps: i64) -> bool {
        if elapsed_since_start_sec >= self.config.skip_duration_secs {
            return false;
        }
        let cur_bps = self.profiles.get(cur_idx).map_or(0, |p| p.bandwidth_bps);
        measured_bps >= cur_bps
    }

    fn non_iframe_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.profiles
            .iter()
            .enumerate()
            .filter(|(_, profile)| !profile.is_iframe_track)
            .map(|(idx, _)| idx)
    }

    fn iframe_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.profiles
            .iter()
            .enumerate()
            .filter(|(_, profile)| profile.is_iframe_track)
            .map(|(idx, _)| idx)
    }
}

/// Bounded, outlier-rejecting throughput sample ring consumed by
/// `AbrController::ramp_up_or_down` (§4.2, §4.5).
pub struct BandwidthEstimator {
    samples: Mutex<VecDeque<ThroughputSample>>,
    cache_life_ms: i64,
    cache_length: usize,
    outlier_diff_bits: i64,
}

impl BandwidthEstimator {
    #[must_use]
    pub fn new(config: &AbrConfig) -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(config.cache_length)),
            cache_life_ms: config.cache_life_ms,
            cache_length: config.cache_length,
            // abrOutlierDiffBytes is specified in bytes/sec in the
            // original; samples here are bits/sec.
            outlier_diff_bits: config.outlier_diff_bytes * 8,
        }
    }

    /// Evicts samples older than `cache_life_ms` relative to `now_ms`,
    /// drops outliers more than `outlier_diff_bits` from the median, and
    /// averages the remainder.
    #[must_use]
    pub fn measured_bandwidth_bps(&self, now_ms: i64) -> Option<i64> {
        let mut samples = self.samples.lock();
        samples.retain(|sample| now_ms - sample.timestamp_ms <= self.cache_life_ms);
        while samples.len() > self.cache_length {
            samples.pop_front();
        }
        if samples.is_empty() {
            return None;
        }

        let mut values: Vec<i64> = samples.iter().map(|s| s.bits_per_second).collect();
        values.sort_unstable();
        let median = values[values.len() / 2];

        let kept: Vec<i64> = values
            .into_iter()
            .filter(|value| (value - median).abs() <= self.outlier_diff_bits)
            .collect();
        if kept.is_empty() {
            return Some(median);
        }
        Some(kept.iter().sum::<i64>() / kept.len() as i64)
    }
}

impl ThroughputSink for BandwidthEstimator {
    fn record(&self, sample: ThroughputSample) {
        let mut samples = self.samples.lock();
        samples.push_back(sample);
        while samples.len() > self.cache_length {
            samples.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_profiles() -> Vec<Profile> {
        vec![
            Profile::new(1_500_000, 640, 360, "low.m3u8"),
            Profile::new(3_000_000, 1280, 720, "mid.m3u8"),
            Profile::new(6_000_000, 1920, 1080, "high.m3u8"),
        ]
    }

    #[test]
    fn best_matched_picks_largest_within_budget() {
        let abr = AbrController::new(three_profiles(), AbrConfig::default());
        assert_eq!(abr.best_matched_profile_index_by_bandwidth(3_500_000), 1);
        assert_eq!(abr.best_matched_profile_index_by_bandwidth(10_000_000), 2);
        assert_eq!(abr.best_matched_profile_index_by_bandwidth(100), 0);
    }

    #[test]
    fn ramped_down_saturates_at_lowest() {
        let abr = AbrController::new(three_profiles(), AbrConfig::default());
        assert_eq!(abr.ramped_down_profile_index(1), 0);
        assert_eq!(abr.ramped_down_profile_index(0), 0);
    }

    #[test]
    fn ramp_up_requires_consistency_then_promotes() {
        let mut config = AbrConfig::default();
        config.nw_consistency_count = 2;
        config.safety_factor_percent = 100;
        let abr = AbrController::new(three_profiles(), config);
        let mut state = RampState::default();

        assert_eq!(abr.ramp_up_or_down(0, 1_500_000, 6_000_000, &mut state), 0);
        assert_eq!(abr.ramp_up_or_down(0, 1_500_000, 6_000_000, &mut state), 2);
    }

    #[test]
    fn ramp_down_is_immediate_past_hysteresis() {
        let mut config = AbrConfig::default();
        config.rampdown_hysteresis_bps = 500_000;
        let abr = AbrController::new(three_profiles(), config);
        let mut state = RampState::default();
        let next = abr.ramp_up_or_down(2, 6_000_000, 3_000_000, &mut state);
        assert_eq!(next, 1);
    }

    #[test]
    fn bandwidth_estimator_rejects_outliers_and_averages_rest() {
        let config = AbrConfig {
            cache_life_ms: 10_000,
            cache_length: 10,
            outlier_diff_bytes: 1_000_000,
            ..AbrConfig::default()
        };
        let estimator = BandwidthEstimator::new(&config);
        estimator.record(ThroughputSample { timestamp_ms: 0, bits_per_second: 2_000_000 });
        estimator.record(ThroughputSample { timestamp_ms: 1, bits_per_second: 2_200_000 });
        estimator.record(ThroughputSample { timestamp_ms: 2, bits_per_second: 50_000_000 });

        let measured = estimator.measured_bandwidth_bps(2).unwrap();
        assert!(measured < 3_000_000, "outlier should have been rejected, got {measured}");
    }

    #[test]
    fn bandwidth_estimator_evicts_stale_samples() {
        let config = AbrConfig {
            cache_life_ms: 100,
            ..AbrConfig::default()
        };
        let estimator = BandwidthEstimator::new(&config);
        estimator.record(ThroughputSample { timestamp_ms: 0, bits_per_second: 1_000_000 });
        assert!(estimator.measured_bandwidth_bps(1_000).is_none());
    }
}
