//! Deferred license acquisition scheduling (§4.6). The playlist parser
//! (`aamp-playlist`) calls `compute_deferred_due_ms` while indexing a
//! deferred-license tag; the `StreamAbstraction` refresh loop later
//! compares wall-clock time against the recorded due time to promote the
//! selected `DrmMetadata` into an active `DrmSession`.

use rand::Rng;
use sha1::{Digest, Sha1};

/// Lower bound of the deferral window, in seconds, grounded on
/// `original_source/streamabstraction.cpp`'s `DEFER_DRM_LIC_OFFSET_FROM_START`.
pub const OFFSET_FROM_START_SECS: i64 = 5;
/// Upper-bound margin subtracted from `max_time_secs`, grounded on the
/// same source's `DEFER_DRM_LIC_OFFSET_TO_UPPER_BOUND`.
pub const OFFSET_TO_UPPER_BOUND_SECS: i64 = 5;

/// Picks a due time within `[OFFSET_FROM_START, maxTime - OFFSET_TO_UPPER_BOUND]`
/// seconds. When a MAC address is available the choice is deterministic
/// (SHA-1 over the MAC plus 16 bytes of system entropy); otherwise it
/// falls back to a non-deterministic PRNG draw, per §4.6.
#[must_use]
pub fn compute_deferred_due_ms(max_time_secs: f64, mac_address: Option<&str>) -> i64 {
    let divisor = ((max_time_secs as i64) - OFFSET_FROM_START_SECS - OFFSET_TO_UPPER_BOUND_SECS).max(1);

    let offset_secs = match mac_address {
        Some(mac) if !mac.is_empty() => {
            let mut entropy = [0u8; 16];
            rand::rng().fill(&mut entropy);
            let mut hasher = Sha1::new();
            hasher.update(mac.as_bytes());
            hasher.update(entropy);
            let digest = hasher.finalize();
            let mut eight = [0u8; 8];
            eight.copy_from_slice(&digest[0..8]);
            (u64::from_be_bytes(eight) % divisor as u64) as i64
        }
        _ => rand::rng().random_range(0..divisor),
    };

    (offset_secs + OFFSET_FROM_START_SECS) * 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_time_always_falls_inside_the_deferral_window() {
        for _ in 0..50 {
            let due_ms = compute_deferred_due_ms(60.0, None);
            assert!(due_ms >= OFFSET_FROM_START_SECS * 1000);
            assert!(due_ms <= (60 - OFFSET_TO_UPPER_BOUND_SECS) * 1000);
        }
    }

    #[test]
    fn same_mac_and_window_stay_within_bounds_across_calls() {
        for _ in 0..50 {
            let due_ms = compute_deferred_due_ms(60.0, Some("AA:BB:CC:DD:EE:FF"));
            assert!(due_ms >= OFFSET_FROM_START_SECS * 1000);
            assert!(due_ms <= (60 - OFFSET_TO_UPPER_BOUND_SECS) * 1000);
        }
    }

    #[test]
    fn tiny_window_does_not_panic() {
        let due_ms = compute_deferred_due_ms(8.0, None);
        assert!(due_ms >= OFFSET_FROM_START_SECS * 1000);
    }
}
