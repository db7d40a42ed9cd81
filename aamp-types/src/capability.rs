use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// The §9 redesign note replaces "back-pointers from components to the
/// owning player" with small-surface capability handles passed by
/// reference. `DownloadsGate` is one of them: the shared
/// downloads-enabled flag every in-flight downloader / buffer wait
/// checks on wake (§5 "Cancellation").
#[derive(Clone, Default)]
pub struct DownloadsGate {
    enabled: Arc<AtomicBool>,
    changed: Arc<Notify>,
}

impl DownloadsGate {
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(true)),
            changed: Arc::new(Notify::new()),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// `DisableDownloads`: sets the master flag and broadcasts so every
    /// waiter re-checks it.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
        self.changed.notify_waiters();
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
        self.changed.notify_waiters();
    }

    /// Waits until the flag changes (either direction). Callers loop on
    /// this and re-check `is_enabled`; no busy-wait exceeds the caller's
    /// own tick interval (§5: "No busy-wait exceeds 10 ms in any loop").
    pub async fn changed(&self) {
        self.changed.notified().await;
    }
}

/// A single (timestamp_ms, bits_per_second) throughput observation fed
/// into the AbrController's outlier-rejecting ring (§4.2, §4.5).
#[derive(Debug, Clone, Copy)]
pub struct ThroughputSample {
    pub timestamp_ms: i64,
    pub bits_per_second: i64,
}

/// Where the downloader pushes throughput samples. Kept as a narrow
/// trait rather than a pointer back to `AbrController` itself.
pub trait ThroughputSink: Send + Sync {
    fn record(&self, sample: ThroughputSample);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn a_fresh_gate_starts_enabled() {
        let gate = DownloadsGate::new();
        assert!(gate.is_enabled());
    }

    #[tokio::test]
    async fn disable_flips_the_flag_and_wakes_waiters() {
        let gate = DownloadsGate::new();
        let waiter = gate.clone();
        let handle = tokio::spawn(async move {
            waiter.changed().await;
            waiter.is_enabled()
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        gate.disable();
        let seen_enabled = handle.await.unwrap();
        assert!(!seen_enabled);
        assert!(!gate.is_enabled());
    }

    #[test]
    fn enable_after_disable_restores_the_flag() {
        let gate = DownloadsGate::new();
        gate.disable();
        assert!(!gate.is_enabled());
        gate.enable();
        assert!(gate.is_enabled());
    }
}
