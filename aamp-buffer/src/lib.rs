//! §4.1 FragmentBuffer: a bounded, per-track ring of prepared fragments
//! with producer/consumer coordination.
//!
//! One fetch loop (producer) and one inject loop (consumer) share a
//! `FragmentBuffer` per track. Ordering is enforced by a `VecDeque`
//! (items leave in the order they were published); capacity is enforced
//! by tracking reserved-but-unpublished slots alongside published ones,
//! matching the ring's `0 <= count <= N` invariant from §3.

use aamp_types::Fragment;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AbortState {
    None,
    /// `abort(false)`: consumers may still drain what's ready, then see EOS.
    Graceful,
    /// `abort(true)`: both sides unblock immediately with a failure.
    Immediate,
}

struct Inner {
    capacity: usize,
    state: Mutex<State>,
    not_full: Notify,
    not_empty: Notify,
}

struct State {
    ready: VecDeque<Fragment>,
    reserved: usize,
    fetched_duration_sec: f64,
    injected_duration_sec: f64,
    abort: AbortState,
}

/// A bounded FIFO ring of fragments, shared between exactly one producer
/// (fetch loop) and one consumer (inject loop) per the §5 ownership
/// policy ("each curl handle owned by exactly one track") extended here
/// to buffers: no cross-track sharing of a `FragmentBuffer`.
#[derive(Clone)]
pub struct FragmentBuffer {
    inner: Arc<Inner>,
}

/// A reserved slot a producer is about to fill. Dropping it without
/// calling `publish` releases the reservation so the buffer never wedges
/// on a panicking fetch loop.
pub struct WriteSlot {
    buffer: FragmentBuffer,
    published: bool,
}

/// A fragment pulled off the ready queue, still "owned" by the buffer
/// until `release` is called (§4.1: "ownership not yet released").
pub struct ReadSlot {
    buffer: FragmentBuffer,
    fragment: Option<Fragment>,
}

impl FragmentBuffer {
    /// `capacity` defaults to 3 per §3 but is configurable.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "FragmentBuffer capacity must be positive");
        Self {
            inner: Arc::new(Inner {
                capacity,
                state: Mutex::new(State {
                    ready: VecDeque::with_capacity(capacity),
                    reserved: 0,
                    fetched_duration_sec: 0.0,
                    injected_duration_sec: 0.0,
                    abort: AbortState::None,
                }),
                not_full: Notify::new(),
                not_empty: Notify::new(),
            }),
        }
    }

    /// Blocks the caller until a slot is free or the buffer is aborted.
    /// Returns `None` only when aborted (either kind) — callers use this
    /// to stop fetching; a graceful abort still lets the consumer drain.
    pub async fn reserve_write_slot(&self) -> Option<WriteSlot> {
        loop {
            let notified = {
                let mut state = self.inner.state.lock().await;
                if state.abort != AbortState::None {
                    return None;
                }
                if state.reserved + state.ready.len() < self.inner.capacity {
                    state.reserved += 1;
                    return Some(WriteSlot {
                        buffer: self.clone(),
                        published: false,
                    });
                }
                self.inner.not_full.notified()
            };
            notified.await;
        }
    }

    /// Blocks the caller until a fragment is ready or the buffer is
    /// aborted. `Ok(None)` means the ready queue is drained and the
    /// buffer was gracefully aborted — propagate as end-of-stream, not a
    /// failure. `Err(())` means an immediate abort cut the wait short.
    pub async fn consume_read_slot(&self) -> Result<Option<ReadSlot>, ()> {
        loop {
            let notified = {
                let mut state = self.inner.state.lock().await;
                if let Some(fragment) = state.ready.pop_front() {
                    self.inner.not_full.notify_one();
                    return Ok(Some(ReadSlot {
                        buffer: self.clone(),
                        fragment: Some(fragment),
                    }));
                }
                match state.abort {
                    AbortState::Immediate => return Err(()),
                    AbortState::Graceful => return Ok(None),
                    AbortState::None => self.inner.not_empty.notified(),
                }
            };
            notified.await;
        }
    }

    /// Unblocks waiters. `immediate` unblocks both producer and
    /// consumer with a failure; otherwise only the consumer is woken
    /// (once it drains, it observes EOS) so in-flight fragments aren't
    /// discarded mid-stream.
    pub async fn abort(&self, immediate: bool) {
        let mut state = self.inner.state.lock().await;
        state.abort = if immediate {
            AbortState::Immediate
        } else {
            AbortState::Graceful
        };
        drop(state);
        self.inner.not_empty.notify_waiters();
        if immediate {
            self.inner.not_full.notify_waiters();
        }
        debug!(immediate, "FragmentBuffer aborted");
    }

    pub async fn fetched_duration_sec(&self) -> f64 {
        self.inner.state.lock().await.fetched_duration_sec
    }

    pub async fn injected_duration_sec(&self) -> f64 {
        self.inner.state.lock().await.injected_duration_sec
    }

    /// Number of fragments currently cached (neither fetched-but-pending
    /// nor injected), used by the buffer health monitor (§4.4).
    pub async fn cached_count(&self) -> usize {
        self.inner.state.lock().await.ready.len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

impl WriteSlot {
    /// Marks the slot READY, advances the fetch cursor and signals the
    /// consumer. Consumes the slot so `publish` can only be called once.
    pub async fn publish(mut self, fragment: Fragment) {
        let mut state = self.buffer.inner.state.lock().await;
        state.reserved -= 1;
        state.fetched_duration_sec += fragment.duration_sec;
        state.ready.push_back(fragment);
        drop(state);
        self.published = true;
        self.buffer.inner.not_empty.notify_one();
        trace!("fragment published");
    }
}

impl Drop for WriteSlot {
    fn drop(&mut self) {
        if !self.published {
            // Best-effort: release the reservation without blocking in
            // a destructor. The producer must never hold a reserved
            // slot across a panic without eventually dropping it.
            let buffer = self.buffer.clone();
            tokio::spawn(async move {
                let mut state = buffer.inner.state.lock().await;
                state.reserved = state.reserved.saturating_sub(1);
                drop(state);
                buffer.inner.not_full.notify_one();
            });
        }
    }
}

impl ReadSlot {
    #[must_use]
    pub fn fragment(&self) -> &Fragment {
        self.fragment
            .as_ref()
            .expect("fragment present until release")
    }

    /// Frees the payload of the read slot, advances the inject cursor
    /// and signals any waiting producer. Consumes the slot; the
    /// underlying `Fragment` is dropped (its payload deallocated) after
    /// this returns, matching the "Fragment slot is either FREE or holds
    /// exactly one payload allocation" invariant.
    pub async fn release(mut self) {
        let fragment = self.fragment.take().expect("release called once");
        let mut state = self.buffer.inner.state.lock().await;
        state.injected_duration_sec += fragment.duration_sec;
        drop(state);
        self.buffer.inner.not_full.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aamp_types::MediaType;

    fn fragment(seq: i64, duration: f64) -> Fragment {
        Fragment {
            payload: vec![0u8; 4],
            pts_sec: seq as f64,
            dts_sec: seq as f64,
            duration_sec: duration,
            profile_index: 0,
            media_type: MediaType::Video,
            discontinuity: false,
            sequence_number: seq,
            uri: format!("frag-{seq}.ts"),
        }
    }

    #[tokio::test]
    async fn publish_then_consume_preserves_order() {
        let buf = FragmentBuffer::new(3);
        for seq in 0..3 {
            let slot = buf.reserve_write_slot().await.unwrap();
            slot.publish(fragment(seq, 1.0)).await;
        }
        for seq in 0..3 {
            let read = buf.consume_read_slot().await.unwrap().unwrap();
            assert_eq!(read.fragment().sequence_number, seq);
            read.release().await;
        }
    }

    #[tokio::test]
    async fn reserve_blocks_when_full_until_release() {
        let buf = FragmentBuffer::new(1);
        let s1 = buf.reserve_write_slot().await.unwrap();
        s1.publish(fragment(0, 1.0)).await;

        let buf2 = buf.clone();
        let reserve_fut = tokio::spawn(async move { buf2.reserve_write_slot().await });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!reserve_fut.is_finished());

        let read = buf.consume_read_slot().await.unwrap().unwrap();
        read.release().await;

        let slot = reserve_fut.await.unwrap();
        assert!(slot.is_some());
    }

    #[tokio::test]
    async fn fetched_and_injected_duration_are_monotone() {
        let buf = FragmentBuffer::new(2);
        for seq in 0..2 {
            let slot = buf.reserve_write_slot().await.unwrap();
            slot.publish(fragment(seq, 2.0)).await;
        }
        assert_eq!(buf.fetched_duration_sec().await, 4.0);
        assert_eq!(buf.injected_duration_sec().await, 0.0);

        let read = buf.consume_read_slot().await.unwrap().unwrap();
        read.release().await;
        assert_eq!(buf.injected_duration_sec().await, 2.0);
        assert!(buf.injected_duration_sec().await <= buf.fetched_duration_sec().await);
    }

    #[tokio::test]
    async fn graceful_abort_lets_consumer_drain_then_eos() {
        let buf = FragmentBuffer::new(2);
        let slot = buf.reserve_write_slot().await.unwrap();
        slot.publish(fragment(0, 1.0)).await;

        buf.abort(false).await;

        let read = buf.consume_read_slot().await.unwrap();
        assert!(read.is_some());
        read.unwrap().release().await;

        let eos = buf.consume_read_slot().await.unwrap();
        assert!(eos.is_none());
    }

    #[tokio::test]
    async fn immediate_abort_unblocks_producer_with_failure() {
        let buf = FragmentBuffer::new(1);
        let _held = buf.reserve_write_slot().await.unwrap();

        let buf2 = buf.clone();
        let waiter = tokio::spawn(async move { buf2.reserve_write_slot().await });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        buf.abort(true).await;

        let result = waiter.await.unwrap();
        assert!(result.is_none());
    }
}
