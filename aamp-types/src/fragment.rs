use crate::media::MediaType;

/// One prepared fragment as it sits in a `FragmentBuffer` slot.
///
/// Ownership of `payload` transfers from the downloader to the buffer to
/// the sink; §3 requires the source pointer be cleared on transfer, which
/// in Rust we model by the caller of `StreamSink::send` receiving the
/// `Vec<u8>` by value (moved out of the slot, not cloned).
#[derive(Debug, Clone)]
pub struct Fragment {
    pub payload: Vec<u8>,
    pub pts_sec: f64,
    pub dts_sec: f64,
    pub duration_sec: f64,
    pub profile_index: usize,
    pub media_type: MediaType,
    pub discontinuity: bool,
    /// Sequence number this fragment was selected for, used to enforce
    /// the "strictly monotone by +1" invariant in §8.
    pub sequence_number: i64,
    /// Diagnostic-only; never parsed by downstream code.
    pub uri: String,
}

impl Fragment {
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(seq: i64) -> Fragment {
        Fragment {
            payload: vec![1, 2, 3],
            pts_sec: 0.0,
            dts_sec: 0.0,
            duration_sec: 6.0,
            profile_index: 0,
            media_type: MediaType::Video,
            discontinuity: false,
            sequence_number: seq,
            uri: "seg.ts".to_string(),
        }
    }

    #[test]
    fn len_and_is_empty_reflect_the_payload() {
        let fragment = sample(1);
        assert_eq!(fragment.len(), 3);
        assert!(!fragment.is_empty());

        let mut empty = sample(2);
        empty.payload.clear();
        assert!(empty.is_empty());
    }
}
