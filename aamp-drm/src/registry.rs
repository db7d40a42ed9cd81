use crate::DrmSession;
use dashmap::DashMap;
use std::sync::Arc;

/// sha1 -> `DrmSession` map shared across tracks (§4.6, §5: "a global
/// mutex serializes sha1->session lookups"). `DashMap` gives us that
/// serialization per-shard without a single coarse lock, following the
/// teacher's use of `DashMap` for the stream registry.
#[derive(Default)]
pub struct DrmRegistry {
    sessions: DashMap<String, Arc<DrmSession>>,
}

impl DrmRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Returns the existing session for `sha1_hash` or creates one. A
    /// second track reaching the same sha1 reuses the in-progress or
    /// completed session, per §4.6.
    #[must_use]
    pub fn get_or_create(&self, sha1_hash: &str) -> Arc<DrmSession> {
        self.sessions
            .entry(sha1_hash.to_string())
            .or_insert_with(|| Arc::new(DrmSession::new()))
            .clone()
    }

    pub fn remove(&self, sha1_hash: &str) {
        self.sessions.remove(sha1_hash);
    }

    pub fn clear(&self) {
        self.sessions.clear();
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
