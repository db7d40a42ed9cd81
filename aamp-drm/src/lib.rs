//! §4.6 DrmSession: per-key-id license acquisition and per-fragment
//! block decryption, plus the §6 `HlsDrmBase` capability trait the core
//! consumes (concrete DRM wire formats are an external collaborator;
//! this crate only implements the vanilla AES-128-CBC path named in
//! `original_source/drm/aes/aamp_aes.h`, the default `VanillaAes`
//! preferred-DRM choice in `aamp-config`).

pub mod deferred;
pub mod registry;

use aamp_net::{Downloader, FileKind};
use aes::cipher::{BlockDecryptMut, KeyIvInit};
use sha1::{Digest, Sha1};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, error, warn};

pub use registry::DrmRegistry;

const AES_128_KEY_LEN: usize = 16;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrmReturn {
    Success,
    KeyAcquisitionTimeout,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketType {
    Video,
    Audio,
}

#[derive(Debug, Clone)]
pub struct DrmInfo {
    pub key_uri: String,
    pub iv: [u8; 16],
    pub sha1_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initialized,
    AcquiringKey,
    Acquired,
    Failed,
    Flush,
}

#[derive(Debug, Error)]
pub enum DrmError {
    #[error("license request failed: {0}")]
    LicenseRequestFailed(String),
    #[error("license response was not {AES_128_KEY_LEN} bytes")]
    InvalidKeyLength,
    #[error("decrypt invoked before a key was acquired")]
    NotAcquired,
}

struct Inner {
    state: tokio::sync::Mutex<(State, Option<State>)>,
    acquired: Notify,
    key: tokio::sync::Mutex<Option<[u8; AES_128_KEY_LEN]>>,
    drm_info: tokio::sync::Mutex<Option<DrmInfo>>,
    metadata_emitted: std::sync::atomic::AtomicBool,
}

/// One key-id's worth of DRM state, shared across every track that
/// references the same SHA-1-identified `DrmMetadata` (§4.6: "shared
/// across tracks via a per-key-id map").
#[derive(Clone)]
pub struct DrmSession {
    inner: Arc<Inner>,
}

impl DrmSession {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: tokio::sync::Mutex::new((State::Initialized, None)),
                acquired: Notify::new(),
                key: tokio::sync::Mutex::new(None),
                drm_info: tokio::sync::Mutex::new(None),
                metadata_emitted: std::sync::atomic::AtomicBool::new(false),
            }),
        }
    }

    /// First caller past a successful acquisition wins the right to emit
    /// the §6 `DRM_METADATA` event for this key; every later caller
    /// (including other tracks sharing this sha1) gets `false` (§4.6:
    /// "a second track reaching the same sha1 reuses the ... completed
    /// session").
    pub fn claim_metadata_emission(&self) -> bool {
        !self.inner.metadata_emitted.swap(true, std::sync::atomic::Ordering::AcqRel)
    }

    /// If already ACQUIRED for the same key URI, no-op; otherwise moves
    /// to ACQUIRING_KEY and spawns the license acquisition task.
    pub async fn set_decrypt_info(&self, drm_info: DrmInfo, downloader: Arc<Downloader>) {
        {
            let existing = self.inner.drm_info.lock().await;
            let state = self.inner.state.lock().await.0;
            if state == State::Acquired {
                if let Some(current) = existing.as_ref() {
                    if current.key_uri == drm_info.key_uri {
                        return;
                    }
                }
            }
        }

        *self.inner.drm_info.lock().await = Some(drm_info.clone());
        self.inner.state.lock().await.0 = State::AcquiringKey;

        let session = self.clone();
        tokio::spawn(async move {
            session.acquire_key(drm_info, downloader).await;
        });
    }

    async fn acquire_key(&self, drm_info: DrmInfo, downloader: Arc<Downloader>) {
        let outcome = downloader
            .get(&drm_info.key_uri, None, FileKind::License)
            .await;

        if !outcome.ok {
            error!(uri = %drm_info.key_uri, status = ?outcome.http_status, "license acquisition failed");
            self.inner.state.lock().await.0 = State::Failed;
            self.inner.acquired.notify_waiters();
            return;
        }
        if outcome.body.len() != AES_128_KEY_LEN {
            warn!(len = outcome.body.len(), "license response had unexpected key length");
            self.inner.state.lock().await.0 = State::Failed;
            self.inner.acquired.notify_waiters();
            return;
        }

        let mut key = [0u8; AES_128_KEY_LEN];
        key.copy_from_slice(&outcome.body);
        *self.inner.key.lock().await = Some(key);
        self.inner.state.lock().await.0 = State::Acquired;
        debug!(uri = %drm_info.key_uri, "key acquired");
        self.inner.acquired.notify_waiters();
    }

    /// Waits up to `timeout_ms` for an in-progress acquisition, then
    /// decrypts in place using AES-128-CBC and truncates `payload` down
    /// to the unpadded plaintext length PKCS7 reports back.
    pub async fn decrypt(
        &self,
        _bucket: BucketType,
        payload: &mut Vec<u8>,
        timeout_ms: u64,
    ) -> DrmReturn {
        loop {
            let state = self.inner.state.lock().await.0;
            match state {
                State::Acquired => break,
                State::Failed => return DrmReturn::Error,
                State::Flush => return DrmReturn::KeyAcquisitionTimeout,
                State::AcquiringKey | State::Initialized => {
                    let notified = self.inner.acquired.notified();
                    let waited = tokio::time::timeout(
                        std::time::Duration::from_millis(timeout_ms),
                        notified,
                    )
                    .await;
                    if waited.is_err() {
                        return DrmReturn::KeyAcquisitionTimeout;
                    }
                }
            }
        }

        let (key, iv) = {
            let key_guard = self.inner.key.lock().await;
            let drm_info_guard = self.inner.drm_info.lock().await;
            match (key_guard.as_ref(), drm_info_guard.as_ref()) {
                (Some(key), Some(info)) => (*key, info.iv),
                _ => return DrmReturn::Error,
            }
        };

        match Aes128CbcDec::new(&key.into(), &iv.into())
            .decrypt_padded_mut::<cbc::cipher::block_padding::Pkcs7>(payload)
        {
            Ok(plaintext) => {
                let plaintext_len = plaintext.len();
                payload.truncate(plaintext_len);
                DrmReturn::Success
            }
            Err(_) => DrmReturn::Error,
        }
    }

    /// Transitions to FLUSH, remembering the prior state so
    /// `restore_key_state` can undo it (§4.6, used by `Stop()` while a
    /// session is ACQUIRING_KEY).
    pub async fn cancel_key_wait(&self) {
        let mut guard = self.inner.state.lock().await;
        guard.1 = Some(guard.0);
        guard.0 = State::Flush;
        drop(guard);
        self.inner.acquired.notify_waiters();
    }

    pub async fn restore_key_state(&self) {
        let mut guard = self.inner.state.lock().await;
        if let Some(prior) = guard.1.take() {
            guard.0 = prior;
        }
    }

    pub async fn is_acquired(&self) -> bool {
        self.inner.state.lock().await.0 == State::Acquired
    }
}

impl Default for DrmSession {
    fn default() -> Self {
        Self::new()
    }
}

#[must_use]
pub fn sha1_hex(blob: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(blob);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_hex_is_forty_chars() {
        let digest = sha1_hex(b"hello world");
        assert_eq!(digest.len(), 40);
    }

    #[tokio::test]
    async fn cancel_then_restore_round_trips_state() {
        let session = DrmSession::new();
        session.inner.state.lock().await.0 = State::AcquiringKey;
        session.cancel_key_wait().await;
        assert_eq!(session.inner.state.lock().await.0, State::Flush);
        session.restore_key_state().await;
        assert_eq!(session.inner.state.lock().await.0, State::AcquiringKey);
    }

    #[tokio::test]
    async fn decrypt_times_out_while_acquiring() {
        let session = DrmSession::new();
        session.inner.state.lock().await.0 = State::AcquiringKey;
        let mut payload = vec![0u8; 16];
        let result = session.decrypt(BucketType::Video, &mut payload, 20).await;
        assert_eq!(result, DrmReturn::KeyAcquisitionTimeout);
    }

    #[test]
    fn metadata_emission_is_claimed_exactly_once() {
        let session = DrmSession::new();
        assert!(session.claim_metadata_emission());
        assert!(!session.claim_metadata_emission());
        // A clone shares the same inner state, so it observes the claim too.
        assert!(!session.clone().claim_metadata_emission());
    }

    #[tokio::test]
    async fn decrypt_round_trips_with_known_key_and_iv() {
        use aes::cipher::BlockEncryptMut;
        let key = [0x42u8; AES_128_KEY_LEN];
        let iv = [0x24u8; 16];
        let plaintext = b"hello aamp core!".to_vec();

        let mut buf = plaintext.clone();
        buf.resize(32, 0);
        let ciphertext_len = cbc::Encryptor::<aes::Aes128>::new(&key.into(), &iv.into())
            .encrypt_padded_mut::<cbc::cipher::block_padding::Pkcs7>(&mut buf, plaintext.len())
            .unwrap()
            .len();
        buf.truncate(ciphertext_len);

        let session = DrmSession::new();
        *session.inner.key.lock().await = Some(key);
        *session.inner.drm_info.lock().await = Some(DrmInfo {
            key_uri: "http://example/key".into(),
            iv,
            sha1_hash: sha1_hex(b"x"),
        });
        session.inner.state.lock().await.0 = State::Acquired;

        let result = session.decrypt(BucketType::Video, &mut buf, 10).await;
        assert_eq!(result, DrmReturn::Success);
        // The PKCS7 padding block must be stripped, not just left trailing.
        assert_eq!(buf.len(), plaintext.len());
        assert_eq!(buf, plaintext);
    }
}
