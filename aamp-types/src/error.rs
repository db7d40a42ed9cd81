use thiserror::Error;

/// §7 error taxonomy, surfaced to the host as `AampEvent::TuneFailed`
/// payloads, named so the mapping from HTTP/CURL failure conditions to
/// a tune-failure code stays traceable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuneFailureCode {
    InitFailed,
    ManifestReqFailed,
    AuthorisationFailure,
    FragmentDownloadFailure,
    InitFragmentDownloadFailure,
    DrmInitFailed,
    DrmDataBindFailed,
    DrmChallengeFailed,
    DrmKeyUpdateFailed,
    LicenceTimeout,
    LicenceRequestFailed,
    InvalidDrmKey,
    FailedToGetKeyId,
    FailedToGetAccessToken,
    CorruptDrmData,
    DrmDecryptFailed,
    GstPipelineError,
    PlaybackStalled,
    ContentNotFound,
    UnsupportedStreamType,
    DeviceNotProvisioned,
    UntrackedDrmError,
    FailureUnknown,
}

impl TuneFailureCode {
    /// Whether the host should be told a retry might succeed. HDCP-style
    /// substrings on `GstPipelineError` are the one case where a
    /// generally-retryable code becomes non-retryable (§7).
    #[must_use]
    pub fn retryable(self, description: &str) -> bool {
        match self {
            TuneFailureCode::GstPipelineError => {
                !description.contains("HDCP Authentication Failure")
            }
            TuneFailureCode::ContentNotFound
            | TuneFailureCode::DeviceNotProvisioned
            | TuneFailureCode::AuthorisationFailure => false,
            _ => true,
        }
    }
}

#[derive(Debug, Error)]
pub enum AampError {
    #[error("manifest download failed: {0}")]
    ManifestDownload(String),

    #[error("seek position is past the live/VOD edge")]
    SeekRangeError,

    #[error("sequence number gap of {gap} exceeds MAX_SEQ_NUMBER_LAG_COUNT ({max})")]
    SequenceNumberGap { gap: i64, max: i64 },

    #[error("drm error: {0}")]
    Drm(String),

    #[error("fragment buffer aborted")]
    BufferAborted,

    #[error("playlist parse error at line {line}: {message}")]
    PlaylistParse { line: usize, message: String },

    #[error("tune failure: {code:?} - {message}")]
    Tune {
        code: TuneFailureCode,
        message: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AampResult<T> = Result<T, AampError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hdcp_substring_makes_gst_pipeline_error_non_retryable() {
        assert!(!TuneFailureCode::GstPipelineError.retryable("HDCP Authentication Failure on HDMI0"));
        assert!(TuneFailureCode::GstPipelineError.retryable("decoder stalled"));
    }

    #[test]
    fn content_not_found_and_auth_failure_are_never_retryable() {
        assert!(!TuneFailureCode::ContentNotFound.retryable(""));
        assert!(!TuneFailureCode::DeviceNotProvisioned.retryable(""));
        assert!(!TuneFailureCode::AuthorisationFailure.retryable(""));
    }

    #[test]
    fn other_codes_default_to_retryable() {
        assert!(TuneFailureCode::ManifestReqFailed.retryable(""));
        assert!(TuneFailureCode::PlaybackStalled.retryable(""));
    }
}
