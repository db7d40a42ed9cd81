//! §4.2 Downloader: HTTP GET with range, redirect, timeout, progress,
//! cookie/X-Reason header capture and throughput sampling.
//!
//! One `Downloader` instance is owned by exactly one track's fetch loop
//! (§5: "each curl handle is owned by exactly one track at a time");
//! DRM key acquisition uses its own dedicated instance.

mod headers;

use aamp_config::NetworkConfig;
use aamp_types::{DownloadsGate, ThroughputSample, ThroughputSink};
use headers::MoneyTrace;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

const THROUGHPUT_SAMPLE_MIN_BYTES: usize = 50 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Manifest,
    Playlist,
    InitFragment,
    VideoFragment,
    AudioFragment,
    SubtitleFragment,
    License,
}

impl FileKind {
    /// Operation-timeouts are only retried for the manifest/local-playback
    /// path per §4.2; everything else treats a timeout as terminal and
    /// lets the caller (MediaTrack) decide whether to ramp down and retry.
    fn retry_on_timeout(self) -> bool {
        matches!(self, FileKind::Manifest | FileKind::Playlist)
    }

    fn is_video_fragment(self) -> bool {
        matches!(self, FileKind::VideoFragment | FileKind::InitFragment)
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DownloadError {
    #[error("connection timed out")]
    ConnectTimedOut,
    #[error("operation timed out")]
    OperationTimedOut,
    #[error("downloads were disabled mid-transfer")]
    AbortedByGate,
    #[error("transport error")]
    Transport,
    #[error("content-length did not match received byte count")]
    ContentLengthMismatch,
}

pub struct DownloadOutcome {
    pub ok: bool,
    pub http_status: Option<u16>,
    pub error: Option<DownloadError>,
    pub elapsed_ms: u64,
    pub body: Vec<u8>,
    pub effective_url: String,
    /// Captured `Set-Cookie` header, if this response carried a new one.
    pub set_cookie: Option<String>,
    pub x_reason: Option<String>,
}

pub struct Downloader {
    client: reqwest::Client,
    config: NetworkConfig,
    extra_headers: Vec<(String, String)>,
    money_trace: MoneyTrace,
    captured_cookie: Mutex<Option<String>>,
    downloads_gate: DownloadsGate,
    throughput_sink: Option<Arc<dyn ThroughputSink>>,
    /// Shared with whoever reads `ThroughputSample.timestamp_ms` back out
    /// (the ABR loop's `BandwidthEstimator::measured_bandwidth_bps`), so
    /// samples are stamped and read off the same clock instead of each
    /// side free-running its own `Instant` (§4.2, §4.5).
    epoch: Instant,
}

impl Downloader {
    #[must_use]
    pub fn new(
        config: NetworkConfig,
        extra_headers: Vec<(String, String)>,
        downloads_gate: DownloadsGate,
        throughput_sink: Option<Arc<dyn ThroughputSink>>,
        epoch: Instant,
    ) -> Self {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(u64::from(config.fragment_dl_timeout_secs)))
            .connect_timeout(Duration::from_secs(5))
            .cookie_store(false);
        if let Some(proxy_url) = &config.http_proxy {
            if let Ok(proxy) = reqwest::Proxy::all(proxy_url) {
                builder = builder.proxy(proxy);
            }
        }
        Self {
            client: builder.build().unwrap_or_else(|_| reqwest::Client::new()),
            config,
            extra_headers,
            money_trace: MoneyTrace::new(),
            captured_cookie: Mutex::new(None),
            downloads_gate,
            throughput_sink,
            epoch,
        }
    }

    /// Performs one GET, retrying per the §4.2 contract, and returns a
    /// fully classified outcome. `range` is an inclusive byte range.
    pub async fn get(
        &self,
        url: &str,
        range: Option<(u64, u64)>,
        file_kind: FileKind,
    ) -> DownloadOutcome {
        let started = Instant::now();
        let max_attempts = self.config.max_download_retries.max(1);
        let mut last_error = None;
        let mut last_status = None;

        for attempt in 0..max_attempts {
            if !self.downloads_gate.is_enabled() {
                return DownloadOutcome {
                    ok: false,
                    http_status: None,
                    error: Some(DownloadError::AbortedByGate),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    body: Vec::new(),
                    effective_url: url.to_string(),
                    set_cookie: None,
                    x_reason: None,
                };
            }

            let outcome = self.attempt_once(url, range, file_kind).await;
            let retryable = match outcome.error {
                Some(DownloadError::OperationTimedOut) => file_kind.retry_on_timeout(),
                Some(DownloadError::ConnectTimedOut) => true,
                None => matches!(outcome.http_status, Some(500) | Some(503)),
                _ => false,
            };

            if outcome.ok || !retryable || attempt + 1 == max_attempts {
                self.log_latency(file_kind, started.elapsed());
                return outcome;
            }
            last_error = outcome.error;
            last_status = outcome.http_status;
            debug!(url, attempt, ?last_error, ?last_status, "retrying download");
        }

        DownloadOutcome {
            ok: false,
            http_status: last_status,
            error: last_error,
            elapsed_ms: started.elapsed().as_millis() as u64,
            body: Vec::new(),
            effective_url: url.to_string(),
            set_cookie: None,
            x_reason: None,
        }
    }

    async fn attempt_once(
        &self,
        url: &str,
        range: Option<(u64, u64)>,
        file_kind: FileKind,
    ) -> DownloadOutcome {
        let attempt_started = Instant::now();
        let mut request = self.client.get(url);
        for (name, value) in &self.extra_headers {
            request = request.header(name, value);
        }
        request = request.header("X-MoneyTrace", self.money_trace.next_span_header());
        if let Some(cookie) = self.captured_cookie.lock().clone() {
            request = request.header("Cookie", cookie);
        }
        if let Some((start, end)) = range {
            request = request.header("Range", format!("bytes={start}-{end}"));
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                let error = if err.is_connect() {
                    DownloadError::ConnectTimedOut
                } else if err.is_timeout() {
                    DownloadError::OperationTimedOut
                } else {
                    DownloadError::Transport
                };
                return DownloadOutcome {
                    ok: false,
                    http_status: None,
                    error: Some(error),
                    elapsed_ms: attempt_started.elapsed().as_millis() as u64,
                    body: Vec::new(),
                    effective_url: url.to_string(),
                    set_cookie: None,
                    x_reason: None,
                };
            }
        };

        let http_status = response.status().as_u16();
        let effective_url = response.url().to_string();
        let set_cookie = response
            .headers()
            .get(reqwest::header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let x_reason = response
            .headers()
            .get("X-Reason")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let content_length = response.content_length();

        if let Some(cookie) = &set_cookie {
            *self.captured_cookie.lock() = Some(cookie.clone());
        }

        let gate = self.downloads_gate.clone();
        let body = match Self::read_body_with_gate(response, &gate).await {
            Ok(body) => body,
            Err(error) => {
                return DownloadOutcome {
                    ok: false,
                    http_status: Some(http_status),
                    error: Some(error),
                    elapsed_ms: attempt_started.elapsed().as_millis() as u64,
                    body: Vec::new(),
                    effective_url,
                    set_cookie,
                    x_reason,
                };
            }
        };

        if let Some(expected) = content_length {
            if expected != body.len() as u64 {
                return DownloadOutcome {
                    ok: false,
                    http_status: Some(416),
                    error: Some(DownloadError::ContentLengthMismatch),
                    elapsed_ms: attempt_started.elapsed().as_millis() as u64,
                    body,
                    effective_url,
                    set_cookie,
                    x_reason,
                };
            }
        }

        self.sample_throughput(file_kind, body.len(), attempt_started.elapsed());

        DownloadOutcome {
            ok: (200..300).contains(&http_status),
            http_status: Some(http_status),
            error: None,
            elapsed_ms: attempt_started.elapsed().as_millis() as u64,
            body,
            effective_url,
            set_cookie,
            x_reason,
        }
    }

    async fn read_body_with_gate(
        response: reqwest::Response,
        gate: &DownloadsGate,
    ) -> Result<Vec<u8>, DownloadError> {
        use futures_util::StreamExt;

        let mut stream = response.bytes_stream();
        let mut body = Vec::new();
        loop {
            if !gate.is_enabled() {
                return Err(DownloadError::AbortedByGate);
            }
            match stream.next().await {
                Some(Ok(chunk)) => body.extend_from_slice(&chunk),
                Some(Err(_)) => return Err(DownloadError::Transport),
                None => break,
            }
        }
        Ok(body)
    }

    fn sample_throughput(&self, file_kind: FileKind, bytes: usize, elapsed: Duration) {
        if !file_kind.is_video_fragment() || bytes < THROUGHPUT_SAMPLE_MIN_BYTES {
            return;
        }
        let Some(sink) = &self.throughput_sink else {
            return;
        };
        let elapsed_secs = elapsed.as_secs_f64().max(0.001);
        let bits_per_second = ((bytes as f64 * 8.0) / elapsed_secs) as i64;
        sink.record(ThroughputSample {
            timestamp_ms: self.epoch.elapsed().as_millis() as i64,
            bits_per_second,
        });
    }

    fn log_latency(&self, file_kind: FileKind, elapsed: Duration) {
        let threshold = Duration::from_millis(u64::from(self.config.network_latency_threshold_ms));
        if elapsed > threshold {
            warn!(
                ?file_kind,
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = threshold.as_millis() as u64,
                "network latency"
            );
        }
    }
}
