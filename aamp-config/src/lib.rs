//! Typed view of the tunable configuration surface §6 lists under
//! "Configuration options recognized". The CLI/config-file loader that
//! populates this struct from `<key>=<value>` lines is an external
//! collaborator (§1); this crate only owns the shape and the defaults,
//! laid out one section per concern.

use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub abr: AbrConfig,
    pub buffering: BufferingConfig,
    pub drm: DrmConfig,
    pub live: LiveConfig,
    pub events: EventConfig,
    pub sink_hints: SinkHintsConfig,
    pub rewrite: RewriteConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            abr: AbrConfig::default(),
            buffering: BufferingConfig::default(),
            drm: DrmConfig::default(),
            live: LiveConfig::default(),
            events: EventConfig::default(),
            sink_hints: SinkHintsConfig::default(),
            rewrite: RewriteConfig::default(),
        }
    }
}

impl Config {
    /// Load layered configuration: compiled-in defaults, then an
    /// optional file, then `AAMP_*` environment overrides, in that
    /// precedence order.
    pub fn load(file_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder()
            .add_source(config::Config::try_from(&Config::default())?);
        if let Some(path) = file_path {
            builder = builder.add_source(File::from(path).required(false));
        }
        builder = builder.add_source(Environment::with_prefix("AAMP").separator("__"));
        builder.build()?.try_deserialize()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub fragment_dl_timeout_secs: u32,
    pub http_proxy: Option<String>,
    pub force_http: bool,
    pub network_latency_threshold_ms: u32,
    pub max_download_retries: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            fragment_dl_timeout_secs: 10,
            http_proxy: None,
            force_http: false,
            network_latency_threshold_ms: 2000,
            max_download_retries: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AbrConfig {
    pub enabled: bool,
    pub default_bitrate_bps: i64,
    pub default_bitrate_4k_bps: i64,
    pub iframe_default_bitrate_bps: i64,
    pub iframe_default_bitrate_4k_bps: i64,
    pub cache_life_ms: i64,
    pub cache_length: usize,
    pub outlier_diff_bytes: i64,
    pub skip_duration_secs: f64,
    pub nw_consistency_count: u32,
    pub rampdown_hysteresis_bps: i64,
    pub safety_factor_percent: u32,
}

impl Default for AbrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_bitrate_bps: 2_500_000,
            default_bitrate_4k_bps: 13_000_000,
            iframe_default_bitrate_bps: 1_000_000,
            iframe_default_bitrate_4k_bps: 4_000_000,
            cache_life_ms: 5_000,
            cache_length: 3,
            outlier_diff_bytes: 5 * 1024 * 1024,
            skip_duration_secs: 6.0,
            nw_consistency_count: 2,
            rampdown_hysteresis_bps: 500_000,
            safety_factor_percent: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferingConfig {
    pub fragment_cache_length: usize,
    pub min_vod_cache_secs: f64,
    pub buffer_health_monitor_delay_secs: u64,
    pub buffer_health_monitor_interval_secs: u64,
    pub gst_buffering_before_play: bool,
}

impl Default for BufferingConfig {
    fn default() -> Self {
        Self {
            fragment_cache_length: 3,
            min_vod_cache_secs: 5.0,
            buffer_health_monitor_delay_secs: 10,
            buffer_health_monitor_interval_secs: 5,
            gst_buffering_before_play: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreferredDrm {
    WideVine,
    PlayReady,
    ConsecAgnostic,
    AdobeAccess,
    VanillaAes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DrmConfig {
    pub preferred_drm: PreferredDrm,
    pub license_server_url: Option<String>,
    pub license_anonymous_request: bool,
    pub license_retry_wait_time_ms: u64,
}

impl Default for DrmConfig {
    fn default() -> Self {
        Self {
            preferred_drm: PreferredDrm::VanillaAes,
            license_server_url: None,
            license_anonymous_request: false,
            license_retry_wait_time_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub live_offset_secs: f64,
    pub cdvr_live_offset_secs: f64,
    pub max_refresh_interval_ms: i64,
    pub pts_error_threshold: u32,
    pub stall_timeout_ms: i64,
    pub playlists_parallel_fetch: bool,
    pub pre_fetch_iframe_playlist: bool,
    pub hls_av_sync_use_start_time: bool,
    pub tsb_enabled: bool,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            live_offset_secs: 15.0,
            cdvr_live_offset_secs: 30.0,
            max_refresh_interval_ms: 6_000,
            pts_error_threshold: 4,
            stall_timeout_ms: 10_000,
            playlists_parallel_fetch: true,
            pre_fetch_iframe_playlist: false,
            hls_av_sync_use_start_time: true,
            tsb_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    pub enable_subscribed_tags: bool,
    pub disable_playlist_indexed_event: bool,
    pub live_tune_event_playlist_indexed: bool,
    pub live_tune_event_first_fragment_decrypted: bool,
    pub vod_tune_event_playlist_indexed: bool,
    pub report_progress_interval_ms: u64,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            enable_subscribed_tags: false,
            disable_playlist_indexed_event: false,
            live_tune_event_playlist_indexed: false,
            live_tune_event_first_fragment_decrypted: true,
            vod_tune_event_playlist_indexed: true,
            report_progress_interval_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkHintsConfig {
    pub demux_hls_audio_track: bool,
    pub demux_hls_video_track: bool,
    pub demuxed_audio_before_video: bool,
    pub vod_trickplay_fps: u32,
    pub linear_trickplay_fps: u32,
}

impl Default for SinkHintsConfig {
    fn default() -> Self {
        Self {
            demux_hls_audio_track: true,
            demux_hls_video_track: true,
            demuxed_audio_before_video: false,
            vod_trickplay_fps: 4,
            linear_trickplay_fps: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    pub map_mpd: bool,
    pub fog_dash: bool,
    pub fog: bool,
    pub force_ec3: bool,
    pub disable_ec3: bool,
    pub disable_atmos: bool,
    pub dash_ignore_base_url_if_slash: bool,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            map_mpd: false,
            fog_dash: false,
            fog: true,
            force_ec3: false,
            disable_ec3: false,
            disable_atmos: false,
            dash_ignore_base_url_if_slash: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_a_file() {
        let cfg = Config::load(None).expect("defaults must always deserialize");
        assert_eq!(cfg.abr.default_bitrate_bps, 2_500_000);
        assert_eq!(cfg.buffering.fragment_cache_length, 3);
    }

    #[test]
    fn env_override_wins_over_default() {
        std::env::set_var("AAMP__ABR__DEFAULT_BITRATE_BPS", "1000000");
        let cfg = Config::load(None).expect("env override should deserialize");
        assert_eq!(cfg.abr.default_bitrate_bps, 1_000_000);
        std::env::remove_var("AAMP__ABR__DEFAULT_BITRATE_BPS");
    }
}
