use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Web server settings
    pub web: WebConfig,
    /// Transcoder subprocess settings
    pub transcoder: TranscoderConfig,
    /// Relay session settings
    pub relay: RelayConfig,
    /// Source catalog settings
    pub catalog: CatalogConfig,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address
    pub bind_address: String,
    /// Listen port
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 9999,
        }
    }
}

/// Audio handling for the relayed stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioMode {
    /// Drop all audio tracks
    #[default]
    Strip,
    /// Re-encode audio to AAC
    Aac,
}

/// Transcoder configuration
///
/// Read once per session, so changes apply to new sessions only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    /// Transcoder binary (looked up in PATH when not absolute)
    pub binary: String,
    /// Arguments placed before the generated ones
    pub global_args: Vec<String>,
    /// Audio handling
    pub audio: AudioMode,
    /// Video encoder
    pub video_codec: String,
    /// Encoder preset
    pub preset: String,
    /// Encoder tuning profile
    pub tune: String,
    /// Probe window for RTSP inputs
    pub probe_size: String,
    /// Analysis window for RTSP inputs, in microseconds
    pub analyze_duration_us: u64,
    /// Maximum muxer delay, in seconds
    pub mux_delay: String,
    /// Read size on the transcoder's stdout pipe
    pub read_chunk_size: usize,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            global_args: vec![
                "-hide_banner".to_string(),
                "-loglevel".to_string(),
                "warning".to_string(),
            ],
            audio: AudioMode::Strip,
            video_codec: "libx264".to_string(),
            preset: "ultrafast".to_string(),
            tune: "zerolatency".to_string(),
            probe_size: "500k".to_string(),
            analyze_duration_us: 1_000_000,
            mux_delay: "0.001".to_string(),
            read_chunk_size: 64 * 1024,
        }
    }
}

/// Relay session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Abort a session whose transcoder produces no output within this many
    /// seconds. `None` or `0` waits indefinitely.
    pub startup_timeout_secs: Option<u64>,
    /// WebSocket ping interval in seconds. `None` or `0` disables pings.
    pub keepalive_secs: Option<u64>,
    /// How long shutdown waits for sessions to drain, in seconds
    pub shutdown_grace_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            startup_timeout_secs: None,
            keepalive_secs: Some(30),
            shutdown_grace_secs: 5,
        }
    }
}

impl RelayConfig {
    pub fn startup_timeout(&self) -> Option<Duration> {
        self.startup_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn keepalive_interval(&self) -> Option<Duration> {
        self.keepalive_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Source catalog configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// API base URL
    pub base_url: String,
    /// Dataset path below the base URL
    pub dataset: String,
    /// API service key (overridden by `CAM_RELAY_CATALOG_KEY`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_key: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.odcloud.kr/api".to_string(),
            dataset: "15063717/v1/uddi:fd7b941f-734e-4c1d-9155-975be33fc19c".to_string(),
            service_key: None,
            timeout_secs: 10,
        }
    }
}
