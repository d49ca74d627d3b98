//! Transcoder subprocess management
//!
//! A [`TranscodeLauncher`] turns a [`SourceDescriptor`] into a running
//! transcoder whose stdout is a fragmented MP4 byte stream.

mod args;
mod launcher;

pub use args::build_args;
pub use launcher::{TranscodeLauncher, Transcoder, UpstreamEvent};

#[cfg(test)]
pub(crate) use launcher::tests::shell_config;

use std::fmt;

use url::Url;

use crate::error::RelayError;

/// Schemes the relay accepts as live sources
const SUPPORTED_SCHEMES: &[&str] = &["rtsp", "rtsps", "rtmp", "rtmps", "http", "https"];

/// Connection string of a live source
///
/// Immutable for the life of a session. The raw string is what the
/// transcoder receives; parsing only validates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    raw: String,
    scheme: String,
}

impl SourceDescriptor {
    /// Validate a descriptor taken from a connection request
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(RelayError::MissingSourceDescriptor);
        }

        let url = Url::parse(raw)
            .map_err(|e| RelayError::InvalidSourceDescriptor(format!("{}: {}", raw, e)))?;

        let scheme = url.scheme().to_ascii_lowercase();
        if !SUPPORTED_SCHEMES.contains(&scheme.as_str()) {
            return Err(RelayError::InvalidSourceDescriptor(format!(
                "unsupported scheme '{}'",
                scheme
            )));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(RelayError::InvalidSourceDescriptor(format!(
                "{}: missing host",
                raw
            )));
        }

        Ok(Self {
            raw: raw.to_string(),
            scheme,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Pull-based real-time transport (RTSP), which needs TCP forcing and
    /// bounded probing
    pub fn is_pull_realtime(&self) -> bool {
        matches!(self.scheme.as_str(), "rtsp" | "rtsps")
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
