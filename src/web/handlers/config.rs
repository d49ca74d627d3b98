//! Configuration endpoints
//!
//! - `GET  /api/config`            - full configuration, secrets removed
//! - `POST /api/config/transcoder` - partial transcoder update

use axum::{extract::State, Json};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::config::{AppConfig, AudioMode, TranscoderConfig};
use crate::error::{AppError, Result};
use crate::state::AppState;

fn sanitize_config_for_api(config: &mut AppConfig) {
    config.catalog.service_key = None;
}

pub async fn get_all_config(State(state): State<Arc<AppState>>) -> Json<AppConfig> {
    let mut config = (*state.config.get()).clone();
    sanitize_config_for_api(&mut config);
    Json(config)
}

/// Transcoder settings adjustable over HTTP
///
/// The binary and its leading arguments are only read from the
/// configuration file or the command line. Requests naming them are
/// rejected along with any other unknown field.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TranscoderConfigUpdate {
    pub audio: Option<AudioMode>,
    pub video_codec: Option<String>,
    pub preset: Option<String>,
    pub tune: Option<String>,
    pub probe_size: Option<String>,
    pub analyze_duration_us: Option<u64>,
    pub mux_delay: Option<String>,
    pub read_chunk_size: Option<usize>,
}

impl TranscoderConfigUpdate {
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("video_codec", &self.video_codec),
            ("preset", &self.preset),
            ("tune", &self.tune),
            ("probe_size", &self.probe_size),
            ("mux_delay", &self.mux_delay),
        ];
        for (name, value) in required {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(AppError::BadRequest(format!("{} must not be empty", name)));
            }
        }
        if let Some(size) = self.read_chunk_size {
            if !(1024..=4 * 1024 * 1024).contains(&size) {
                return Err(AppError::BadRequest(
                    "Invalid read_chunk_size: must be 1KiB-4MiB".into(),
                ));
            }
        }
        if let Some(us) = self.analyze_duration_us {
            if us > 10_000_000 {
                return Err(AppError::BadRequest(
                    "Invalid analyze_duration_us: must be at most 10s".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn apply_to(&self, config: &mut TranscoderConfig) {
        if let Some(audio) = self.audio {
            config.audio = audio;
        }
        if let Some(ref codec) = self.video_codec {
            config.video_codec = codec.clone();
        }
        if let Some(ref preset) = self.preset {
            config.preset = preset.clone();
        }
        if let Some(ref tune) = self.tune {
            config.tune = tune.clone();
        }
        if let Some(ref probe_size) = self.probe_size {
            config.probe_size = probe_size.clone();
        }
        if let Some(us) = self.analyze_duration_us {
            config.analyze_duration_us = us;
        }
        if let Some(ref delay) = self.mux_delay {
            config.mux_delay = delay.clone();
        }
        if let Some(size) = self.read_chunk_size {
            config.read_chunk_size = size;
        }
    }
}

/// Update transcoder settings; sessions already running keep theirs
pub async fn update_transcoder_config(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TranscoderConfigUpdate>,
) -> Result<Json<TranscoderConfig>> {
    req.validate()?;

    let config = state
        .config
        .update(|config| req.apply_to(&mut config.transcoder))
        .await?;
    info!("Transcoder config updated, applies to new sessions");

    Ok(Json(config.transcoder.clone()))
}
