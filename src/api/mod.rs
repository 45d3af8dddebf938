use actix_web::web;
use serde::{Deserialize, Serialize};

pub mod stems;
pub mod v1;

/// JSON upload: base64 audio plus the original filename.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeAudioRequest {
    pub audio_data: String,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub simulation_enabled: bool,
}

/// Registers every route the service exposes.
pub fn config(cfg: &mut web::ServiceConfig) {
    v1::config(cfg);
    stems::config(cfg);
}
