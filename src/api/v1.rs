use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Result};
use futures::{StreamExt, TryStreamExt};
use log::info;
use std::sync::OnceLock;
use std::time::SystemTime;

use crate::api::{AnalyzeAudioRequest, HealthResponse};
use crate::errors::{AudioError, AudioResult};
use crate::pipeline::{AudioUpload, JobCoordinator};
use crate::utils::decode_base64_audio;

/// Largest upload accepted, in bytes.
const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

static START_TIME: OnceLock<SystemTime> = OnceLock::new();

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health_check))
            .route("/classify-audio", web::post().to(classify_audio))
            .route("/classify-audio/forensic", web::post().to(classify_audio))
    );
}

pub fn init_start_time() {
    START_TIME.set(SystemTime::now()).ok();
}

async fn health_check(coordinator: web::Data<JobCoordinator>) -> Result<HttpResponse> {
    let now = SystemTime::now();
    let start_time = START_TIME.get().unwrap_or(&now);
    let uptime = SystemTime::now()
        .duration_since(*start_time)
        .unwrap_or_default()
        .as_secs();

    Ok(HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        simulation_enabled: coordinator.config().simulation_enabled,
    }))
}

/// Accepts a multipart upload (`audio` or `file` field) or a JSON body with
/// base64 audio, and answers with the combined analysis result.
async fn classify_audio(
    req: HttpRequest,
    payload: web::Payload,
    coordinator: web::Data<JobCoordinator>,
) -> Result<HttpResponse, AudioError> {
    let upload = if req.content_type().starts_with("multipart/form-data") {
        read_multipart(Multipart::new(req.headers(), payload)).await?
    } else {
        read_json(payload).await?
    };

    if upload.bytes.is_empty() {
        return Err(AudioError::InvalidRequest("uploaded audio is empty".to_string()));
    }

    info!(
        "Received {} bytes of audio ({})",
        upload.bytes.len(),
        upload.filename.as_deref().unwrap_or("unnamed upload")
    );

    let result = coordinator.run(upload).await?;
    Ok(HttpResponse::Ok().json(result))
}

async fn read_multipart(mut payload: Multipart) -> AudioResult<AudioUpload> {
    let mut audio = None;
    let mut uploaded_name = None;
    let mut explicit_name = None;

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| AudioError::InvalidRequest(e.to_string()))?
    {
        let (name, file_name) = match field.content_disposition() {
            Some(disposition) => (
                disposition.get_name().map(str::to_owned),
                disposition.get_filename().map(str::to_owned),
            ),
            None => (None, None),
        };

        match name.as_deref() {
            Some("audio") | Some("file") => {
                audio = Some(read_field(&mut field).await?);
                uploaded_name = file_name;
            }
            Some("filename") => {
                let value = read_field(&mut field).await?;
                explicit_name = Some(String::from_utf8(value).map_err(|_| {
                    AudioError::InvalidRequest("filename field is not valid UTF-8".to_string())
                })?);
            }
            _ => {
                read_field(&mut field).await?;
            }
        }
    }

    let bytes = audio.ok_or_else(|| {
        AudioError::InvalidRequest("no `audio` or `file` field in upload".to_string())
    })?;
    Ok(AudioUpload {
        bytes,
        filename: explicit_name.or(uploaded_name),
    })
}

async fn read_field(field: &mut Field) -> AudioResult<Vec<u8>> {
    let mut data = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| AudioError::InvalidRequest(e.to_string()))?;
        if data.len() + chunk.len() > MAX_UPLOAD_BYTES {
            return Err(AudioError::InvalidRequest("upload exceeds size limit".to_string()));
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

async fn read_json(mut payload: web::Payload) -> AudioResult<AudioUpload> {
    let mut body = Vec::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| AudioError::InvalidRequest(e.to_string()))?;
        if body.len() + chunk.len() > MAX_UPLOAD_BYTES {
            return Err(AudioError::InvalidRequest("request body exceeds size limit".to_string()));
        }
        body.extend_from_slice(&chunk);
    }

    let request: AnalyzeAudioRequest = serde_json::from_slice(&body)
        .map_err(|e| AudioError::InvalidRequest(format!("malformed JSON body: {}", e)))?;
    let bytes = decode_base64_audio(&request.audio_data)
        .map_err(|e| AudioError::InvalidRequest(format!("audioData is not valid base64: {}", e)))?;

    Ok(AudioUpload {
        bytes,
        filename: request.filename,
    })
}
