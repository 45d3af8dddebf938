//! Serves the audio the separation engine writes, at the URLs it reports
//! (`/separated_audio/...`).

use std::io;
use std::path::{Component, Path};
use actix_web::{web, HttpResponse};
use tokio_util::io::ReaderStream;

use crate::errors::AudioError;
use crate::pipeline::JobCoordinator;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/separated_audio/{tail:.*}", web::get().to(serve_stem));
}

async fn serve_stem(
    tail: web::Path<String>,
    coordinator: web::Data<JobCoordinator>,
) -> Result<HttpResponse, AudioError> {
    let relative = Path::new(tail.as_str());
    if !is_plain_relative(relative) {
        return Ok(HttpResponse::NotFound().finish());
    }

    let path = coordinator.config().stems_dir.join(relative);
    let len = match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => meta.len(),
        Ok(_) => return Ok(HttpResponse::NotFound().finish()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HttpResponse::NotFound().finish()),
        Err(e) => return Err(e.into()),
    };

    // Stems can run to hundreds of MB.
    let file = tokio::fs::File::open(&path).await?;
    Ok(HttpResponse::Ok()
        .content_type(content_type_for(&path))
        .no_chunking(len)
        .streaming(ReaderStream::new(file)))
}

/// Only `a/b/c` style paths; no root, no `..`, no `.`.
fn is_plain_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)))
}

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("flac") => "audio/flac",
        Some("ogg") => "audio/ogg",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}
