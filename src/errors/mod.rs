use std::io;
use std::time::Duration;
use actix_web::{HttpResponse, ResponseError};
use actix_web::http::StatusCode;
use serde_json::json;
use thiserror::Error;

use crate::engines::Stage;

/// Failure of a single external engine invocation.
///
/// Stage errors never reach the client while simulation is enabled; the
/// coordinator logs them and converts them into a simulated result.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{stage} engine `{program}` could not be started: {source}")]
    Spawn {
        stage: Stage,
        program: String,
        #[source]
        source: io::Error,
    },

    #[error(
        "{stage} engine timed out after {}s ({elapsed_ms}ms elapsed){}{}",
        .budget.as_secs(),
        stderr_suffix(.stderr),
        stdout_suffix(.stdout_prefix)
    )]
    Timeout {
        stage: Stage,
        budget: Duration,
        elapsed_ms: u64,
        stderr: String,
        stdout_prefix: String,
    },

    #[error(
        "{stage} engine failed with exit code {} after {elapsed_ms}ms: {stderr}{}",
        exit_code_label(.code),
        stdout_suffix(.stdout_prefix)
    )]
    Engine {
        stage: Stage,
        code: Option<i32>,
        stderr: String,
        stdout_prefix: String,
        elapsed_ms: u64,
    },

    #[error("{stage} engine produced no parseable payload ({detail}): {diagnostic}")]
    Protocol {
        stage: Stage,
        detail: String,
        diagnostic: String,
    },
}

impl StageError {
    pub fn stage(&self) -> Stage {
        match self {
            StageError::Spawn { stage, .. }
            | StageError::Timeout { stage, .. }
            | StageError::Engine { stage, .. }
            | StageError::Protocol { stage, .. } => *stage,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StageError::Spawn { .. } => "SpawnError",
            StageError::Timeout { .. } => "TimeoutError",
            StageError::Engine { .. } => "EngineError",
            StageError::Protocol { .. } => "ProtocolError",
        }
    }
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none (terminated by signal)".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.trim().is_empty() {
        String::new()
    } else {
        format!(": {}", stderr.trim_end())
    }
}

fn stdout_suffix(stdout: &str) -> String {
    if stdout.trim().is_empty() {
        String::new()
    } else {
        format!(" [stdout: {}]", stdout.trim_end())
    }
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("IO Error: {0}")]
    IoError(#[from] io::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Simulation generator failed: {0}")]
    GeneratorError(String),

    #[error(transparent)]
    Stage(#[from] StageError),
}

pub type AudioResult<T> = Result<T, AudioError>;

impl AudioError {
    pub fn kind(&self) -> &'static str {
        match self {
            AudioError::IoError(_) => "IOError",
            AudioError::InvalidRequest(_) => "InvalidRequest",
            AudioError::InvalidConfig(_) => "InvalidConfig",
            AudioError::GeneratorError(_) => "GeneratorError",
            AudioError::Stage(e) => e.kind(),
        }
    }
}

impl ResponseError for AudioError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.to_string(),
            "error_type": self.kind(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AudioError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            // Only reachable when simulation fallback is switched off.
            AudioError::Stage(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
