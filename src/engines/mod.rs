use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use async_trait::async_trait;
use serde_json::Value;

use crate::errors::StageError;

pub mod native;
pub mod payload;
pub mod process;

pub use native::NativeEngine;
pub use process::{EngineCommand, ProcessEngine};

/// The two pipeline stages. Classification always runs first; separation
/// consumes its handoff file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Classification,
    Separation,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Classification => "classification",
            Stage::Separation => "separation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything one engine invocation needs.
#[derive(Debug, Clone)]
pub struct StageRequest {
    pub stage: Stage,
    pub job_id: String,
    pub input_path: PathBuf,
    /// Where the separation engine writes its stems.
    pub output_dir: Option<PathBuf>,
    /// Classification artifact written by the previous stage.
    pub handoff_path: Option<PathBuf>,
    pub timeout: Duration,
}

impl StageRequest {
    pub fn classification(job_id: &str, input_path: PathBuf, timeout: Duration) -> Self {
        Self {
            stage: Stage::Classification,
            job_id: job_id.to_string(),
            input_path,
            output_dir: None,
            handoff_path: None,
            timeout,
        }
    }

    pub fn separation(
        job_id: &str,
        input_path: PathBuf,
        output_dir: PathBuf,
        handoff_path: PathBuf,
        timeout: Duration,
    ) -> Self {
        Self {
            stage: Stage::Separation,
            job_id: job_id.to_string(),
            input_path,
            output_dir: Some(output_dir),
            handoff_path: Some(handoff_path),
            timeout,
        }
    }

    /// Positional arguments in engine order:
    /// `input [output_dir] job_id [handoff]`.
    ///
    /// Each path stays a separate argv entry, so spaces and shell
    /// metacharacters in working directories need no quoting.
    pub fn positional_args(&self) -> Vec<OsString> {
        let mut args = vec![self.input_path.clone().into_os_string()];
        if let Some(dir) = &self.output_dir {
            args.push(dir.clone().into_os_string());
        }
        args.push(OsString::from(&self.job_id));
        if let Some(handoff) = &self.handoff_path {
            args.push(handoff.clone().into_os_string());
        }
        args
    }
}

/// One analysis engine behind a stage boundary.
///
/// Implementations never retry; the coordinator owns failure policy.
#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    async fn run(&self, request: &StageRequest) -> Result<Value, StageError>;
    fn engine_type(&self) -> &'static str;
}
