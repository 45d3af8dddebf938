use std::sync::Arc;
use async_trait::async_trait;
use log::debug;
use serde_json::Value;

use crate::errors::StageError;
use super::{AnalysisEngine, StageRequest};

type StageFn = dyn Fn(&StageRequest) -> Result<Value, StageError> + Send + Sync;

/// In-process engine: runs a Rust function instead of spawning a process.
///
/// The timeout budget is not enforced here; native analysis is expected to
/// honour `request.timeout` itself.
#[derive(Clone)]
pub struct NativeEngine {
    name: &'static str,
    analyze: Arc<StageFn>,
}

impl NativeEngine {
    pub fn new<F>(name: &'static str, analyze: F) -> Self
    where
        F: Fn(&StageRequest) -> Result<Value, StageError> + Send + Sync + 'static,
    {
        Self {
            name,
            analyze: Arc::new(analyze),
        }
    }
}

#[async_trait]
impl AnalysisEngine for NativeEngine {
    async fn run(&self, request: &StageRequest) -> Result<Value, StageError> {
        debug!("[{}] Running native engine {} for job {}", request.stage, self.name, request.job_id);
        (self.analyze)(request)
    }

    fn engine_type(&self) -> &'static str {
        "native"
    }
}
