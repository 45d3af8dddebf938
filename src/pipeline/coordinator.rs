use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use log::{error, info, warn};
use serde_json::Value;

use crate::config::PipelineConfig;
use crate::engines::{AnalysisEngine, ProcessEngine, Stage, StageRequest};
use crate::errors::{AudioError, AudioResult, StageError};
use crate::temp::JobWorkspace;
use crate::utils::{derive_job_id, truncate_head};
use super::simulation::SimulationGenerator;
use super::types::{
    complete_stem_slots, ClassificationResult, CombinedResult, ResultStatus, SeparationResult,
};

/// Raw audio as received from a client.
#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub bytes: Vec<u8>,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Classifying,
    Separating,
    Completed,
    Failed,
}

/// One request moving through the pipeline.
#[derive(Debug)]
pub struct Job {
    pub job_id: String,
    pub input_path: PathBuf,
    pub stage: JobStage,
}

impl Job {
    fn new(job_id: &str, input_path: PathBuf) -> Self {
        Self {
            job_id: job_id.to_string(),
            input_path,
            stage: JobStage::Classifying,
        }
    }

    fn advance(&mut self, next: JobStage) {
        info!("Job {}: {:?} -> {:?}", self.job_id, self.stage, next);
        self.stage = next;
    }
}

/// Sequences classification then separation for one upload and always
/// answers with a complete `CombinedResult` unless the input itself could
/// not be stored.
pub struct JobCoordinator {
    config: PipelineConfig,
    classifier: Arc<dyn AnalysisEngine>,
    separator: Arc<dyn AnalysisEngine>,
    simulation: SimulationGenerator,
}

impl JobCoordinator {
    pub fn new(
        config: PipelineConfig,
        classifier: Arc<dyn AnalysisEngine>,
        separator: Arc<dyn AnalysisEngine>,
    ) -> Self {
        let simulation = SimulationGenerator::new(config.simulated_events, config.spectrum_points);
        Self {
            config,
            classifier,
            separator,
            simulation,
        }
    }

    /// Coordinator driving the configured engine commands as child processes.
    pub fn with_process_engines(config: PipelineConfig) -> Self {
        let classifier = Arc::new(ProcessEngine::new(config.classifier.clone()));
        let separator = Arc::new(ProcessEngine::new(config.separator.clone()));
        Self::new(config, classifier, separator)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run(&self, upload: AudioUpload) -> AudioResult<CombinedResult> {
        let requested_id = derive_job_id(upload.filename.as_deref());
        let mut workspace = JobWorkspace::create(&self.config.work_root, &requested_id).await?;

        let input_path = match workspace.acquire_input_file(&upload.bytes).await {
            Ok(path) => path,
            Err(e) => {
                error!("Job {}: could not materialize input: {}", workspace.job_id(), e);
                workspace.release().await;
                return Err(e);
            }
        };

        let mut job = Job::new(workspace.job_id(), input_path);
        let started = Instant::now();
        let outcome = self.run_stages(&mut job, &mut workspace).await;
        workspace.release().await;

        match outcome {
            Ok(result) => {
                job.advance(JobStage::Completed);
                info!("Job {} completed in {}ms", job.job_id, started.elapsed().as_millis());
                Ok(result)
            }
            Err(e) => self.fall_back(&mut job, e, &upload.bytes, started),
        }
    }

    async fn run_stages(
        &self,
        job: &mut Job,
        workspace: &mut JobWorkspace,
    ) -> AudioResult<CombinedResult> {
        let request = StageRequest::classification(
            &job.job_id,
            job.input_path.clone(),
            self.config.classification_timeout,
        );
        info!("Job {}: classifying via {} engine", job.job_id, self.classifier.engine_type());
        let classification: ClassificationResult =
            decode_payload(Stage::Classification, self.classifier.run(&request).await?)?;
        info!(
            "Job {}: classification found {} sound events",
            job.job_id,
            classification.sound_events.len()
        );

        let handoff_path = workspace.acquire_handoff_file(&classification).await?;
        tokio::fs::create_dir_all(&self.config.stems_dir).await?;

        job.advance(JobStage::Separating);
        info!("Job {}: separating via {} engine", job.job_id, self.separator.engine_type());
        let request = StageRequest::separation(
            &job.job_id,
            job.input_path.clone(),
            self.config.stems_dir.clone(),
            handoff_path,
            self.config.separation_timeout,
        );
        let separation: SeparationResult =
            decode_payload(Stage::Separation, self.separator.run(&request).await?)?;

        Ok(CombinedResult {
            status: ResultStatus::Success,
            job_id: job.job_id.clone(),
            classification,
            stems: complete_stem_slots(separation.stems),
            frequency_spectrum: None,
            debug: separation.debug,
            simulated: false,
        })
    }

    fn fall_back(
        &self,
        job: &mut Job,
        cause: AudioError,
        audio: &[u8],
        started: Instant,
    ) -> AudioResult<CombinedResult> {
        let failed_during = job.stage;
        job.advance(JobStage::Failed);
        error!(
            "Job {} failed during {:?} after {}ms ({}): {}",
            job.job_id,
            failed_during,
            started.elapsed().as_millis(),
            cause.kind(),
            cause
        );

        if !self.config.simulation_enabled {
            return Err(cause);
        }

        warn!("Job {}: activating simulation mode", job.job_id);
        let result = self
            .simulation
            .generate(&mut rand::thread_rng(), audio, &cause.to_string())?;
        job.advance(JobStage::Completed);
        Ok(result)
    }
}

/// Typed view of an engine payload; a payload of the wrong shape is a
/// protocol failure of that stage.
fn decode_payload<T: serde::de::DeserializeOwned>(stage: Stage, payload: Value) -> Result<T, StageError> {
    let preview = truncate_head(&payload.to_string(), 200);
    serde_json::from_value(payload).map_err(|e| StageError::Protocol {
        stage,
        detail: format!("unexpected payload shape: {}", e),
        diagnostic: preview,
    })
}
