//! Service and pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;
use clap::Parser;

use crate::engines::EngineCommand;
use crate::errors::{AudioError, AudioResult};

pub const DEFAULT_CLASSIFICATION_TIMEOUT_SECS: u64 = 300;
/// Separation runs far longer than classification on CPU-only hosts.
pub const DEFAULT_SEPARATION_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_SIMULATED_EVENTS: usize = 15;
pub const DEFAULT_SPECTRUM_POINTS: usize = 50;

/// Forensic audio analysis service
///
/// Accepts uploaded audio, runs the classification and separation engines
/// as child processes and returns one combined JSON result.
#[derive(Parser, Debug)]
#[command(name = "forensic_audio_service")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Address to bind the HTTP server to
    #[arg(long, env = "FORENSIC_BIND", default_value = "127.0.0.1")]
    pub bind: String,

    /// Port to listen on
    #[arg(long, env = "FORENSIC_PORT", default_value_t = 8081)]
    pub port: u16,

    /// Classification stage budget in seconds
    #[arg(long, env = "FORENSIC_CLASSIFICATION_TIMEOUT", default_value_t = DEFAULT_CLASSIFICATION_TIMEOUT_SECS)]
    pub classification_timeout: u64,

    /// Separation stage budget in seconds
    #[arg(long, env = "FORENSIC_SEPARATION_TIMEOUT", default_value_t = DEFAULT_SEPARATION_TIMEOUT_SECS)]
    pub separation_timeout: u64,

    /// Root for per-job working files (defaults to <tmp>/forensic_jobs)
    #[arg(long, env = "FORENSIC_WORK_DIR", value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Directory the separation engine writes stems to, served at /separated_audio
    #[arg(long, env = "FORENSIC_STEMS_DIR", value_name = "DIR", default_value = "public/separated_audio")]
    pub stems_dir: PathBuf,

    /// Interpreter used to launch the engine scripts
    #[arg(long, env = "FORENSIC_INTERPRETER", default_value = "python")]
    pub interpreter: String,

    /// Classification engine script
    #[arg(long, env = "FORENSIC_CLASSIFIER", default_value = "scripts/mediapipe_audio_classifier.py")]
    pub classifier_script: PathBuf,

    /// Separation engine script
    #[arg(long, env = "FORENSIC_SEPARATOR", default_value = "scripts/audio_separator.py")]
    pub separator_script: PathBuf,

    /// Fail requests instead of answering with simulated results
    #[arg(long, env = "FORENSIC_NO_SIMULATION", default_value = "false")]
    pub no_simulation: bool,

    /// Sound events in a simulated classification
    #[arg(long, default_value_t = DEFAULT_SIMULATED_EVENTS)]
    pub simulated_events: usize,

    /// Points in a simulated frequency spectrum
    #[arg(long, default_value_t = DEFAULT_SPECTRUM_POINTS)]
    pub spectrum_points: usize,
}

impl Cli {
    /// Consumes the parsed flags and builds a validated `PipelineConfig`.
    pub fn into_config(self) -> AudioResult<PipelineConfig> {
        let config = PipelineConfig {
            classification_timeout: Duration::from_secs(self.classification_timeout),
            separation_timeout: Duration::from_secs(self.separation_timeout),
            work_root: self.work_dir.unwrap_or_else(PipelineConfig::default_work_root),
            classifier: EngineCommand::script(&self.interpreter, &self.classifier_script),
            separator: EngineCommand::script(&self.interpreter, &self.separator_script),
            stems_dir: self.stems_dir,
            simulation_enabled: !self.no_simulation,
            simulated_events: self.simulated_events,
            spectrum_points: self.spectrum_points,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Everything the job coordinator needs, fixed at construction.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub classification_timeout: Duration,
    pub separation_timeout: Duration,
    pub work_root: PathBuf,
    pub stems_dir: PathBuf,
    pub classifier: EngineCommand,
    pub separator: EngineCommand,
    /// When false, stage failures surface as errors instead of simulated
    /// results. Evidentiary deployments should turn this off.
    pub simulation_enabled: bool,
    pub simulated_events: usize,
    pub spectrum_points: usize,
}

impl PipelineConfig {
    pub fn default_work_root() -> PathBuf {
        std::env::temp_dir().join("forensic_jobs")
    }

    pub fn validate(&self) -> AudioResult<()> {
        if self.classification_timeout.is_zero() || self.separation_timeout.is_zero() {
            return Err(AudioError::InvalidConfig("stage timeouts must be positive".to_string()));
        }
        if self.separation_timeout < self.classification_timeout {
            return Err(AudioError::InvalidConfig(format!(
                "separation timeout ({}s) must not be shorter than classification timeout ({}s)",
                self.separation_timeout.as_secs(),
                self.classification_timeout.as_secs()
            )));
        }
        if self.simulated_events == 0 || self.spectrum_points == 0 {
            return Err(AudioError::InvalidConfig(
                "simulated events and spectrum points must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let interpreter = "python";
        Self {
            classification_timeout: Duration::from_secs(DEFAULT_CLASSIFICATION_TIMEOUT_SECS),
            separation_timeout: Duration::from_secs(DEFAULT_SEPARATION_TIMEOUT_SECS),
            work_root: Self::default_work_root(),
            stems_dir: PathBuf::from("public/separated_audio"),
            classifier: EngineCommand::script(
                interpreter,
                &PathBuf::from("scripts/mediapipe_audio_classifier.py"),
            ),
            separator: EngineCommand::script(interpreter, &PathBuf::from("scripts/audio_separator.py")),
            simulation_enabled: true,
            simulated_events: DEFAULT_SIMULATED_EVENTS,
            spectrum_points: DEFAULT_SPECTRUM_POINTS,
        }
    }
}
