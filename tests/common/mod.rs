#![allow(dead_code)]

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use forensic_audio_service::config::PipelineConfig;
use forensic_audio_service::engines::EngineCommand;
use hound::{SampleFormat, WavSpec, WavWriter};

/// Engine that runs `script` under `sh -c`; stage arguments become `$1..`.
pub fn sh_engine(script: &str) -> EngineCommand {
    EngineCommand::new("/bin/sh").arg("-c").arg(script).arg("engine")
}

pub fn missing_engine(name: &str) -> EngineCommand {
    EngineCommand::new(format!("/nonexistent/forensic/{}", name))
}

/// Short budgets, isolated directories, engines that do not exist.
pub fn test_config(root: &Path) -> PipelineConfig {
    PipelineConfig {
        classification_timeout: Duration::from_secs(5),
        separation_timeout: Duration::from_secs(10),
        work_root: root.join("work"),
        stems_dir: root.join("stems"),
        classifier: missing_engine("classifier"),
        separator: missing_engine("separator"),
        ..PipelineConfig::default()
    }
}

/// Classifier printing diagnostics around a payload that echoes its job id.
pub const ECHO_CLASSIFIER: &str = r#"echo "--- Running Model ---" >&2
echo "INFO: model loaded"
printf '{"status":"success","jobID":"%s","detectedSounds":1,"soundEvents":[{"time":0.0,"type":"Human Voice","confidence":0.9,"decibels":-12.0}]}\n' "$2"
echo "done""#;

/// Separator that requires a readable handoff file before answering.
pub const HANDOFF_SEPARATOR: &str = r#"grep -q '"soundEvents"' "$4" || { echo "handoff unreadable: $4" >&2; exit 7; }
printf '{"status":"success","stems":{"vocals":"/separated_audio/htdemucs/%s/vocals.wav"},"debug":["handoff %s"]}' "$3" "$(basename "$4")""#;

pub fn wav_bytes(seconds: u32) -> Vec<u8> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut buffer, spec).unwrap();
        for i in 0..8000 * seconds {
            writer.write_sample(((i % 64) as i16 - 32) * 256).unwrap();
        }
        writer.finalize().unwrap();
    }
    buffer.into_inner()
}

/// Every file and directory below `dir`.
pub fn entries(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    if let Ok(read) = std::fs::read_dir(dir) {
        for entry in read.flatten() {
            let path = entry.path();
            if path.is_dir() {
                found.extend(entries(&path));
            }
            found.push(path);
        }
    }
    found
}
