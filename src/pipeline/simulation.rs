use std::io::Cursor;
use hound::WavReader;
use rand::Rng;
use serde_json::{Map, Value};

use crate::errors::{AudioError, AudioResult};
use crate::utils::audio_data_uri;
use super::types::{
    ClassificationResult, CombinedResult, ResultStatus, SoundEvent, SpectrumPoint, StemMap,
    STEM_CATEGORIES,
};

/// Job id reported for every simulated result.
pub const SIMULATION_JOB_ID: &str = "simulation_mode";

/// Event label with a plausible frequency band in Hz.
const EVENT_TYPES: [(&str, f64, f64); 5] = [
    ("Human Voice", 85.0, 3400.0),
    ("Vehicle Sound", 30.0, 1200.0),
    ("Atmospheric Wind", 20.0, 500.0),
    ("Animal Signal", 400.0, 8000.0),
    ("Musical Content", 60.0, 12000.0),
];
const SPEAKERS: [&str; 2] = ["SPEAKER_01", "SPEAKER_02"];

/// Used when the upload is not a readable WAV.
const NOMINAL_DURATION_SECS: f64 = 37.5;
const NOMINAL_SAMPLE_RATE: u32 = 44_100;

const SPECTRUM_BANDWIDTH_HZ: f64 = 20_000.0;
const MAGNITUDE_FLOOR: f64 = 0.1;
const MAGNITUDE_CEILING: f64 = 1.0;

/// Builds a result with the same shape as a real one when the engines fail.
#[derive(Debug, Clone)]
pub struct SimulationGenerator {
    event_count: usize,
    spectrum_points: usize,
}

impl SimulationGenerator {
    pub fn new(event_count: usize, spectrum_points: usize) -> Self {
        Self {
            event_count: event_count.max(1),
            spectrum_points: spectrum_points.max(1),
        }
    }

    /// Every stem slot points at the original audio, since nothing was
    /// actually separated. `reason` ends up in the debug trail.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        audio: &[u8],
        reason: &str,
    ) -> AudioResult<CombinedResult> {
        let (duration, sample_rate) =
            probe_wav(audio).unwrap_or((NOMINAL_DURATION_SECS, NOMINAL_SAMPLE_RATE));

        let audio_ref = audio_data_uri(audio);
        let stems: StemMap = STEM_CATEGORIES
            .iter()
            .map(|category| (category.to_string(), Some(audio_ref.clone())))
            .collect();

        let result = CombinedResult {
            status: ResultStatus::Success,
            job_id: SIMULATION_JOB_ID.to_string(),
            classification: self.classification(rng, duration, sample_rate),
            stems,
            frequency_spectrum: Some(self.spectrum(rng, duration)),
            debug: vec![
                "Backend process failed/timed out.".to_string(),
                "Switched to simulation mode for UI verification.".to_string(),
                reason.to_string(),
            ],
            simulated: true,
        };

        result
            .check_simulated_shape()
            .map_err(AudioError::GeneratorError)?;
        Ok(result)
    }

    fn classification<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        duration: f64,
        sample_rate: u32,
    ) -> ClassificationResult {
        let spacing = duration / self.event_count as f64;
        let sound_events: Vec<SoundEvent> = (0..self.event_count)
            .map(|i| {
                let (kind, low_hz, high_hz) = EVENT_TYPES[rng.gen_range(0..EVENT_TYPES.len())];
                SoundEvent {
                    time: round_to(i as f64 * spacing, 2),
                    frequency: Some(round_to(rng.gen_range(low_hz..high_hz), 1)),
                    amplitude: Some(round_to(rng.gen_range(0.05..1.0), 3)),
                    decibels: round_to(-10.0 - rng.gen::<f64>() * 30.0, 1),
                    kind: kind.to_string(),
                    confidence: round_to(rng.gen_range(0.55..0.99), 4),
                    speaker: Some(SPEAKERS[rng.gen_range(0..SPEAKERS.len())].to_string()),
                    extra: Map::new(),
                }
            })
            .collect();

        let mut extra = Map::new();
        extra.insert("status".to_string(), Value::from("simulated"));
        extra.insert("jobID".to_string(), Value::from(SIMULATION_JOB_ID));

        ClassificationResult {
            duration: Some(round_to(duration, 3)),
            sample_rate: Some(sample_rate),
            detected_sounds: Some(sound_events.len()),
            sound_events,
            extra,
        }
    }

    /// Smooth sine contour plus bounded noise, clipped to a floor so
    /// visualizations never draw an empty series.
    fn spectrum<R: Rng + ?Sized>(&self, rng: &mut R, duration: f64) -> Vec<SpectrumPoint> {
        let step = SPECTRUM_BANDWIDTH_HZ / self.spectrum_points as f64;
        (0..self.spectrum_points)
            .map(|i| {
                let contour = (i as f64 * 0.2).sin() * 0.5 + rng.gen::<f64>() * 0.3;
                SpectrumPoint {
                    frequency: i as f64 * step,
                    magnitude: contour.clamp(MAGNITUDE_FLOOR, MAGNITUDE_CEILING),
                    time: rng.gen::<f64>() * duration,
                }
            })
            .collect()
    }
}

/// Duration and sample rate from a WAV header, if the bytes are one.
fn probe_wav(bytes: &[u8]) -> Option<(f64, u32)> {
    let reader = WavReader::new(Cursor::new(bytes)).ok()?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return None;
    }
    let duration = reader.duration() as f64 / spec.sample_rate as f64;
    (duration > 0.0).then_some((duration, spec.sample_rate))
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
