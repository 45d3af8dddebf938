use std::collections::BTreeMap;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Stem slots every result exposes.
pub const STEM_CATEGORIES: [&str; 6] = ["vocals", "background", "vehicles", "footsteps", "animals", "wind"];

/// Stem URL per category; `None` (serialized as `null`) marks a slot the
/// separation engine left empty.
pub type StemMap = BTreeMap<String, Option<String>>;

/// Adds an empty slot for every known category the engine did not report.
pub fn complete_stem_slots(mut stems: StemMap) -> StemMap {
    for category in STEM_CATEGORIES {
        stems.entry(category.to_string()).or_insert(None);
    }
    stems
}

/// One detected sound. Fields the engine does not emit default to empty;
/// fields this crate does not know are carried in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundEvent {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amplitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub decibels: f64,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Output of the classification stage, and the handoff artifact read by
/// the separation stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_opt_f64")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_opt_count")]
    pub sample_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_opt_count")]
    pub detected_sounds: Option<usize>,
    #[serde(default)]
    pub sound_events: Vec<SoundEvent>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Output of the separation stage: stem category to audio URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeparationResult {
    #[serde(default)]
    pub stems: StemMap,
    #[serde(default)]
    pub debug: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultStatus {
    Success,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumPoint {
    pub frequency: f64,
    pub magnitude: f64,
    pub time: f64,
}

/// The single response contract, real or simulated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedResult {
    pub status: ResultStatus,
    #[serde(rename = "jobID")]
    pub job_id: String,
    pub classification: ClassificationResult,
    pub stems: StemMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_spectrum: Option<Vec<SpectrumPoint>>,
    #[serde(default)]
    pub debug: Vec<String>,
    #[serde(default)]
    pub simulated: bool,
}

impl CombinedResult {
    /// Checks the shape a simulated result promises to consumers.
    pub fn check_simulated_shape(&self) -> Result<(), String> {
        if let Some(missing) = STEM_CATEGORIES.iter().find(|c| self.stems.get(**c).map_or(true, Option::is_none)) {
            return Err(format!("stem category `{}` missing", missing));
        }
        if self.classification.sound_events.is_empty() {
            return Err("no sound events".to_string());
        }
        if self.frequency_spectrum.as_ref().map_or(true, Vec::is_empty) {
            return Err("empty frequency spectrum".to_string());
        }
        if self.debug.is_empty() {
            return Err("debug trail missing".to_string());
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

impl NumberOrText {
    fn into_f64<E: de::Error>(self) -> Result<f64, E> {
        match self {
            NumberOrText::Number(n) => Ok(n),
            NumberOrText::Text(s) => s.trim().parse().map_err(E::custom),
        }
    }
}

/// Accepts numbers and numeric strings; some engines format times as text.
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    NumberOrText::deserialize(deserializer)?.into_f64()
}

fn lenient_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<NumberOrText>::deserialize(deserializer)?
        .map(|value| value.into_f64::<D::Error>())
        .transpose()
}

/// Counts and rates; numpy-backed engines emit them as `16000.0`.
fn lenient_opt_count<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
{
    let Some(n) = lenient_opt_f64(deserializer)? else {
        return Ok(None);
    };
    if n < 0.0 || n.fract() != 0.0 || n > u64::MAX as f64 {
        return Err(de::Error::custom(format!("expected a whole non-negative number, got {}", n)));
    }
    T::try_from(n as u64)
        .map(Some)
        .map_err(|_| de::Error::custom(format!("{} is out of range", n)))
}
