use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_CUE_INTENSITY: f64 = 0.5;

/// Structured answer produced by the fine-tuned model for one chat turn.
///
/// Optional fields are skipped on serialization so a parsed response writes
/// back the same set of keys it was read from. An optional key is either
/// absent or holds a value; an explicit `null` is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodResponse {
    pub track: Track,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub lighting: Option<Vec<LightCue>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub narration: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
}

impl MoodResponse {
    pub fn mood_id(&self) -> &str {
        &self.track.mood_id
    }

    pub fn cues(&self) -> &[LightCue] {
        self.lighting.as_deref().unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub mood_id: String,
    pub preview_uri: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightCue {
    pub rgb: [u8; 3],
    pub duration: f64,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f64>,
}

impl LightCue {
    pub fn new(rgb: [u8; 3], duration: f64, intensity: Option<f64>) -> Self {
        Self {
            rgb,
            duration,
            intensity,
        }
    }

    pub fn intensity(&self) -> f64 {
        self.intensity.unwrap_or(DEFAULT_CUE_INTENSITY)
    }
}

/// Valence/arousal hints echoed from training data. Never used for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub valence_hint: Option<f64>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub arousal_hint: Option<f64>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Sum of cue durations, with `1.0` substituted for a zero total.
pub fn cycle_duration(cues: &[LightCue]) -> f64 {
    let total: f64 = cues.iter().map(|cue| cue.duration).sum();
    if total == 0.0 {
        1.0
    } else {
        total
    }
}
