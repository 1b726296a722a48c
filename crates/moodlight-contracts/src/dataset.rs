use std::io::{self, Write};

use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use serde_json::Value;
use thiserror::Error;

use crate::mood::{Diagnostics, LightCue, MoodResponse, MoodVocabulary, Track};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DatasetError {
    #[error("Missing audio preview for moods: {}", .0.join(", "))]
    MissingCatalogEntries(Vec<String>),
    #[error("invalid lighting_script for mood '{mood_id}': {reason}")]
    InvalidLightingScript { mood_id: String, reason: String },
    #[error("train/test split ratio must be within (0, 1), got {0}")]
    InvalidSplitRatio(f64),
}

/// One row of the samples file (`mood_id,user_text`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoodSample {
    pub mood_id: String,
    pub user_text: String,
}

/// One row of the catalog file (`mood_id,file_uri,lighting_script`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub mood_id: String,
    pub file_uri: String,
    pub lighting_script: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedSample {
    pub sample: MoodSample,
    pub entry: CatalogEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingMessage {
    pub role: String,
    pub content: String,
}

/// Left join of samples onto the catalog by `mood_id`.
///
/// A sample whose mood has no catalog entry, or an entry with a blank
/// `file_uri`, fails the whole join; the error lists every such mood once, in
/// order of first appearance.
pub fn join_samples(
    samples: &[MoodSample],
    catalog: &[CatalogEntry],
) -> Result<Vec<JoinedSample>, DatasetError> {
    let mut joined = Vec::with_capacity(samples.len());
    let mut missing: Vec<String> = Vec::new();
    for sample in samples {
        let mut has_preview = false;
        let mut has_blank = false;
        for entry in catalog.iter().filter(|entry| entry.mood_id == sample.mood_id) {
            if entry.file_uri.trim().is_empty() {
                has_blank = true;
                continue;
            }
            has_preview = true;
            joined.push(JoinedSample {
                sample: sample.clone(),
                entry: entry.clone(),
            });
        }
        if (has_blank || !has_preview) && !missing.contains(&sample.mood_id) {
            missing.push(sample.mood_id.clone());
        }
    }
    if !missing.is_empty() {
        return Err(DatasetError::MissingCatalogEntries(missing));
    }
    Ok(joined)
}

pub fn assistant_response(
    row: &JoinedSample,
    vocabulary: &MoodVocabulary,
) -> Result<MoodResponse, DatasetError> {
    let mood_id = row.sample.mood_id.as_str();
    let lighting: Vec<LightCue> = serde_json::from_str(&row.entry.lighting_script).map_err(|err| {
        DatasetError::InvalidLightingScript {
            mood_id: mood_id.to_string(),
            reason: err.to_string(),
        }
    })?;
    let metrics = vocabulary.metrics(mood_id);
    Ok(MoodResponse {
        track: Track {
            mood_id: mood_id.to_string(),
            preview_uri: row.entry.file_uri.clone(),
        },
        lighting: Some(lighting),
        narration: Some(vocabulary.training_narration(mood_id).to_string()),
        diagnostics: Some(Diagnostics {
            valence_hint: Some(metrics.valence),
            arousal_hint: Some(metrics.arousal),
        }),
    })
}

/// Serialized assistant answer for one training row.
///
/// Written with `", "` / `": "` separators and non-ASCII characters escaped as
/// `\uXXXX`, with the catalog's `lighting_script` embedded as written (key
/// order and number spelling preserved).
pub fn training_payload(
    row: &JoinedSample,
    vocabulary: &MoodVocabulary,
) -> Result<String, DatasetError> {
    let response = assistant_response(row, vocabulary)?;
    let invalid = |reason: String| DatasetError::InvalidLightingScript {
        mood_id: row.sample.mood_id.clone(),
        reason,
    };
    let lighting: Value =
        serde_json::from_str(&row.entry.lighting_script).map_err(|err| invalid(err.to_string()))?;
    let payload = TrainingPayload {
        track: &response.track,
        lighting: &lighting,
        narration: response.narration.as_deref().unwrap_or_default(),
        diagnostics: response.diagnostics,
    };
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, AsciiSpacedFormatter);
    payload
        .serialize(&mut serializer)
        .map_err(|err| invalid(err.to_string()))?;
    String::from_utf8(out).map_err(|err| invalid(err.to_string()))
}

pub fn training_messages(
    row: &JoinedSample,
    vocabulary: &MoodVocabulary,
) -> Result<Vec<TrainingMessage>, DatasetError> {
    Ok(vec![
        TrainingMessage {
            role: "user".to_string(),
            content: row.sample.user_text.clone(),
        },
        TrainingMessage {
            role: "assistant".to_string(),
            content: training_payload(row, vocabulary)?,
        },
    ])
}

#[derive(Serialize)]
struct TrainingPayload<'a> {
    track: &'a Track,
    lighting: &'a Value,
    narration: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnostics: Option<Diagnostics>,
}

struct AsciiSpacedFormatter;

impl Formatter for AsciiSpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
                continue;
            }
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{
        join_samples, training_messages, training_payload, CatalogEntry, DatasetError, MoodSample,
    };
    use crate::chat::extract_mood_response;
    use crate::mood::MoodVocabulary;

    fn sample(mood_id: &str, text: &str) -> MoodSample {
        MoodSample {
            mood_id: mood_id.to_string(),
            user_text: text.to_string(),
        }
    }

    fn entry(mood_id: &str) -> CatalogEntry {
        CatalogEntry {
            mood_id: mood_id.to_string(),
            file_uri: format!("gs://moods/audio_previews/{mood_id}.mp3"),
            lighting_script: r#"[{"rgb": [20, 30, 90], "duration": 4.0, "intensity": 0.3}]"#
                .to_string(),
        }
    }

    #[test]
    fn join_pairs_each_sample_with_its_catalog_entry() -> anyhow::Result<()> {
        let joined = join_samples(
            &[sample("tristesse", "Je me sens triste"), sample("detente", "Un bain chaud")],
            &[entry("detente"), entry("tristesse")],
        )?;
        assert_eq!(joined.len(), 2);
        assert_eq!(joined[0].entry.mood_id, "tristesse");
        assert_eq!(joined[1].sample.user_text, "Un bain chaud");
        Ok(())
    }

    #[test]
    fn missing_catalog_entries_are_fatal_and_listed_once() {
        let err = join_samples(
            &[sample("panique", "a"), sample("tristesse", "b"), sample("panique", "c")],
            &[entry("tristesse")],
        )
        .unwrap_err();
        assert_eq!(
            err,
            DatasetError::MissingCatalogEntries(vec!["panique".to_string()])
        );
        assert_eq!(err.to_string(), "Missing audio preview for moods: panique");
    }

    #[test]
    fn blank_file_uri_counts_as_missing_preview() {
        let mut blank = entry("panique");
        blank.file_uri = String::new();
        blank.lighting_script = "[]".to_string();
        let err = join_samples(
            &[sample("panique", "vite"), sample("tristesse", "b")],
            &[blank.clone(), entry("tristesse")],
        )
        .unwrap_err();
        assert_eq!(
            err,
            DatasetError::MissingCatalogEntries(vec!["panique".to_string()])
        );

        let err = join_samples(&[sample("panique", "vite")], &[entry("panique"), blank]).unwrap_err();
        assert_eq!(
            err,
            DatasetError::MissingCatalogEntries(vec!["panique".to_string()])
        );
    }

    #[test]
    fn assistant_message_is_an_extractable_response() -> anyhow::Result<()> {
        let vocabulary = MoodVocabulary::default();
        let joined = join_samples(&[sample("tristesse", "Je me sens triste")], &[entry("tristesse")])?;
        let messages = training_messages(&joined[0], &vocabulary)?;
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].role, "assistant");

        let payload: Value = serde_json::from_str(&messages[1].content)?;
        assert_eq!(payload["diagnostics"], json!({"valence_hint": 0.15, "arousal_hint": 0.3}));
        assert_eq!(
            payload["narration"],
            json!("Halo discret et consolant pour accueillir la tristesse.")
        );

        let wrapped = format!("<|assistant|>{}<|end|>", messages[1].content);
        assert_eq!(extract_mood_response(&wrapped)?.cues().len(), 1);
        Ok(())
    }

    #[test]
    fn payload_keeps_spaced_separators_and_raw_lighting() -> anyhow::Result<()> {
        let joined = join_samples(&[sample("tristesse", "Je me sens triste")], &[entry("tristesse")])?;
        assert_eq!(
            training_payload(&joined[0], &MoodVocabulary::default())?,
            concat!(
                r#"{"track": {"mood_id": "tristesse", "preview_uri": "gs://moods/audio_previews/tristesse.mp3"}, "#,
                r#""lighting": [{"rgb": [20, 30, 90], "duration": 4.0, "intensity": 0.3}], "#,
                r#""narration": "Halo discret et consolant pour accueillir la tristesse.", "#,
                r#""diagnostics": {"valence_hint": 0.15, "arousal_hint": 0.3}}"#
            )
        );
        Ok(())
    }

    #[test]
    fn payload_escapes_non_ascii_and_keeps_cue_spelling() -> anyhow::Result<()> {
        let mut dream = entry("reverie");
        dream.file_uri = "gs://moods/audio_previews/Rêverie.mp3".to_string();
        dream.lighting_script = r#"[{"duration": 6, "rgb": [1, 2, 3], "hue": "🌙"}]"#.to_string();
        let joined = join_samples(&[sample("reverie", "la tête ailleurs")], &[dream])?;
        let payload = training_payload(&joined[0], &MoodVocabulary::default())?;
        assert!(payload.is_ascii());
        assert!(payload.contains(r#""preview_uri": "gs://moods/audio_previews/R\u00eaverie.mp3""#));
        assert!(payload.contains(r#""lighting": [{"duration": 6, "rgb": [1, 2, 3], "hue": "\ud83c\udf19"}]"#));

        let decoded: Value = serde_json::from_str(&payload)?;
        assert_eq!(decoded["track"]["preview_uri"], json!("gs://moods/audio_previews/Rêverie.mp3"));
        Ok(())
    }

    #[test]
    fn unknown_mood_gets_generic_training_values() -> anyhow::Result<()> {
        let joined = join_samples(&[sample("serenite", "calme")], &[entry("serenite")])?;
        let messages = training_messages(&joined[0], &MoodVocabulary::default())?;
        let payload: Value = serde_json::from_str(&messages[1].content)?;
        assert_eq!(payload["narration"], json!("Ambiance personnalisee pour ton humeur."));
        assert_eq!(payload["diagnostics"]["valence_hint"], json!(0.5));
        Ok(())
    }

    #[test]
    fn broken_lighting_script_names_the_mood() -> anyhow::Result<()> {
        let mut bad = entry("colere");
        bad.lighting_script = "not json".to_string();
        let joined = join_samples(&[sample("colere", "grr")], &[bad])?;
        let err = training_messages(&joined[0], &MoodVocabulary::default()).unwrap_err();
        assert!(matches!(err, DatasetError::InvalidLightingScript { ref mood_id, .. } if mood_id == "colere"));
        Ok(())
    }
}
