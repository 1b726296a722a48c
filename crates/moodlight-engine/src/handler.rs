use anyhow::Result;
use moodlight_contracts::audio::AudioSource;
use moodlight_contracts::chat::{
    format_confirmation, format_turn_error, PromptTemplate, ResponseFraming, ANALYZING_STATUS,
    RENDERING_STATUS,
};
use moodlight_contracts::events::{EventPayload, TurnJournal};
use moodlight_contracts::lighting::{encode_overlay_html, render_animation};
use moodlight_contracts::mood::{MoodResponse, MoodVocabulary};
use serde_json::{json, Value};

use crate::audio::AudioResolver;
use crate::error_chain_text;
use crate::inference::{InferenceClient, Prediction};

pub const LIGHTING_ELEMENT_NAME: &str = "ambiance-lighting";
pub const AUDIO_ELEMENT_NAME: &str = "ambiance-audio";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Analyzing,
    Rendering,
    Done,
}

impl TurnState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Analyzing => "analyzing",
            Self::Rendering => "rendering",
            Self::Done => "done",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaElement {
    /// Page-wide HTML overlay (`text/html`).
    Lighting { name: String, html: String },
    Audio {
        name: String,
        source: AudioSource,
        auto_play: bool,
    },
}

impl MediaElement {
    pub fn name(&self) -> &str {
        match self {
            Self::Lighting { name, .. } | Self::Audio { name, .. } => name,
        }
    }
}

/// Handle to a transient status message shown while a turn is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusHandle(pub u64);

/// The conversation UI the handler talks to.
pub trait ChatSurface {
    fn show_status(&mut self, text: &str) -> Result<StatusHandle>;
    fn update_status(&mut self, status: StatusHandle, text: &str) -> Result<()>;
    fn remove_status(&mut self, status: StatusHandle) -> Result<()>;
    fn send_message(&mut self, content: &str, elements: &[MediaElement]) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub turn_id: String,
    /// `Done` on success, `Idle` after a failed turn.
    pub state: TurnState,
    pub message: String,
    pub elements: Vec<MediaElement>,
    pub response: Option<MoodResponse>,
    pub error: Option<String>,
}

/// One chat turn: analyze the mood remotely, then render lighting and audio.
///
/// Holds no per-conversation state; every call to [`handle_message`] is an
/// independent turn and inference failures are never retried.
///
/// [`handle_message`]: MoodChatHandler::handle_message
pub struct MoodChatHandler {
    inference: Box<dyn InferenceClient>,
    audio: AudioResolver,
    vocabulary: MoodVocabulary,
    template: PromptTemplate,
    framing: ResponseFraming,
    journal: Option<TurnJournal>,
}

impl MoodChatHandler {
    pub fn new(inference: Box<dyn InferenceClient>, audio: AudioResolver) -> Self {
        let template = PromptTemplate::default();
        Self {
            inference,
            audio,
            vocabulary: MoodVocabulary::default(),
            framing: ResponseFraming::for_template(&template),
            template,
            journal: None,
        }
    }

    pub fn with_template(mut self, template: PromptTemplate, framing: ResponseFraming) -> Self {
        self.template = template;
        self.framing = framing;
        self
    }

    pub fn with_vocabulary(mut self, vocabulary: MoodVocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    pub fn with_journal(mut self, journal: TurnJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Surface errors propagate; analysis errors are reported to the user
    /// and end the turn back in `Idle`.
    pub fn handle_message(&self, text: &str, surface: &mut dyn ChatSurface) -> Result<TurnOutcome> {
        let turn_id = uuid::Uuid::new_v4().to_string();
        let mut state = TurnState::Idle;
        self.record(&turn_id, "turn_started", json!({"input": text}));

        let status = surface.show_status(ANALYZING_STATUS)?;
        transition(&turn_id, &mut state, TurnState::Analyzing);

        let response = match self.analyze(&turn_id, text) {
            Ok(response) => response,
            Err(err) => {
                let error = error_chain_text(&err, 1024);
                tracing::warn!(turn_id = %turn_id, error = %error, "mood analysis failed");
                surface.remove_status(status)?;
                let message = format_turn_error(&error);
                surface.send_message(&message, &[])?;
                transition(&turn_id, &mut state, TurnState::Idle);
                self.record(&turn_id, "turn_failed", json!({"error": error}));
                return Ok(TurnOutcome {
                    turn_id,
                    state,
                    message,
                    elements: Vec::new(),
                    response: None,
                    error: Some(error),
                });
            }
        };

        surface.update_status(status, RENDERING_STATUS)?;
        transition(&turn_id, &mut state, TurnState::Rendering);

        let elements = self.render_elements(&response);
        surface.remove_status(status)?;
        let message = format_confirmation(&response, &self.vocabulary);
        surface.send_message(&message, &elements)?;
        transition(&turn_id, &mut state, TurnState::Done);

        self.record(
            &turn_id,
            "turn_rendered",
            json!({
                "mood_id": response.mood_id(),
                "cue_count": response.cues().len(),
                "elements": elements.iter().map(MediaElement::name).collect::<Vec<&str>>(),
            }),
        );

        Ok(TurnOutcome {
            turn_id,
            state,
            message,
            elements,
            response: Some(response),
            error: None,
        })
    }

    fn analyze(&self, turn_id: &str, text: &str) -> Result<MoodResponse> {
        let prompt = self.template.build_prompt(text);
        let prediction = self.inference.predict(&prompt)?;
        self.record_prediction(turn_id, &prompt, &prediction);
        Ok(self.framing.extract(&prediction.raw_text)?)
    }

    pub fn render_elements(&self, response: &MoodResponse) -> Vec<MediaElement> {
        let mut elements = Vec::new();
        let html = encode_overlay_html(&render_animation(response.cues()));
        if !html.is_empty() {
            elements.push(MediaElement::Lighting {
                name: LIGHTING_ELEMENT_NAME.to_string(),
                html,
            });
        }
        if let Some(source) = self.audio.resolve(&response.track.preview_uri) {
            elements.push(MediaElement::Audio {
                name: AUDIO_ELEMENT_NAME.to_string(),
                source,
                auto_play: true,
            });
        }
        elements
    }

    fn record_prediction(&self, turn_id: &str, prompt: &str, prediction: &Prediction) {
        let mut payload = prediction.metadata();
        payload.insert("input".to_string(), Value::String(prompt.to_string()));
        payload.insert(
            "output".to_string(),
            Value::String(prediction.raw_text.clone()),
        );
        self.record(turn_id, "inference_completed", Value::Object(payload));
    }

    fn record(&self, turn_id: &str, event_type: &str, payload: Value) {
        let Some(journal) = self.journal.as_ref() else {
            return;
        };
        let payload = match payload {
            Value::Object(map) => map,
            _ => EventPayload::new(),
        };
        if let Err(err) = journal.record(turn_id, event_type, payload) {
            tracing::warn!(event_type, error = %err, "failed to write turn journal");
        }
    }
}

fn transition(turn_id: &str, state: &mut TurnState, next: TurnState) {
    tracing::debug!(turn_id, from = state.as_str(), to = next.as_str(), "turn state");
    *state = next;
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::{bail, Result};
    use moodlight_contracts::audio::{AliasMap, AudioSource};
    use moodlight_contracts::events::TurnJournal;
    use serde_json::{json, Value};

    use super::{
        ChatSurface, MediaElement, MoodChatHandler, StatusHandle, TurnState,
        AUDIO_ELEMENT_NAME, LIGHTING_ELEMENT_NAME,
    };
    use crate::audio::tests::FakeStore;
    use crate::audio::AudioResolver;
    use crate::inference::{InferenceClient, Prediction};

    struct ScriptedEndpoint {
        reply: Result<String, String>,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedEndpoint {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                prompts: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
                prompts: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl InferenceClient for ScriptedEndpoint {
        fn predict(&self, prompt: &str) -> Result<Prediction> {
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(prompt.to_string());
            }
            match &self.reply {
                Ok(text) => Ok(Prediction {
                    raw_text: format!("{prompt}{text}"),
                    model_display_name: Some("moodlight-phi3".to_string()),
                    ..Prediction::default()
                }),
                Err(message) => bail!("{message}"),
            }
        }
    }

    #[derive(Default)]
    struct RecordingSurface {
        log: Vec<String>,
        sent: Vec<(String, Vec<MediaElement>)>,
        next_id: u64,
    }

    impl ChatSurface for RecordingSurface {
        fn show_status(&mut self, text: &str) -> Result<StatusHandle> {
            self.next_id += 1;
            self.log.push(format!("show:{text}"));
            Ok(StatusHandle(self.next_id))
        }

        fn update_status(&mut self, status: StatusHandle, text: &str) -> Result<()> {
            self.log.push(format!("update:{}:{text}", status.0));
            Ok(())
        }

        fn remove_status(&mut self, status: StatusHandle) -> Result<()> {
            self.log.push(format!("remove:{}", status.0));
            Ok(())
        }

        fn send_message(&mut self, content: &str, elements: &[MediaElement]) -> Result<()> {
            self.log.push("send".to_string());
            self.sent.push((content.to_string(), elements.to_vec()));
            Ok(())
        }
    }

    const SAD_REPLY: &str = r#"{"track": {"mood_id": "tristesse", "preview_uri": "gs://moods/audio_previews/Tristess.mp3"}, "lighting": [{"rgb": [40, 60, 140], "duration": 6.0, "intensity": 0.3}]}}<|end|>"#;

    fn handler(endpoint: ScriptedEndpoint, store: FakeStore) -> MoodChatHandler {
        MoodChatHandler::new(
            Box::new(endpoint),
            AudioResolver::new(Arc::new(store), AliasMap::bundled()),
        )
    }

    #[test]
    fn sad_message_renders_confirmation_lighting_and_audio() -> Result<()> {
        let store = FakeStore::default().with_object("moods/audio_previews/Tristesse.mp3", b"mp3");
        let endpoint = ScriptedEndpoint::replying(SAD_REPLY);
        let prompts = endpoint.prompts.clone();
        let handler = handler(endpoint, store);
        let mut surface = RecordingSurface::default();

        let outcome = handler.handle_message("Je me sens triste ce soir", &mut surface)?;

        assert_eq!(outcome.state, TurnState::Done);
        assert_eq!(
            outcome.message,
            "Ok, j'ai capture ton ambiance tristesse. Halo discret et consolant pour accueillir la tristesse."
        );
        assert_eq!(
            prompts.lock().map(|rows| rows.clone()).unwrap_or_default(),
            vec!["<|user|>\nJe me sens triste ce soir<|end|>\n<|assistant|>\n".to_string()]
        );
        let names: Vec<&str> = outcome.elements.iter().map(MediaElement::name).collect();
        assert_eq!(names, vec![LIGHTING_ELEMENT_NAME, AUDIO_ELEMENT_NAME]);
        assert!(matches!(
            &outcome.elements[1],
            MediaElement::Audio { source: AudioSource::Bytes { data, .. }, auto_play: true, .. } if data == b"mp3"
        ));
        assert_eq!(
            surface.log,
            vec![
                "show:🎧 Analyse de votre humeur en cours...".to_string(),
                "update:1:✨ Génération de l'ambiance...".to_string(),
                "remove:1".to_string(),
                "send".to_string(),
            ]
        );
        assert_eq!(surface.sent[0].1.len(), 2);
        Ok(())
    }

    #[test]
    fn missing_audio_blob_attaches_only_lighting() -> Result<()> {
        let handler = handler(ScriptedEndpoint::replying(SAD_REPLY), FakeStore::default());
        let mut surface = RecordingSurface::default();
        let outcome = handler.handle_message("Je me sens triste ce soir", &mut surface)?;
        assert_eq!(outcome.state, TurnState::Done);
        assert_eq!(outcome.elements.len(), 1);
        assert_eq!(outcome.elements[0].name(), LIGHTING_ELEMENT_NAME);
        Ok(())
    }

    #[test]
    fn unknown_mood_without_lighting_still_confirms() -> Result<()> {
        let reply = r#"{"track": {"mood_id": "zen", "preview_uri": ""}}<|end|>"#;
        let handler = handler(ScriptedEndpoint::replying(reply), FakeStore::default());
        let mut surface = RecordingSurface::default();
        let outcome = handler.handle_message("calme plat", &mut surface)?;
        assert_eq!(
            outcome.message,
            "Ok, j'ai capture ton ambiance zen. Ambiance personnalisee en cours, laisse-toi porter."
        );
        assert!(outcome.elements.is_empty());
        Ok(())
    }

    #[test]
    fn endpoint_failure_returns_to_idle_with_error_message() -> Result<()> {
        let handler = handler(ScriptedEndpoint::failing("403 Forbidden"), FakeStore::default());
        let mut surface = RecordingSurface::default();
        let outcome = handler.handle_message("Je me sens triste ce soir", &mut surface)?;

        assert_eq!(outcome.state, TurnState::Idle);
        assert!(outcome.response.is_none());
        assert!(outcome.message.starts_with("❌ Erreur lors de l'analyse : 403 Forbidden"));
        assert_eq!(surface.log, vec!["show:🎧 Analyse de votre humeur en cours...", "remove:1", "send"]);
        assert!(surface.sent[0].1.is_empty());
        Ok(())
    }

    #[test]
    fn unparseable_reply_surfaces_extraction_error() -> Result<()> {
        let handler = handler(ScriptedEndpoint::replying("I feel you."), FakeStore::default());
        let mut surface = RecordingSurface::default();
        let outcome = handler.handle_message("bof", &mut surface)?;
        assert_eq!(outcome.state, TurnState::Idle);
        assert_eq!(outcome.error.as_deref(), Some("no assistant segment found"));
        Ok(())
    }

    #[test]
    fn journal_records_turn_lifecycle() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let handler = handler(ScriptedEndpoint::replying(SAD_REPLY), FakeStore::default())
            .with_journal(TurnJournal::new(&path, "session-1"));
        let mut surface = RecordingSurface::default();
        let outcome = handler.handle_message("Je me sens triste ce soir", &mut surface)?;

        let events: Vec<Value> = std::fs::read_to_string(&path)?
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        let types: Vec<&str> = events
            .iter()
            .filter_map(|event| event["type"].as_str())
            .collect();
        assert_eq!(types, vec!["turn_started", "inference_completed", "turn_rendered"]);
        assert!(events.iter().all(|event| event["turn_id"] == json!(outcome.turn_id)));
        assert_eq!(events[1]["model_display_name"], json!("moodlight-phi3"));
        assert_eq!(events[2]["mood_id"], json!("tristesse"));
        Ok(())
    }
}
