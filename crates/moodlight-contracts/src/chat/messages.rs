use crate::mood::{MoodResponse, MoodVocabulary};

pub const ANALYZING_STATUS: &str = "🎧 Analyse de votre humeur en cours...";
pub const RENDERING_STATUS: &str = "✨ Génération de l'ambiance...";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Starter {
    pub label: &'static str,
    pub message: &'static str,
}

pub const STARTERS: &[Starter] = &[
    Starter {
        label: "😊 Bonne humeur",
        message: "Je me sens incroyablement positif ce matin et je veux une ambiance solaire",
    },
    Starter {
        label: "😢 Tristesse",
        message: "Je me sens triste ce soir",
    },
    Starter {
        label: "🎉 Euphorie",
        message: "Je suis euphorique après avoir gagné la compétition",
    },
    Starter {
        label: "😌 Détente",
        message: "Je veux dissoudre la fatigue dans un bain chaud",
    },
];

pub fn format_confirmation(response: &MoodResponse, vocabulary: &MoodVocabulary) -> String {
    let mood_id = response.mood_id();
    let narration = response
        .narration
        .as_deref()
        .unwrap_or_else(|| vocabulary.chat_narration(mood_id));
    format!(
        "Ok, j'ai capture ton ambiance {}. {}",
        vocabulary.display_name(mood_id),
        narration
    )
}

pub fn format_turn_error(error: &str) -> String {
    format!("❌ Erreur lors de l'analyse : {error}\n\nVeuillez réessayer avec une autre description.")
}
