use indexmap::IndexMap;

pub const CHAT_FALLBACK_NARRATION: &str = "Ambiance personnalisee en cours, laisse-toi porter.";
pub const TRAINING_FALLBACK_NARRATION: &str = "Ambiance personnalisee pour ton humeur.";
pub const FALLBACK_METRICS: MoodMetrics = MoodMetrics {
    valence: 0.5,
    arousal: 0.5,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoodMetrics {
    pub valence: f64,
    pub arousal: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoodEntry {
    pub id: String,
    pub display_name: String,
    pub narration: String,
    pub metrics: MoodMetrics,
}

/// Closed set of mood ids the model was trained on.
///
/// Lookups never fail: unknown ids are echoed back as their own display name
/// and paired with the generic narrations.
#[derive(Debug, Clone)]
pub struct MoodVocabulary {
    moods: IndexMap<String, MoodEntry>,
}

impl Default for MoodVocabulary {
    fn default() -> Self {
        Self::new(None)
    }
}

impl MoodVocabulary {
    pub fn new(moods: Option<IndexMap<String, MoodEntry>>) -> Self {
        Self {
            moods: moods.unwrap_or_else(default_moods),
        }
    }

    pub fn get(&self, mood_id: &str) -> Option<&MoodEntry> {
        self.moods.get(mood_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.moods.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.moods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moods.is_empty()
    }

    pub fn display_name<'a>(&'a self, mood_id: &'a str) -> &'a str {
        self.get(mood_id)
            .map(|entry| entry.display_name.as_str())
            .unwrap_or(mood_id)
    }

    pub fn chat_narration(&self, mood_id: &str) -> &str {
        self.get(mood_id)
            .map(|entry| entry.narration.as_str())
            .unwrap_or(CHAT_FALLBACK_NARRATION)
    }

    pub fn training_narration(&self, mood_id: &str) -> &str {
        self.get(mood_id)
            .map(|entry| entry.narration.as_str())
            .unwrap_or(TRAINING_FALLBACK_NARRATION)
    }

    pub fn metrics(&self, mood_id: &str) -> MoodMetrics {
        self.get(mood_id)
            .map(|entry| entry.metrics)
            .unwrap_or(FALLBACK_METRICS)
    }
}

fn default_moods() -> IndexMap<String, MoodEntry> {
    let mut map = IndexMap::new();

    let mut insert = |id: &str, display: &str, narration: &str, valence: f64, arousal: f64| {
        map.insert(
            id.to_string(),
            MoodEntry {
                id: id.to_string(),
                display_name: display.to_string(),
                narration: narration.to_string(),
                metrics: MoodMetrics { valence, arousal },
            },
        );
    };

    insert(
        "bonnehumeur",
        "bonne humeur",
        "Ambiance solaire et detendue pour entretenir cette bonne humeur.",
        0.9,
        0.4,
    );
    insert(
        "curiosite",
        "curiosite",
        "Mouvement malicieux et lumineux pour soutenir ta curiosite.",
        0.6,
        0.6,
    );
    insert(
        "detente",
        "detente",
        "Ondes bleutees et calmes pour prolonger ta detente.",
        0.7,
        0.3,
    );
    insert(
        "euphorie",
        "euphorie",
        "Flux explosif et lumineux qui accompagne ton euphorie.",
        0.95,
        0.85,
    );
    insert(
        "reverie",
        "reverie",
        "Atmosphere suspendue propice a la reverie cosmique.",
        0.5,
        0.45,
    );
    insert(
        "victoire",
        "victoire",
        "Eclat victorieux pour celebrer cette reussite.",
        0.85,
        0.75,
    );
    insert(
        "colere",
        "colere",
        "Cadence intense pour canaliser et relacher la colere.",
        0.2,
        0.8,
    );
    insert(
        "inquietude",
        "inquietude",
        "Pulsations feutrees pour apprivoiser cette inquietude.",
        0.35,
        0.55,
    );
    insert(
        "nostalgie",
        "nostalgie",
        "Teintes sepie et rythme doux pour ta nostalgie.",
        0.5,
        0.35,
    );
    insert(
        "panique",
        "panique",
        "Impacts rapides pour te guider dans la panique.",
        0.1,
        0.95,
    );
    insert(
        "suspense",
        "suspense",
        "Texture feutree pour soutenir le suspense qui monte.",
        0.4,
        0.6,
    );
    insert(
        "tristesse",
        "tristesse",
        "Halo discret et consolant pour accueillir la tristesse.",
        0.15,
        0.3,
    );

    map
}
