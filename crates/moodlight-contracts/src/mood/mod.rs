mod response;
mod vocabulary;

pub use response::{cycle_duration, Diagnostics, LightCue, MoodResponse, Track, DEFAULT_CUE_INTENSITY};
pub use vocabulary::{
    MoodEntry, MoodMetrics, MoodVocabulary, CHAT_FALLBACK_NARRATION, FALLBACK_METRICS,
    TRAINING_FALLBACK_NARRATION,
};
