mod framing;
mod messages;
mod prompt;

pub use framing::{extract_mood_response, BraceRepair, ExtractionError, ResponseFraming};
pub use messages::{
    format_confirmation, format_turn_error, Starter, ANALYZING_STATUS, RENDERING_STATUS, STARTERS,
};
pub use prompt::PromptTemplate;
