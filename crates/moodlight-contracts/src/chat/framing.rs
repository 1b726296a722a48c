use thiserror::Error;

use super::prompt::PromptTemplate;
use crate::mood::MoodResponse;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("no assistant segment found")]
    SegmentNotFound,
    #[error("malformed JSON: {0}")]
    MalformedJson(String),
}

/// What to do with a segment whose closing braces outnumber its opening ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BraceRepair {
    /// Drop the final character once. A second surplus brace is left alone.
    DropOneTrailing,
    None,
}

/// Locates the assistant answer inside a generated transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFraming {
    pub start_marker: String,
    pub end_marker: String,
    pub brace_repair: BraceRepair,
}

impl Default for ResponseFraming {
    fn default() -> Self {
        Self::for_template(&PromptTemplate::default())
    }
}

impl ResponseFraming {
    pub fn for_template(template: &PromptTemplate) -> Self {
        Self {
            start_marker: template.assistant_marker.clone(),
            end_marker: template.end_marker.clone(),
            brace_repair: BraceRepair::DropOneTrailing,
        }
    }

    pub fn with_brace_repair(mut self, brace_repair: BraceRepair) -> Self {
        self.brace_repair = brace_repair;
        self
    }

    /// Text between the first start marker and the next end marker, trimmed.
    pub fn segment<'a>(&self, generated_text: &'a str) -> Option<&'a str> {
        let start = generated_text.find(&self.start_marker)? + self.start_marker.len();
        let rest = &generated_text[start..];
        let end = rest.find(&self.end_marker)?;
        Some(rest[..end].trim())
    }

    pub fn wrap(&self, body: &str) -> String {
        format!("{}{}{}", self.start_marker, body, self.end_marker)
    }

    pub fn repair(&self, segment: &str) -> String {
        let mut candidate = segment.to_string();
        if self.brace_repair == BraceRepair::DropOneTrailing
            && candidate.matches('}').count() > candidate.matches('{').count()
        {
            candidate.pop();
        }
        candidate
    }

    pub fn extract(&self, generated_text: &str) -> Result<MoodResponse, ExtractionError> {
        let segment = self
            .segment(generated_text)
            .ok_or(ExtractionError::SegmentNotFound)?;
        let candidate = self.repair(segment);
        serde_json::from_str::<MoodResponse>(&candidate)
            .map_err(|err| ExtractionError::MalformedJson(err.to_string()))
    }
}

pub fn extract_mood_response(generated_text: &str) -> Result<MoodResponse, ExtractionError> {
    ResponseFraming::default().extract(generated_text)
}
