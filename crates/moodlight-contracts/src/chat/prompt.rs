/// Turn delimiters of a chat-tuned model family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    pub user_marker: String,
    pub assistant_marker: String,
    pub end_marker: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::phi3()
    }
}

impl PromptTemplate {
    pub fn phi3() -> Self {
        Self {
            user_marker: "<|user|>".to_string(),
            assistant_marker: "<|assistant|>".to_string(),
            end_marker: "<|end|>".to_string(),
        }
    }

    /// Single user turn followed by the generation marker. The utterance is
    /// passed through verbatim, empty included.
    pub fn build_prompt(&self, utterance: &str) -> String {
        format!(
            "{}\n{}{}\n{}\n",
            self.user_marker, utterance, self.end_marker, self.assistant_marker
        )
    }

    /// Complete user/assistant exchange, as seen by the model at training time.
    pub fn render_exchange(&self, utterance: &str, answer: &str) -> String {
        format!(
            "{}\n{}{}\n{}\n{}{}\n",
            self.user_marker,
            utterance,
            self.end_marker,
            self.assistant_marker,
            answer,
            self.end_marker
        )
    }
}
