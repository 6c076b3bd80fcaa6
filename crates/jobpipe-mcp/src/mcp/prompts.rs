//! Static prompt templates handed back to the client. Nothing here calls a model.

use serde::Serialize;

pub(crate) const SUMMARIZE_LOG: &str = "Summarize the following Jenkins console log. Identify any errors, critical warnings, or the root cause of a failure. Provide a concise summary of the build's outcome:\n\n{log_text}";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub(crate) struct SamplingConfig {
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            top_p: 0.95,
            max_tokens: 1024,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

pub(crate) fn summarize_log_prompt(log_text: &str) -> String {
    SUMMARIZE_LOG.replace("{log_text}", log_text)
}

pub(crate) fn placeholder_summary(path: &str, build_number: u64) -> String {
    format!("LLM summary for '{path}' build #{build_number} would be generated here.")
}
