use std::sync::Arc;

use tracing::warn;

use lookbook_core::call::{guarded, CallPolicy};
use lookbook_core::traits::{GenerationOptions, ReasoningProvider};
use lookbook_core::types::FusedResult;

use crate::prompt::summary_prompt;

pub const SUMMARY_OPTIONS: GenerationOptions = GenerationOptions { temperature: 0.7, max_output_tokens: 200 };

pub const NO_RESULTS_MESSAGE: &str = "I couldn't find any products matching your query. Please try a different search.";

pub fn found_message(count: usize) -> String {
    format!("I found {} products matching your query. Check out the results below!", count)
}

/// Writes the assistant message shown above the results. Never fails.
pub struct Summarizer {
    provider: Option<Arc<dyn ReasoningProvider>>,
    policy: CallPolicy,
}

impl Summarizer {
    pub fn new(provider: Option<Arc<dyn ReasoningProvider>>, policy: CallPolicy) -> Self {
        Self { provider, policy }
    }

    pub async fn summarize(&self, query_text: &str, results: &[FusedResult]) -> String {
        if results.is_empty() {
            return NO_RESULTS_MESSAGE.to_string();
        }
        let Some(provider) = self.provider.as_ref() else {
            return found_message(results.len());
        };
        let prompt = summary_prompt(query_text, results);
        match guarded("summary", self.policy, || provider.generate(&prompt, SUMMARY_OPTIONS)).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => found_message(results.len()),
            Err(e) => {
                warn!(error = %e, "summary generation failed");
                found_message(results.len())
            }
        }
    }
}
