//! Task intent classification.
//!
//! The decomposer asks an [`IntentClassifier`] for a task type whenever a
//! segment has no recognised action verb. Two implementations exist:
//!
//! | Classifier | Latency | Requires |
//! |------------|---------|----------|
//! | [`KeywordIntentClassifier`] | <1ms | nothing |
//! | [`LlmIntentClassifier`] | bounded by its timeout | an [`LlmProvider`](crate::llm::LlmProvider) |
//!
//! The LLM classifier always degrades to the keyword classifier.

mod keyword;
mod llm;
mod patterns;
mod types;

pub use keyword::{KeywordIntentClassifier, extract_topics};
pub use llm::{LlmIntentClassifier, classify_intent_with_llm};
pub(crate) use patterns::STOP_WORDS;
pub use types::{DetectionSource, TaskIntent};

/// Classifies free text into a task intent.
///
/// Implementations must not fail; an unknown intent is reported as
/// [`TaskType::General`](crate::models::TaskType::General).
pub trait IntentClassifier: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Classifies the text.
    fn classify(&self, text: &str) -> TaskIntent;
}
