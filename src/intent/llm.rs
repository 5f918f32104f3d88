//! LLM-based task intent classification with a timeout.
//!
//! The model is consulted on a helper thread and abandoned when the budget
//! elapses; the keyword classifier answers in that case and whenever the model
//! errors or is unsure.

use super::IntentClassifier;
use super::keyword::KeywordIntentClassifier;
use super::types::{DetectionSource, TaskIntent};
use crate::Result;
use crate::llm::{LlmProvider, classify_task_intent};
use crate::models::TaskType;
use std::sync::{Arc, mpsc};
use std::time::Duration;

/// Classifies task intent using an LLM provider.
///
/// # Errors
///
/// Returns an error if the LLM call fails or response parsing fails.
pub fn classify_intent_with_llm<P: LlmProvider + ?Sized>(
    provider: &P,
    text: &str,
) -> Result<TaskIntent> {
    let reply = classify_task_intent(provider, text)?;
    let task_type = TaskType::parse(&reply.label).unwrap_or(TaskType::General);

    Ok(TaskIntent {
        task_type,
        confidence: reply.confidence.clamp(0.0, 1.0),
        keywords: Vec::new(),
        topics: reply.topics,
        source: DetectionSource::Llm,
    })
}

/// Intent classifier backed by an LLM, falling back to keywords.
pub struct LlmIntentClassifier {
    provider: Arc<dyn LlmProvider>,
    timeout: Duration,
    min_confidence: f32,
    fallback: KeywordIntentClassifier,
}

impl LlmIntentClassifier {
    /// Creates a classifier with the given budget.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>, timeout: Duration) -> Self {
        Self {
            provider,
            timeout,
            min_confidence: 0.5,
            fallback: KeywordIntentClassifier::new(),
        }
    }

    /// Sets the minimum confidence at which the model's label is trusted.
    #[must_use]
    pub const fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Runs LLM classification with a timeout.
    ///
    /// On timeout the helper thread keeps running until its HTTP request
    /// completes; its result is discarded.
    fn run_llm_with_timeout(&self, text: &str) -> Option<TaskIntent> {
        let (tx, rx) = mpsc::channel();
        let provider = Arc::clone(&self.provider);
        let text = text.to_string();
        let parent_span = tracing::Span::current();

        metrics::counter!("intent_llm_started").increment(1);

        std::thread::spawn(move || {
            let _parent = parent_span.enter();
            let span = tracing::info_span!("intent.llm", provider = provider.name());
            let _guard = span.enter();
            let result = classify_intent_with_llm(provider.as_ref(), &text);
            // If receiver dropped (timeout), send will fail silently - this is expected
            let _ = tx.send(result);
        });

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(intent)) => {
                metrics::counter!("intent_llm_completed", "status" => "success").increment(1);
                Some(intent)
            },
            Ok(Err(e)) => {
                metrics::counter!("intent_llm_completed", "status" => "error").increment(1);
                tracing::debug!(error = %e, "LLM intent classification failed");
                None
            },
            Err(mpsc::RecvTimeoutError::Timeout) => {
                metrics::counter!("intent_llm_timeout_total", "reason" => "timeout").increment(1);
                metrics::counter!("intent_llm_completed", "status" => "timeout").increment(1);
                tracing::debug!(
                    timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                    "LLM intent classification timed out"
                );
                None
            },
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                metrics::counter!("intent_llm_timeout_total", "reason" => "disconnected")
                    .increment(1);
                metrics::counter!("intent_llm_completed", "status" => "disconnected").increment(1);
                None
            },
        }
    }
}

impl IntentClassifier for LlmIntentClassifier {
    fn name(&self) -> &'static str {
        "llm"
    }

    fn classify(&self, text: &str) -> TaskIntent {
        match self.run_llm_with_timeout(text) {
            Some(intent) if intent.confidence >= self.min_confidence => intent,
            _ => self.fallback.classify(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubProvider {
        response: &'static str,
        delay: Duration,
    }

    impl LlmProvider for StubProvider {
        fn name(&self) -> &'static str {
            "stub"
        }

        fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            std::thread::sleep(self.delay);
            Ok(self.response.to_string())
        }
    }

    fn classifier(response: &'static str, delay_ms: u64, timeout_ms: u64) -> LlmIntentClassifier {
        LlmIntentClassifier::new(
            Arc::new(StubProvider {
                response,
                delay: Duration::from_millis(delay_ms),
            }),
            Duration::from_millis(timeout_ms),
        )
    }

    #[test]
    fn test_classify_intent_with_llm_maps_fields() {
        let provider = StubProvider {
            response: r#"{"intent_type": "refactor", "confidence": 0.8, "topics": ["auth", "login"]}"#,
            delay: Duration::ZERO,
        };
        let result = classify_intent_with_llm(&provider, "tidy up the auth code").unwrap();
        assert_eq!(result.task_type, TaskType::Refactor);
        assert!((result.confidence - 0.8).abs() < f32::EPSILON);
        assert_eq!(result.topics, vec!["auth", "login"]);
        assert_eq!(result.source, DetectionSource::Llm);
    }

    #[test]
    fn test_llm_label_used_when_confident() {
        let c = classifier(r#"{"intent_type": "document", "confidence": 0.9}"#, 0, 2_000);
        let intent = c.classify("the auth module");
        assert_eq!(intent.task_type, TaskType::Document);
        assert_eq!(intent.source, DetectionSource::Llm);
    }

    #[test]
    fn test_low_confidence_falls_back_to_keywords() {
        let c = classifier(r#"{"intent_type": "document", "confidence": 0.2}"#, 0, 2_000);
        let intent = c.classify("fix the login bug");
        assert_eq!(intent.task_type, TaskType::Fix);
        assert_eq!(intent.source, DetectionSource::Keyword);
    }

    #[test]
    fn test_timeout_falls_back_to_keywords() {
        let c = classifier(r#"{"intent_type": "document", "confidence": 0.9}"#, 500, 20);
        let intent = c.classify("fix the login bug");
        assert_eq!(intent.task_type, TaskType::Fix);
        assert_eq!(intent.source, DetectionSource::Keyword);
    }

    #[test]
    fn test_invalid_json_falls_back_to_keywords() {
        let c = classifier("no idea", 0, 2_000);
        assert_eq!(c.classify("refactor auth").task_type, TaskType::Refactor);
    }
}
