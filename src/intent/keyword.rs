//! Keyword-based task intent detection.
//!
//! Fast, pattern-based detection using regex signals. No I/O.

use super::IntentClassifier;
use super::patterns::{INTENT_PRIORITY, INTENT_SIGNALS, IntentSignal, STOP_WORDS};
use super::types::{DetectionSource, TaskIntent};
use crate::models::TaskType;

/// Deterministic classifier over the static signal table.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordIntentClassifier;

impl KeywordIntentClassifier {
    /// Creates a classifier.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Detects task intent from text using keyword pattern matching.
    ///
    /// Returns `None` when no signal matches.
    #[must_use]
    pub fn detect(&self, text: &str) -> Option<TaskIntent> {
        if text.trim().is_empty() {
            return None;
        }

        let mut matched_signals: Vec<(&IntentSignal, String)> = Vec::new();
        for signal in INTENT_SIGNALS.iter() {
            if let Some(matched) = signal.pattern.find(text) {
                matched_signals.push((signal, matched.as_str().to_lowercase()));
            }
        }

        if matched_signals.is_empty() {
            return None;
        }

        let task_type = determine_primary_intent(&matched_signals);
        let confidence = calculate_confidence(&matched_signals, task_type);
        let keywords: Vec<String> = matched_signals.into_iter().map(|(_, m)| m).collect();

        Some(TaskIntent {
            task_type,
            confidence,
            keywords,
            topics: extract_topics(text),
            source: DetectionSource::Keyword,
        })
    }
}

impl IntentClassifier for KeywordIntentClassifier {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn classify(&self, text: &str) -> TaskIntent {
        self.detect(text).unwrap_or_else(|| TaskIntent {
            topics: extract_topics(text),
            ..TaskIntent::default()
        })
    }
}

/// Picks the task type with the most matching signals, ties broken by
/// [`INTENT_PRIORITY`].
fn determine_primary_intent(matched_signals: &[(&IntentSignal, String)]) -> TaskType {
    let count = |task_type: TaskType| {
        matched_signals
            .iter()
            .filter(|(s, _)| s.task_type == task_type)
            .count()
    };

    let mut best = TaskType::General;
    let mut best_count = 0;
    for task_type in INTENT_PRIORITY {
        let n = count(task_type);
        if n > best_count {
            best = task_type;
            best_count = n;
        }
    }
    best
}

#[allow(clippy::cast_precision_loss)]
fn calculate_confidence(matched_signals: &[(&IntentSignal, String)], winner: TaskType) -> f32 {
    let base_confidence: f32 = 0.5;
    let agreeing = matched_signals
        .iter()
        .filter(|(s, _)| s.task_type == winner)
        .count();
    let competing = matched_signals.len() - agreeing;

    // Bonus for agreeing signals (max +0.3)
    let agreement_bonus = 0.3_f32.min(agreeing as f32 * 0.15);
    // Penalty for signals pointing elsewhere (max -0.2)
    let competition_penalty = 0.2_f32.min(competing as f32 * 0.05);

    (base_confidence + agreement_bonus - competition_penalty).clamp(0.1, 0.95)
}

/// Extracts up to five lowercase topics from text.
///
/// Topics are significant words: at least three characters, not a stop
/// word, not purely numeric.
pub fn extract_topics(text: &str) -> Vec<String> {
    let mut topics = Vec::with_capacity(5);

    for word in text.split(|c: char| c.is_whitespace() || c == ',' || c == ';' || c == ':') {
        if word.is_empty() {
            continue;
        }

        let cleaned = word
            .trim_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '_')
            .to_lowercase();

        if cleaned.len() < 3 {
            continue;
        }
        if STOP_WORDS.contains(cleaned.as_str()) {
            continue;
        }
        if cleaned.chars().all(char::is_numeric) {
            continue;
        }
        if topics.contains(&cleaned) {
            continue;
        }

        topics.push(cleaned);

        if topics.len() >= 5 {
            break;
        }
    }

    topics
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("fix the login bug", TaskType::Fix; "fix")]
    #[test_case("add unit tests for the parser", TaskType::Test; "unit tests")]
    #[test_case("refactor the AuthService", TaskType::Refactor; "refactor")]
    #[test_case("update the README docs", TaskType::Document; "docs")]
    #[test_case("configure the CI environment variables", TaskType::Configure; "configure")]
    #[test_case("implement a rate limiter", TaskType::Create; "create")]
    #[test_case("upgrade the http client", TaskType::Modify; "modify")]
    #[test_case("show me all the classes", TaskType::Analyze; "show")]
    fn test_detect(text: &str, expected: TaskType) {
        let intent = KeywordIntentClassifier::new().detect(text).unwrap();
        assert_eq!(intent.task_type, expected);
        assert_eq!(intent.source, DetectionSource::Keyword);
        assert!(intent.confidence >= 0.5);
    }

    #[test]
    fn test_no_signal_returns_none() {
        assert!(KeywordIntentClassifier::new().detect("the auth module").is_none());
        assert!(KeywordIntentClassifier::new().detect("   ").is_none());
    }

    #[test]
    fn test_classify_falls_back_to_general() {
        let intent = KeywordIntentClassifier::new().classify("the auth module");
        assert_eq!(intent.task_type, TaskType::General);
        assert_eq!(intent.source, DetectionSource::Unmatched);
        assert_eq!(intent.topics, vec!["auth".to_string(), "module".to_string()]);
    }

    #[test]
    fn test_more_signals_win_over_priority() {
        // Two test signals against one fix signal.
        let intent = KeywordIntentClassifier::new()
            .detect("write integration tests covering the error path")
            .unwrap();
        assert_eq!(intent.task_type, TaskType::Test);
    }

    #[test]
    fn test_extract_topics() {
        let topics = extract_topics("How do I implement authentication with JWT tokens?");
        assert!(topics.contains(&"implement".to_string()));
        assert!(topics.contains(&"authentication".to_string()));
        assert!(topics.contains(&"jwt".to_string()));
        assert!(!topics.contains(&"how".to_string()));
    }

    #[test]
    fn test_extract_topics_limit_and_dedup() {
        let topics = extract_topics("alpha beta gamma alpha delta epsilon zeta eta");
        assert_eq!(topics.len(), 5);
        assert_eq!(topics[0], "alpha");
        assert_eq!(topics[1], "beta");
    }
}
