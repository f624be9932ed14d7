use crate::similarity::{keywords, normalize, token_set, tokenize};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const RELEVANCE_WEIGHT: f64 = 0.4;
const COMPLETENESS_WEIGHT: f64 = 0.35;
const CONSISTENCY_WEIGHT: f64 = 0.25;

/// Relevance assumed when the prompt has no topical keywords to check against.
const NEUTRAL_RELEVANCE: f64 = 0.75;

/// Completeness multiplier for answers that stop mid-sentence.
const TRUNCATION_FACTOR: f64 = 0.85;

/// Phrases that mark a refusal or a leaked provider error.
const REFUSAL_MARKERS: &[&str] = &[
    "i cannot",
    "i can't",
    "i am unable",
    "i'm unable",
    "as an ai",
    "i'm sorry",
    "i apologize",
    "error:",
    "internal server error",
];

/// Multi-dimensional quality of one response, every dimension in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub relevance: f64,
    pub completeness: f64,
    pub consistency: f64,
    pub composite: f64,
}

/// Scores responses against the prompt that produced them.
#[derive(Debug, Clone)]
pub struct QualityScorer {
    /// Word count at which completeness saturates.
    pub saturation_words: usize,
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self {
            saturation_words: 40,
        }
    }
}

impl QualityScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn score(&self, prompt: &str, response: &str) -> QualityScore {
        let trimmed = response.trim();
        if trimmed.is_empty() {
            return QualityScore::default();
        }

        let relevance = relevance(prompt, trimmed);
        let completeness = self.completeness(trimmed);
        let consistency = consistency(trimmed);
        let composite = (RELEVANCE_WEIGHT * relevance
            + COMPLETENESS_WEIGHT * completeness
            + CONSISTENCY_WEIGHT * consistency)
            .clamp(0.0, 1.0);

        QualityScore {
            relevance,
            completeness,
            consistency,
            composite,
        }
    }

    fn completeness(&self, response: &str) -> f64 {
        let words = tokenize(response).len();
        let saturation = (words as f64 / self.saturation_words.max(1) as f64).min(1.0);
        let terminated = response
            .chars()
            .last()
            .is_some_and(|c| matches!(c, '.' | '!' | '?' | '`' | ')' | '"' | '*'));
        if terminated {
            saturation
        } else {
            saturation * TRUNCATION_FACTOR
        }
    }
}

fn relevance(prompt: &str, response: &str) -> f64 {
    let wanted = keywords(prompt);
    if wanted.is_empty() {
        return NEUTRAL_RELEVANCE;
    }
    let present = token_set(response);
    let hits = wanted.iter().filter(|k| present.contains(*k)).count();
    hits as f64 / wanted.len() as f64
}

fn consistency(response: &str) -> f64 {
    let sentences: Vec<String> = response
        .split(['.', '!', '?', '\n'])
        .map(normalize)
        .filter(|s| !s.is_empty())
        .collect();

    let mut score = if sentences.is_empty() {
        1.0
    } else {
        let unique: HashSet<&String> = sentences.iter().collect();
        unique.len() as f64 / sentences.len() as f64
    };

    let lower = response.to_lowercase();
    for marker in REFUSAL_MARKERS {
        if lower.contains(marker) {
            score *= 0.5;
        }
    }
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_response_scores_zero() {
        let q = QualityScorer::new().score("Explain caching", "   ");
        assert_eq!(q, QualityScore::default());
    }

    #[test]
    fn test_relevant_complete_answer_scores_high() {
        let answer = "A caching strategy decides what to keep close to the consumer. \
            Write-through caching updates the cache and the backing store together, \
            while write-back defers the store update. Pick eviction by access pattern: \
            LRU for recency, LFU for frequency, and always bound entries with a TTL.";
        let q = QualityScorer::new().score("Explain caching strategy", answer);
        assert_eq!(q.relevance, 1.0);
        assert_eq!(q.completeness, 1.0);
        assert_eq!(q.consistency, 1.0);
        assert!((q.composite - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_off_topic_answer_loses_relevance() {
        let q = QualityScorer::new().score("Explain caching strategy", "Bananas are yellow.");
        assert_eq!(q.relevance, 0.0);
        assert!(q.composite < 0.35);
    }

    #[test]
    fn test_truncated_answer_penalized() {
        let scorer = QualityScorer {
            saturation_words: 4,
        };
        let done = scorer.score("x", "one two three four.");
        let cut = scorer.score("x", "one two three four");
        assert_eq!(done.completeness, 1.0);
        assert!((cut.completeness - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_repetition_and_refusals_hurt_consistency() {
        let scorer = QualityScorer::new();
        let repeated = scorer.score("x", "Same line. Same line. Same line. Other line.");
        assert!((repeated.consistency - 0.5).abs() < 1e-9);
        let refusal = scorer.score("x", "I'm sorry, I cannot help with that.");
        assert!(refusal.consistency <= 0.25);
    }

    #[test]
    fn test_dimensions_bounded() {
        let scorer = QualityScorer::new();
        for text in ["?", "a", "error: error: error:", "ok.\n\n\nok."] {
            let q = scorer.score("debug the crash", text);
            for v in [q.relevance, q.completeness, q.consistency, q.composite] {
                assert!((0.0..=1.0).contains(&v), "{text:?} -> {q:?}");
            }
        }
    }
}
