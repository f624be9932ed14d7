//! Text normalization and coarse similarity shared by the classifier, the
//! cache and the collaboration protocols.

use std::collections::HashSet;

/// Words that carry no topical signal.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "could", "describe", "do",
    "does", "explain", "for", "from", "give", "has", "have", "how", "i", "in", "is", "it", "its",
    "me", "my", "of", "on", "or", "please", "should", "so", "tell", "that", "the", "their",
    "them", "then", "there", "these", "this", "to", "us", "was", "we", "what", "when", "where",
    "which", "who", "why", "will", "with", "would", "you", "your",
];

/// Split text into lowercase alphanumeric tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Lowercase, strip punctuation and collapse whitespace.
pub fn normalize(text: &str) -> String {
    tokenize(text).join(" ")
}

pub fn token_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// Topical keywords: tokens longer than two characters that are not stopwords.
pub fn keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(text)
        .into_iter()
        .filter(|w| w.len() > 2 && !STOPWORDS.contains(&w.as_str()))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

/// Jaccard similarity of two token sets. Two empty sets are identical.
pub fn jaccard_sets(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

/// Jaccard similarity of the word sets of two texts.
pub fn jaccard(a: &str, b: &str) -> f64 {
    jaccard_sets(&token_set(a), &token_set(b))
}

/// Mean pairwise similarity across a set of texts. Fewer than two texts agree trivially.
pub fn mean_pairwise(texts: &[&str]) -> f64 {
    if texts.len() < 2 {
        return 1.0;
    }
    let sets: Vec<HashSet<String>> = texts.iter().map(|t| token_set(t)).collect();
    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..sets.len() {
        for j in (i + 1)..sets.len() {
            total += jaccard_sets(&sets[i], &sets[j]);
            pairs += 1;
        }
    }
    total / pairs as f64
}
