//! Text tokenization shared by the support classifier and memory clustering.

use hashbrown::HashSet;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "onto", "then", "than", "was",
    "were", "are", "has", "had", "have", "its", "but", "not", "all", "any", "some", "near", "when",
    "after", "before", "there", "their", "they", "them", "what", "which", "while", "will", "would",
    "been", "being", "also", "just", "only", "very", "over", "under", "upon", "each", "per",
];

/// Lowercase alphanumeric words, in order.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_lowercase())
        .collect()
}

pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Up to `limit` distinct content words (length >= 3, not a stopword, not a
/// bare number), in first-occurrence order.
pub fn extract(text: &str, limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for w in tokenize(text) {
        if out.len() >= limit {
            break;
        }
        if w.len() < 3 || is_stopword(&w) || w.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if seen.insert(w.clone()) {
            out.push(w);
        }
    }
    out
}

/// Jaccard similarity of two keyword sets. Two empty sets are dissimilar.
pub fn jaccard(a: &[String], b: &[String]) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let sa: HashSet<&str> = a.iter().map(String::as_str).collect();
    let sb: HashSet<&str> = b.iter().map(String::as_str).collect();
    let inter = sa.intersection(&sb).count();
    let union = sa.union(&sb).count();
    if union == 0 {
        0.0
    } else {
        inter as f32 / union as f32
    }
}
