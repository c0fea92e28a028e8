//! Normalized string similarity and answer-text extraction
//!
//! Similarity is `(maxLen - levenshtein(a, b)) / maxLen` over Unicode scalar
//! values. Callers pass text that is already lower-cased and trimmed;
//! [`comparison_text`] produces exactly that from an [`Answer`].

use std::sync::LazyLock;

use regex::Regex;

use crate::state::Answer;

/// Free-text answer marker: `answer:` or `答案`, up to the end of the sentence.
static ANSWER_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:answer\s*[:：]|答案[:：\s]*)\s*([^。！？\n]+)").unwrap()
});

/// Classic dynamic-programming edit distance with unit costs.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Two rolling rows of the (|a|+1) x (|b|+1) matrix
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j]
            } else {
                1 + prev[j].min(prev[j + 1]).min(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Similarity in `[0, 1]`; two empty strings are identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    let distance = levenshtein(a, b);
    (max_len - distance) as f64 / max_len as f64
}

/// Text used when comparing a sample's answer with the others.
///
/// Structured answers compare on their `answer` field. Free text compares on
/// whatever follows an answer marker, or on the whole text when there is none.
pub fn comparison_text(answer: &Answer) -> String {
    match answer {
        Answer::Structured { answer, .. } => normalize(answer),
        Answer::Text(text) => {
            let marked = ANSWER_MARKER
                .captures(text)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().trim().trim_end_matches(['.', '!', '?']))
                .filter(|s| !s.trim().is_empty());
            match marked {
                Some(extracted) => normalize(extracted),
                None => normalize(text),
            }
        }
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}
