//! Consensus engine
//!
//! Classifies agreement across whatever subset of samples has completed.
//! The verdict depends only on the set of terminal samples, never on the
//! order they arrived in: successes are sorted by index before comparison.

use tracing::debug;

use crate::similarity::{comparison_text, similarity};
use crate::state::SampleResult;

use super::verdict::{BestAnswer, ColorHint, ConsensusVerdict, MatchedPair, VerdictTag};

/// Default similarity above which two answers match
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.8;

/// Default similarity above which a match counts as strong
pub const DEFAULT_STRONG_MATCH_THRESHOLD: f64 = 0.9;

/// Pure classifier over sample sets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsensusEngine {
    match_threshold: f64,
    strong_match_threshold: f64,
}

impl Default for ConsensusEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD, DEFAULT_STRONG_MATCH_THRESHOLD)
    }
}

/// A successful sample reduced to what the classifier compares
struct Candidate<'a> {
    index: usize,
    text: String,
    sample: &'a SampleResult,
}

impl ConsensusEngine {
    pub fn new(match_threshold: f64, strong_match_threshold: f64) -> Self {
        Self {
            match_threshold,
            strong_match_threshold,
        }
    }

    pub fn match_threshold(&self) -> f64 {
        self.match_threshold
    }

    pub fn strong_match_threshold(&self) -> f64 {
        self.strong_match_threshold
    }

    /// Classify the terminal subset of `results` for a task of `k` samples.
    ///
    /// Pending and running entries are ignored.
    pub fn classify(&self, results: &[SampleResult], k: usize) -> ConsensusVerdict {
        let completed: Vec<&SampleResult> = results.iter().filter(|r| r.is_terminal()).collect();
        let total = completed.len();

        let mut successes: Vec<Candidate<'_>> = completed
            .iter()
            .filter(|r| r.is_success())
            .map(|r| Candidate {
                index: r.index,
                text: r.answer.as_ref().map(comparison_text).unwrap_or_default(),
                sample: r,
            })
            .collect();
        successes.sort_by_key(|c| c.index);

        let ok = successes.len();
        let failed = total - ok;
        let incomplete = total < k;

        let matched_pairs = if ok >= 2 {
            self.matched_pairs(&successes)
        } else {
            Vec::new()
        };

        let tag = if total == 0 {
            VerdictTag::Waiting
        } else if ok == 0 {
            VerdictTag::AllFailed
        } else if ok == 1 {
            VerdictTag::OnlyOneSuccess
        } else if ok == total && total == k {
            self.classify_full(&successes, &matched_pairs)
        } else if ok == 2 {
            // The only pair is the one that decides
            if matched_pairs.is_empty() {
                VerdictTag::TwoDifferent
            } else {
                VerdictTag::TwoConsistent
            }
        } else {
            VerdictTag::Uncertain
        };

        let best_answer = best_answer(&matched_pairs, &successes);

        debug!(
            tag = %tag,
            total,
            ok,
            failed,
            k,
            matches = matched_pairs.len(),
            "Classified sample set"
        );

        ConsensusVerdict {
            tag,
            color_hint: ColorHint::for_tag(tag, incomplete),
            total_seen: total,
            success_count: ok,
            failed_count: failed,
            matched_pairs,
            best_answer,
        }
    }

    /// All k samples succeeded.
    ///
    /// A 2-vs-1 split yields a single matching pair and therefore
    /// `AllDifferent`: there is no majority rule, only the two-pair rule.
    fn classify_full(&self, successes: &[Candidate<'_>], matched: &[MatchedPair]) -> VerdictTag {
        if matched.len() < 2 {
            return VerdictTag::AllDifferent;
        }

        let has_strong = matched
            .iter()
            .any(|m| m.similarity > self.strong_match_threshold);
        let first = &successes[0].text;
        let all_near_first = successes
            .iter()
            .all(|c| similarity(&c.text, first) > self.match_threshold);

        if has_strong && all_near_first {
            VerdictTag::AllConsistent
        } else {
            VerdictTag::TwoConsistent
        }
    }

    fn matched_pairs(&self, successes: &[Candidate<'_>]) -> Vec<MatchedPair> {
        let mut pairs = Vec::new();
        for (a, left) in successes.iter().enumerate() {
            for right in &successes[a + 1..] {
                let score = similarity(&left.text, &right.text);
                if score > self.match_threshold {
                    pairs.push(MatchedPair {
                        i: left.index,
                        j: right.index,
                        similarity: score,
                        normalized_answer: left.text.clone(),
                    });
                }
            }
        }
        pairs.sort_by(|x, y| {
            y.similarity
                .total_cmp(&x.similarity)
                .then(x.i.cmp(&y.i))
                .then(x.j.cmp(&y.j))
        });
        pairs
    }
}

fn best_answer(matched: &[MatchedPair], successes: &[Candidate<'_>]) -> Option<BestAnswer> {
    if let Some(top) = matched.first() {
        return Some(BestAnswer {
            text: top.normalized_answer.clone(),
            provisional: false,
        });
    }
    successes.first().and_then(|c| {
        c.sample.answer.as_ref().map(|a| BestAnswer {
            text: a.display_text().to_string(),
            provisional: true,
        })
    })
}

/// Classify with the default thresholds
pub fn classify(results: &[SampleResult], k: usize) -> ConsensusVerdict {
    ConsensusEngine::default().classify(results, k)
}
