//! Verdict types produced by the consensus engine

use serde::{Deserialize, Serialize};

/// Agreement classification over the currently completed samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictTag {
    /// Nothing has completed yet
    Waiting,
    /// Every completed sample failed
    AllFailed,
    /// Exactly one sample succeeded
    OnlyOneSuccess,
    /// Two answers agree (or at least two pairs agree once all succeeded)
    TwoConsistent,
    /// Exactly two answers, and they disagree
    TwoDifferent,
    /// All k succeeded and all agree
    AllConsistent,
    /// All k succeeded with fewer than two agreeing pairs
    AllDifferent,
    /// Some other partial state, e.g. three of five succeeded
    Uncertain,
}

impl std::fmt::Display for VerdictTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Waiting => "waiting",
            Self::AllFailed => "all_failed",
            Self::OnlyOneSuccess => "only_one_success",
            Self::TwoConsistent => "two_consistent",
            Self::TwoDifferent => "two_different",
            Self::AllConsistent => "all_consistent",
            Self::AllDifferent => "all_different",
            Self::Uncertain => "uncertain",
        };
        write!(f, "{}", s)
    }
}

/// Presentation hint derived from the tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorHint {
    Green,
    Amber,
    Red,
    Neutral,
}

impl ColorHint {
    /// Pure function of the tag and whether samples are still outstanding
    pub fn for_tag(tag: VerdictTag, incomplete: bool) -> Self {
        match tag {
            VerdictTag::AllConsistent => ColorHint::Green,
            VerdictTag::AllFailed | VerdictTag::AllDifferent | VerdictTag::TwoDifferent => {
                ColorHint::Red
            }
            VerdictTag::OnlyOneSuccess | VerdictTag::TwoConsistent => {
                if incomplete {
                    ColorHint::Green
                } else {
                    ColorHint::Amber
                }
            }
            VerdictTag::Waiting | VerdictTag::Uncertain => ColorHint::Neutral,
        }
    }
}

/// Two successful samples whose answers are similar enough to count as a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedPair {
    /// Lower sample index
    pub i: usize,
    /// Higher sample index
    pub j: usize,
    pub similarity: f64,
    /// Comparison text of sample `i`
    pub normalized_answer: String,
}

/// Best answer candidate exposed alongside the verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestAnswer {
    pub text: String,
    /// True when no pair matched and this is just the first success
    pub provisional: bool,
}

/// Classification of agreement across the completed samples.
///
/// Always re-derived from the full sample set, never patched incrementally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusVerdict {
    pub tag: VerdictTag,
    pub color_hint: ColorHint,
    /// Samples in a terminal state
    pub total_seen: usize,
    pub success_count: usize,
    pub failed_count: usize,
    /// Ordered by similarity descending, then by `(i, j)`
    pub matched_pairs: Vec<MatchedPair>,
    pub best_answer: Option<BestAnswer>,
}

impl ConsensusVerdict {
    /// Verdict before any sample has completed
    pub fn waiting() -> Self {
        Self {
            tag: VerdictTag::Waiting,
            color_hint: ColorHint::Neutral,
            total_seen: 0,
            success_count: 0,
            failed_count: 0,
            matched_pairs: Vec::new(),
            best_answer: None,
        }
    }

    /// Every sample failed; the caller should offer a retry
    pub fn is_aggregate_failure(&self) -> bool {
        self.tag == VerdictTag::AllFailed
    }
}
