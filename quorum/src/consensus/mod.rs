//! Consensus voting over partial and complete sample sets
//!
//! # Decision table
//!
//! Evaluated top to bottom over the terminal samples (`total`), of which
//! `ok` succeeded, for a task of `k` samples:
//!
//! ```text
//! total == 0                 -> waiting
//! ok == 0                    -> all_failed
//! ok == 1                    -> only_one_success
//! ok == total == k           -> all_consistent | two_consistent | all_different
//! ok == 2                    -> two_consistent | two_different
//! otherwise                  -> uncertain
//! ```
//!
//! Two answers match when their similarity is above the match threshold
//! (0.8). With every sample successful, at least two matching pairs are
//! needed to avoid `all_different`; `all_consistent` additionally needs one
//! pair above the strong threshold (0.9) and every answer matching the
//! lowest-index answer.

pub mod engine;
pub mod verdict;

pub use engine::{
    classify, ConsensusEngine, DEFAULT_MATCH_THRESHOLD, DEFAULT_STRONG_MATCH_THRESHOLD,
};
pub use verdict::{BestAnswer, ColorHint, ConsensusVerdict, MatchedPair, VerdictTag};
