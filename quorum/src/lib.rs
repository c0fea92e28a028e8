//! Multi-sample inference with consensus voting
//!
//! One image is sent to an inference service k times in parallel. As samples
//! complete, the answers are compared pairwise and classified into a verdict
//! the caller can show immediately; the final verdict arrives once every
//! sample settled. Each task stores at most one history snapshot.
//!
//! # Modules
//!
//! - [`state`]: tasks, samples, answers and history snapshots
//! - [`similarity`]: answer normalization and Levenshtein similarity
//! - [`consensus`]: the verdict decision table
//! - [`dispatch`]: the inference port and parallel fan-out with timeouts
//! - [`controller`]: task lifecycle, supersession and the soft deadline
//! - [`persistence`]: history stores and the at-most-once save gate
//! - [`events`]: lifecycle events over a broadcast bus
//! - [`config`]: defaults, TOML and environment overrides

pub mod config;
pub mod consensus;
pub mod controller;
pub mod dispatch;
pub mod events;
pub mod persistence;
pub mod similarity;
pub mod state;

pub use config::{ConfigError, QuorumConfig};
pub use consensus::{ConsensusEngine, ConsensusVerdict, VerdictTag};
pub use controller::{
    ControllerError, LiveFeed, LiveUpdate, TaskController, TaskHandle, TaskOutcome,
};
pub use dispatch::{InferenceError, InferencePort, SharedInferencePort};
pub use events::{EventBus, QuorumEvent};
pub use persistence::{
    HistoryStore, InMemoryHistoryStore, JsonlHistoryStore, PersistenceError, SharedHistoryStore,
};
pub use state::{Answer, HistorySnapshot, ImagePayload, SampleResult, TaskId};
