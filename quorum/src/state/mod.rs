//! Task and sample state
//!
//! Plain data shared by the dispatcher, the consensus engine, the controller
//! and the history store.

pub mod types;

pub use types::{
    Answer, HistorySnapshot, ImagePayload, SampleResult, SampleState, Task, TaskId, MAX_SAMPLES,
    MIN_SAMPLES,
};
