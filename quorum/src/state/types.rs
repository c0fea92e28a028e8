//! Core types for multi-sample inference tasks
//!
//! A task owns one image and k independent samples. Samples are created
//! pending, marked running when dispatch starts and then settle exactly once.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::consensus::ConsensusVerdict;

/// Smallest number of samples a task may request
pub const MIN_SAMPLES: usize = 1;

/// Largest number of samples a task may request
pub const MAX_SAMPLES: usize = 5;

/// Opaque task identity token.
///
/// The generation is issued by the controller and increases with every
/// submitted task; the controller compares it at the delivery boundary to
/// decide whether a task is still current.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId {
    generation: u64,
    token: uuid::Uuid,
}

impl TaskId {
    /// Create a task id for the given generation
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            token: uuid::Uuid::new_v4(),
        }
    }

    /// Generation number assigned at submission
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}-{}", self.generation, self.token.simple())
    }
}

/// Transmittable image payload produced by the capture/preprocessing side.
///
/// The core never looks inside; it is only cloned into each inference call
/// and into the persisted snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePayload {
    /// Base64-encoded image bytes
    data: String,
    /// MIME type of the encoded image
    media_type: String,
}

impl ImagePayload {
    /// Wrap an already-encoded payload
    pub fn new(data: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            media_type: media_type.into(),
        }
    }

    /// JPEG payload, the format the capture pipeline produces
    pub fn jpeg(data: impl Into<String>) -> Self {
        Self::new(data, "image/jpeg")
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// An empty payload means capture produced nothing usable
    pub fn is_empty(&self) -> bool {
        self.data.trim().is_empty()
    }

    /// `data:` URL form used by chat-style vision APIs
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

/// Answer returned by the inference port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    /// The provider followed the `{question, answer}` contract
    Structured { question: String, answer: String },
    /// Anything else the provider said
    Text(String),
}

impl Answer {
    pub fn structured(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Answer::Structured {
            question: question.into(),
            answer: answer.into(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Answer::Text(text.into())
    }

    /// Human-facing answer text, trimmed but otherwise untouched
    pub fn display_text(&self) -> &str {
        match self {
            Answer::Structured { answer, .. } => answer.trim(),
            Answer::Text(text) => text.trim(),
        }
    }
}

/// Lifecycle state of a single sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleState {
    /// Created, call not issued yet
    Pending,
    /// Call issued, waiting on the provider
    Running,
    /// Provider returned an answer
    Succeeded,
    /// Provider failed or the per-call timer won the race
    Failed,
}

impl SampleState {
    /// Whether the sample has settled
    pub fn is_terminal(&self) -> bool {
        matches!(self, SampleState::Succeeded | SampleState::Failed)
    }
}

/// One of the k independent inference calls of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleResult {
    /// 1-based, unique and stable within the task
    pub index: usize,
    pub state: SampleState,
    pub answer: Option<Answer>,
    pub error: Option<String>,
    pub elapsed_ms: Option<u64>,
}

impl SampleResult {
    /// Create a pending sample
    pub fn pending(index: usize) -> Self {
        Self {
            index,
            state: SampleState::Pending,
            answer: None,
            error: None,
            elapsed_ms: None,
        }
    }

    /// Pending → running. Has no effect once the sample left pending.
    pub fn mark_running(&mut self) {
        if self.state == SampleState::Pending {
            self.state = SampleState::Running;
        }
    }

    /// Record a success. Returns false if the sample had already settled.
    pub fn succeed(&mut self, answer: Answer, elapsed_ms: u64) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = SampleState::Succeeded;
        self.answer = Some(answer);
        self.elapsed_ms = Some(elapsed_ms);
        true
    }

    /// Record a failure. Returns false if the sample had already settled.
    pub fn fail(&mut self, error: impl Into<String>, elapsed_ms: u64) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = SampleState::Failed;
        self.error = Some(error.into());
        self.elapsed_ms = Some(elapsed_ms);
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_success(&self) -> bool {
        self.state == SampleState::Succeeded
    }
}

/// One end-to-end request for k samples over one image
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub created_at: DateTime<Utc>,
    /// Number of samples, within `MIN_SAMPLES..=MAX_SAMPLES`
    pub k: usize,
    pub image: ImagePayload,
}

impl Task {
    pub fn new(id: TaskId, k: usize, image: ImagePayload) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            k,
            image,
        }
    }

    /// Fresh result board with every sample pending
    pub fn pending_results(&self) -> Vec<SampleResult> {
        (1..=self.k).map(SampleResult::pending).collect()
    }
}

/// What gets written to the history store, at most once per task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub task_id: TaskId,
    pub image: ImagePayload,
    pub results: Vec<SampleResult>,
    pub verdict: ConsensusVerdict,
    /// Task creation time
    pub created_at: DateTime<Utc>,
    /// False when taken from the early-success path before settlement
    pub complete: bool,
}

impl HistorySnapshot {
    pub fn new(
        task: &Task,
        results: &[SampleResult],
        verdict: &ConsensusVerdict,
        complete: bool,
    ) -> Self {
        Self {
            task_id: task.id.clone(),
            image: task.image.clone(),
            results: results.to_vec(),
            verdict: verdict.clone(),
            created_at: task.created_at,
            complete,
        }
    }
}
