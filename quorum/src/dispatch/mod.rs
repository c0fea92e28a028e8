//! Parallel dispatch of k inference samples
//!
//! The inference port is the only boundary to the outside world: anything
//! that turns an [`ImagePayload`] into an [`Answer`] can drive the core.

pub mod dispatcher;

use std::sync::Arc;

use async_trait::async_trait;

use crate::state::{Answer, ImagePayload};

pub use dispatcher::{DispatchEvent, InferenceDispatcher, DEFAULT_PER_CALL_TIMEOUT};

/// Per-sample failure. Recorded on the sample, never escalated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InferenceError {
    /// Transport, HTTP or provider-side failure
    #[error("provider error: {0}")]
    Provider(String),

    /// The per-call timer won the race
    #[error("inference timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },

    /// The call ended without reporting back (e.g. it panicked)
    #[error("inference call aborted: {0}")]
    Aborted(String),
}

/// Result type for inference calls
pub type InferenceResult<T> = Result<T, InferenceError>;

/// External inference service.
///
/// Implementations own provider request shapes, authentication and markup
/// stripping; the core only sees the resulting [`Answer`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InferencePort: Send + Sync {
    async fn infer(&self, image: &ImagePayload) -> InferenceResult<Answer>;
}

/// Shared reference to an inference port
pub type SharedInferencePort = Arc<dyn InferencePort>;
