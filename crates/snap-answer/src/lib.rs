//! Photo question answering on top of the `quorum` consensus core
//!
//! - [`provider`]: OpenAI-compatible vision endpoint as an inference port
//! - [`reply`]: cleaning model output into answers
//! - [`image`]: loading image files into payloads
//! - [`config`]: endpoint settings from the environment
//! - [`report`]: terminal rendering of live updates and history

pub mod config;
pub mod image;
pub mod provider;
pub mod reply;
pub mod report;

pub use config::VisionEndpointConfig;
pub use provider::HttpVisionPort;
