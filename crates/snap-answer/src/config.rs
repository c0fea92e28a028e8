//! Vision endpoint configuration

use std::time::Duration;

/// Default OpenAI-compatible base URL
pub const DEFAULT_VISION_URL: &str = "http://localhost:8080/v1";

/// Default vision model name
pub const DEFAULT_VISION_MODEL: &str = "glm-4v-plus";

/// Sampling temperature; non-zero so that samples are independent draws
pub const DEFAULT_TEMPERATURE: f32 = 0.4;

/// Connection endpoint for the vision model
#[derive(Debug, Clone)]
pub struct VisionEndpointConfig {
    /// Base URL; `/chat/completions` is appended
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Transport-level timeout, kept above the per-call timeout of the core
    pub request_timeout: Duration,
}

impl Default for VisionEndpointConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("SNAP_VISION_URL").unwrap_or_else(|_| DEFAULT_VISION_URL.into()),
            model: std::env::var("SNAP_VISION_MODEL")
                .unwrap_or_else(|_| DEFAULT_VISION_MODEL.into()),
            api_key: std::env::var("SNAP_VISION_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: 1024,
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl VisionEndpointConfig {
    /// Endpoint for the given base URL and model, without reading the environment
    pub fn new(url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            model: model.into(),
            api_key: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: 1024,
            request_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Full chat completions URL
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.url.trim_end_matches('/'))
    }
}
