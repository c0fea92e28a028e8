//! OpenAI-compatible vision adapter implementing the inference port

use async_trait::async_trait;
use quorum::{Answer, ImagePayload, InferenceError, InferencePort};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::VisionEndpointConfig;
use crate::reply::parse_reply;

/// Instruction sent with every image
pub const DEFAULT_PROMPT: &str = r#"You are an expert at answering exam questions across all subjects.
Read the question in the image and answer it directly. Do not output reasoning, observations, markup tokens or code fences.

- Fill-in-the-blank: give only the exact word, term or number that fills the blank.
- Multiple choice: give the option letter followed by its content, e.g. "B.2".
- Calculation: give the final value, with units where applicable.
- Short answer: state the key point concisely.

Output a single JSON object and nothing else:
{"question": "<the question>", "answer": "<the answer>"}"#;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Vision model reached over HTTP
pub struct HttpVisionPort {
    config: VisionEndpointConfig,
    prompt: String,
    http: reqwest::Client,
}

impl HttpVisionPort {
    pub fn new(config: VisionEndpointConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            config,
            prompt: DEFAULT_PROMPT.to_string(),
            http,
        })
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn config(&self) -> &VisionEndpointConfig {
        &self.config
    }

    async fn request(&self, image: &ImagePayload) -> Result<String, InferenceError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text { text: &self.prompt },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image.data_url(),
                        },
                    },
                ],
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let mut builder = self.http.post(self.config.completions_url()).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| InferenceError::Provider(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, model = %self.config.model, "Vision API error");
            return Err(InferenceError::Provider(format!(
                "vision API error ({}): {}",
                status, body
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Provider(format!("Failed to parse response: {}", e)))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| InferenceError::Provider("no choices in response".to_string()))
    }
}

#[async_trait]
impl InferencePort for HttpVisionPort {
    async fn infer(&self, image: &ImagePayload) -> Result<Answer, InferenceError> {
        let content = self.request(image).await?;
        debug!(
            model = %self.config.model,
            chars = content.chars().count(),
            "Vision reply received"
        );
        parse_reply(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = ChatRequest {
            model: "glm-4v-plus",
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text { text: "prompt" },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: ImagePayload::jpeg("AAAA").data_url(),
                        },
                    },
                ],
            }],
            temperature: 0.4,
            max_tokens: 256,
        };

        let json = serde_json::to_value(&request).unwrap();
        let parts = &json["messages"][0]["content"];
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(
            parts[1]["image_url"]["url"],
            "data:image/jpeg;base64,AAAA"
        );
    }
}
