//! Ollama vision-model client.
//!
//! Sends each frame to a local Ollama server's `/api/chat` endpoint and
//! returns the model's free-text answer.

use crate::collector::Frame;
use crate::config::InferenceConfig;
use crate::inference::{InferenceError, InferenceService};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
    images: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    num_gpu: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Async Ollama client.
pub struct OllamaClient {
    config: InferenceConfig,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(config: InferenceConfig) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| InferenceError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Describe a frame.
    pub async fn describe(&self, frame: &Frame) -> Result<String, InferenceError> {
        if !frame.is_jpeg() {
            return Err(InferenceError::InvalidFrame(format!(
                "frame {} is not JPEG encoded",
                frame.sequence
            )));
        }

        let image = base64::engine::general_purpose::STANDARD.encode(&frame.jpeg[..]);
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &self.config.prompt,
                images: vec![image],
            }],
            stream: false,
            options: self.config.num_gpu.map(|num_gpu| ChatOptions { num_gpu }),
        };

        let response = self
            .client
            .post(self.config.chat_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| InferenceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(InferenceError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Serialization(e.to_string()))?;

        Ok(chat.message.content)
    }
}

/// Blocking Ollama client for the inference thread.
pub struct BlockingOllamaClient {
    inner: OllamaClient,
    runtime: tokio::runtime::Runtime,
}

impl BlockingOllamaClient {
    pub fn new(config: InferenceConfig) -> Result<Self, InferenceError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| InferenceError::Config(format!("Failed to create runtime: {e}")))?;

        Ok(Self {
            inner: OllamaClient::new(config)?,
            runtime,
        })
    }

    pub fn config(&self) -> &InferenceConfig {
        self.inner.config()
    }
}

impl InferenceService for BlockingOllamaClient {
    fn classify(&mut self, frame: &Frame) -> Result<String, InferenceError> {
        self.runtime.block_on(self.inner.describe(frame))
    }
}
