//! Frame classification.
//!
//! An [`InferenceService`] turns a frame into a free-text description. The
//! crate ships an Ollama vision-model client (feature `ollama`) and a fixed
//! responder for dry runs.

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "ollama")]
pub use ollama::{BlockingOllamaClient, OllamaClient};

use crate::collector::Frame;
use std::collections::VecDeque;

/// Describes what a frame shows.
pub trait InferenceService: Send {
    fn classify(&mut self, frame: &Frame) -> Result<String, InferenceError>;
}

/// Inference error types.
#[derive(Debug)]
pub enum InferenceError {
    /// Configuration error
    Config(String),
    /// Network/HTTP error
    Network(String),
    /// Model server returned an error response
    Server { status: u16, message: String },
    /// Response could not be decoded
    Serialization(String),
    /// The frame cannot be classified
    InvalidFrame(String),
}

impl std::fmt::Display for InferenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InferenceError::Config(msg) => write!(f, "Inference config error: {msg}"),
            InferenceError::Network(msg) => write!(f, "Inference network error: {msg}"),
            InferenceError::Server { status, message } => {
                write!(f, "Inference server error ({status}): {message}")
            }
            InferenceError::Serialization(msg) => {
                write!(f, "Inference serialization error: {msg}")
            }
            InferenceError::InvalidFrame(msg) => write!(f, "Invalid frame: {msg}"),
        }
    }
}

impl std::error::Error for InferenceError {}

/// Returns the same description for every frame.
#[derive(Debug, Clone)]
pub struct FixedInference {
    description: String,
}

impl FixedInference {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

impl InferenceService for FixedInference {
    fn classify(&mut self, _frame: &Frame) -> Result<String, InferenceError> {
        Ok(self.description.clone())
    }
}

/// Plays back a fixed sequence of results, then repeats the fallback.
#[derive(Debug)]
pub struct ScriptedInference {
    script: VecDeque<Result<String, String>>,
    fallback: String,
}

impl ScriptedInference {
    /// `Ok` entries are descriptions; `Err` entries become network errors.
    pub fn new<I>(script: I, fallback: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = Result<String, String>>,
    {
        Self {
            script: script.into_iter().collect(),
            fallback: fallback.into(),
        }
    }

    /// Script made of descriptions only.
    pub fn descriptions<I, S>(descriptions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(descriptions.into_iter().map(|d| Ok(d.into())), "")
    }
}

impl InferenceService for ScriptedInference {
    fn classify(&mut self, _frame: &Frame) -> Result<String, InferenceError> {
        match self.script.pop_front() {
            Some(Ok(description)) => Ok(description),
            Some(Err(message)) => Err(InferenceError::Network(message)),
            None => Ok(self.fallback.clone()),
        }
    }
}
