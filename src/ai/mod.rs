//! AI integration module.
//!
//! A uniform gateway over an OpenAI-compatible chat completion API, used for
//! request decomposition, tool selection, argument synthesis, result
//! explanation and direct answers.
//!
//! The gateway never interprets content; [`capabilities`] builds the prompts
//! and parses model output leniently.

pub mod capabilities;
mod openai;

pub use openai::OpenAICompatibleGateway;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

/// Lazy, finite, non-restartable sequence of text fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = anyhow::Result<String>> + Send>>;

/// Sampling behaviour for a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sampling {
    /// Provider defaults
    #[default]
    Default,
    /// Temperature 0, for reproducible selection and synthesis
    Deterministic,
}

impl Sampling {
    /// Temperature to send, if any.
    pub fn temperature(self) -> Option<f32> {
        match self {
            Self::Default => None,
            Self::Deterministic => Some(0.0),
        }
    }
}

/// One system + user prompt pair.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// System prompt
    pub system: String,
    /// User prompt
    pub user: String,
    /// Sampling behaviour
    pub sampling: Sampling,
}

impl CompletionRequest {
    /// Create a request with default sampling.
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self { system: system.into(), user: user.into(), sampling: Sampling::Default }
    }

    /// Use deterministic sampling.
    pub fn deterministic(mut self) -> Self {
        self.sampling = Sampling::Deterministic;
        self
    }
}

/// Trait for completion providers.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Single request/response completion.
    async fn complete(&self, request: CompletionRequest) -> anyhow::Result<String>;

    /// Streaming completion.
    async fn complete_streaming(
        &self,
        request: CompletionRequest,
    ) -> anyhow::Result<FragmentStream>;
}

/// AI error types.
#[derive(Debug, thiserror::Error)]
pub enum AIError {
    #[error("API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("No response from AI")]
    NoResponse,
}
