//! OpenAI-compatible chat completion API.
//!
//! Works with OpenAI itself and with compatible services such as DeepSeek.

use std::collections::VecDeque;

use async_trait::async_trait;
use eventsource_stream::{Event, EventStream, Eventsource};
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{AIError, CompletionGateway, CompletionRequest, FragmentStream};
use crate::core::CompletionConfig;

/// OpenAI-compatible completion provider.
pub struct OpenAICompatibleGateway {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAICompatibleGateway {
    /// Create a provider from configuration.
    pub fn new(config: &CompletionConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Use a specific model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Share an existing HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn body(&self, request: &CompletionRequest, stream: bool) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage { role: "system".to_string(), content: request.system.clone() },
                ChatMessage { role: "user".to_string(), content: request.user.clone() },
            ],
            temperature: request.sampling.temperature(),
            stream,
        }
    }

    async fn send(&self, body: &ChatRequest) -> anyhow::Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AIError::ApiError { status, body }.into());
        }

        Ok(response)
    }
}

#[async_trait]
impl CompletionGateway for OpenAICompatibleGateway {
    async fn complete(&self, request: CompletionRequest) -> anyhow::Result<String> {
        tracing::debug!(model = %self.model, sampling = ?request.sampling, "Completion request");

        let response: ChatResponse = self.send(&self.body(&request, false)).await?.json().await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AIError::NoResponse.into())
    }

    async fn complete_streaming(
        &self,
        request: CompletionRequest,
    ) -> anyhow::Result<FragmentStream> {
        tracing::debug!(model = %self.model, "Streaming completion request");

        let response = self.send(&self.body(&request, true)).await?;
        Ok(fragments_from_sse(response.bytes_stream()))
    }
}

struct StreamState<S> {
    events: std::pin::Pin<Box<EventStream<S>>>,
    pending: VecDeque<String>,
    done: bool,
}

impl<S> StreamState<S> {
    fn absorb(&mut self, event: &Event) -> anyhow::Result<()> {
        let data = event.data.trim();
        if data.is_empty() {
            return Ok(());
        }
        if data == "[DONE]" {
            self.done = true;
            return Ok(());
        }

        let chunk: ChatChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!(error = %e, data, "Skipping unparsable stream chunk");
                return Ok(());
            }
        };

        if let Some(error) = chunk.error {
            self.done = true;
            return Err(AIError::StreamError(error.message).into());
        }

        self.pending.extend(
            chunk
                .choices
                .into_iter()
                .filter_map(|c| c.delta.content)
                .filter(|text| !text.is_empty()),
        );
        Ok(())
    }
}

/// Turn a chat-completions event stream body into text fragments.
///
/// Nothing is read from `body` until the returned stream is polled.
pub(crate) fn fragments_from_sse<S, B, E>(body: S) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let state =
        StreamState { events: Box::pin(body.eventsource()), pending: VecDeque::new(), done: false };

    let stream = futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(text) = state.pending.pop_front() {
                return Some((Ok(text), state));
            }
            if state.done {
                return None;
            }

            let event = match state.events.next().await {
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(anyhow::Error::new(e)), state));
                }
                None => return None,
            };

            if let Err(e) = state.absorb(&event) {
                return Some((Err(e), state));
            }
        }
    });

    Box::pin(stream)
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
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

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn config() -> CompletionConfig {
        CompletionConfig {
            api_key: "sk-test".to_string(),
            base_url: "https://api.deepseek.com/".to_string(),
            model: "deepseek-chat".to_string(),
        }
    }

    fn body(chunks: &[&str]) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> + Send {
        let chunks: Vec<_> = chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect();
        stream::iter(chunks)
    }

    async fn collect(stream: FragmentStream) -> Vec<Result<String, String>> {
        stream.map(|r| r.map_err(|e| e.to_string())).collect().await
    }

    #[test]
    fn test_request_body_shape() {
        let gateway = OpenAICompatibleGateway::new(&config()).with_model("deepseek-reasoner");
        assert_eq!(gateway.base_url, "https://api.deepseek.com");

        let plain = gateway.body(&CompletionRequest::new("s", "u"), false);
        let json = serde_json::to_value(&plain).unwrap();
        assert_eq!(json["model"], "deepseek-reasoner");
        assert_eq!(json["messages"][0]["role"], "system");
        assert!(json.get("temperature").is_none());
        assert!(json.get("stream").is_none());

        let streaming = gateway.body(&CompletionRequest::new("s", "u").deterministic(), true);
        let json = serde_json::to_value(&streaming).unwrap();
        assert_eq!(json["temperature"], 0.0);
        assert_eq!(json["stream"], true);
    }

    #[tokio::test]
    async fn test_fragments_follow_deltas_until_done() {
        let stream = fragments_from_sse(body(&[
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"北京\"}}]}\n\ndata: {\"choi",
            "ces\":[{\"delta\":{\"content\":\"今天晴\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        ]));

        let fragments = collect(stream).await;
        assert_eq!(fragments, vec![Ok("北京".to_string()), Ok("今天晴".to_string())]);
    }

    #[tokio::test]
    async fn test_fragments_without_done_marker() {
        let stream = fragments_from_sse(body(&[
            ": keep-alive\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\r\n\r\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"unterminated\"}}]}",
        ]));

        let fragments = collect(stream).await;
        assert_eq!(fragments, vec![Ok("a".to_string()), Ok("b".to_string())]);
    }

    #[tokio::test]
    async fn test_multibyte_fragment_split_across_chunks() {
        let event = "data: {\"choices\":[{\"delta\":{\"content\":\"天气\"}}]}\n\n".as_bytes();
        let split = event.iter().position(|b| *b == 0xE5).unwrap() + 1;
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
            vec![Ok(event[..split].to_vec()), Ok(event[split..].to_vec())];

        let fragments = collect(fragments_from_sse(stream::iter(chunks))).await;
        assert_eq!(fragments, vec![Ok("天气".to_string())]);
    }

    #[tokio::test]
    async fn test_error_chunk_ends_stream() {
        let stream = fragments_from_sse(body(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n",
            "data: {\"error\":{\"message\":\"overloaded\"}}\n\n",
        ]));

        let fragments = collect(stream).await;
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0], Ok("a".to_string()));
        assert!(fragments[1].as_ref().unwrap_err().contains("overloaded"));
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n".to_vec()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let fragments = collect(fragments_from_sse(stream::iter(chunks))).await;

        assert_eq!(fragments.len(), 2);
        assert!(fragments[1].is_err());
    }
}
