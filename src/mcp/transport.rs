//! MCP transports.
//!
//! Two HTTP transports carry the same JSON-RPC traffic:
//!
//! - **SSE**: a long-lived `GET` event stream announces a message endpoint;
//!   requests are `POST`ed there and responses come back on the stream.
//! - **Streamable HTTP**: every message is `POST`ed to one URL and the reply
//!   is either a JSON body or a short event stream.

use async_trait::async_trait;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::protocol::{JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

const SESSION_HEADER: &str = "mcp-session-id";
const STREAMABLE_ACCEPT: &str = "application/json, text/event-stream";

/// Which transport a session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Event-stream session (`GET /sse` + `POST` endpoint)
    #[default]
    Sse,
    /// Request/response streaming session
    #[serde(alias = "http", alias = "streamable_http")]
    StreamableHttp,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sse => write!(f, "sse"),
            Self::StreamableHttp => write!(f, "streamable-http"),
        }
    }
}

/// Error type for MCP session operations.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Server did not announce a message endpoint")]
    MissingEndpoint,

    #[error("Connection closed before a response arrived")]
    ConnectionClosed,

    #[error("Event stream error: {0}")]
    EventStream(#[from] EventStreamError<reqwest::Error>),

    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A bidirectional JSON-RPC channel to one MCP server.
#[async_trait]
pub trait Transport: Send {
    /// Send a request and wait for its response.
    async fn request(&mut self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, McpError>;

    /// Send a notification.
    async fn notify(&mut self, notification: &JsonRpcNotification) -> Result<(), McpError>;

    /// Tear the channel down.
    async fn close(&mut self);
}

fn parse_url(url: &str) -> Result<Url, McpError> {
    Url::parse(url).map_err(|e| McpError::InvalidUrl(format!("{}: {}", url, e)))
}

async fn ensure_success(response: Response) -> Result<Response, McpError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(McpError::Status { status, body })
}

/// Events without an explicit type are `message` events.
fn is_kind(event: &Event, kind: &str) -> bool {
    if event.event.is_empty() {
        kind == "message"
    } else {
        event.event == kind
    }
}

fn parse_message(event: &Event) -> Option<Value> {
    if !is_kind(event, "message") || event.data.is_empty() {
        return None;
    }
    match serde_json::from_str(&event.data) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(error = %e, data = %event.data, "Ignoring non-JSON event");
            None
        }
    }
}

// ============================================================================
// SSE transport
// ============================================================================

/// Event-stream transport.
pub struct SseTransport {
    client: Client,
    endpoint: Url,
    inbox: mpsc::Receiver<Event>,
    reader: JoinHandle<()>,
}

impl SseTransport {
    /// Open the event stream and wait for the server to announce its
    /// message endpoint.
    pub async fn connect(client: Client, url: &str) -> Result<Self, McpError> {
        let base = parse_url(url)?;
        let response = client.get(base.clone()).header(ACCEPT, "text/event-stream").send().await?;
        let response = ensure_success(response).await?;

        let (tx, mut inbox) = mpsc::channel(64);
        let reader = tokio::spawn(pump_events(response, tx));

        let endpoint = loop {
            match inbox.recv().await {
                Some(event) if is_kind(&event, "endpoint") => match base.join(event.data.trim()) {
                    Ok(endpoint) => break endpoint,
                    Err(e) => {
                        reader.abort();
                        return Err(McpError::InvalidUrl(format!("{}: {}", event.data, e)));
                    }
                },
                Some(_) => continue,
                None => {
                    reader.abort();
                    return Err(McpError::MissingEndpoint);
                }
            }
        };

        tracing::debug!(%endpoint, "SSE session endpoint announced");
        Ok(Self { client, endpoint, inbox, reader })
    }

    async fn post(&self, body: &impl Serialize) -> Result<(), McpError> {
        let response = self.client.post(self.endpoint.clone()).json(body).send().await?;
        ensure_success(response).await?;
        Ok(())
    }
}

async fn pump_events(response: Response, tx: mpsc::Sender<Event>) {
    let mut events = Box::pin(response.bytes_stream().eventsource());

    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, "SSE stream ended with error");
                return;
            }
        };
        if tx.send(event).await.is_err() {
            return;
        }
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn request(&mut self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        self.post(request).await?;

        while let Some(event) = self.inbox.recv().await {
            if let Some(message) = parse_message(&event) {
                if let Some(response) = JsonRpcResponse::matching(&message, &request.id) {
                    return Ok(response);
                }
            }
        }

        Err(McpError::ConnectionClosed)
    }

    async fn notify(&mut self, notification: &JsonRpcNotification) -> Result<(), McpError> {
        self.post(notification).await
    }

    async fn close(&mut self) {
        self.reader.abort();
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

// ============================================================================
// Streamable HTTP transport
// ============================================================================

/// Request/response streaming transport.
pub struct StreamableHttpTransport {
    client: Client,
    url: Url,
    session_id: Option<String>,
}

impl StreamableHttpTransport {
    /// Create a transport for the given endpoint. No traffic is sent until
    /// the first message.
    pub fn new(client: Client, url: &str) -> Result<Self, McpError> {
        Ok(Self { client, url: parse_url(url)?, session_id: None })
    }

    async fn post(&mut self, body: &impl Serialize) -> Result<Response, McpError> {
        let mut builder = self
            .client
            .post(self.url.clone())
            .header(ACCEPT, STREAMABLE_ACCEPT)
            .json(body);
        if let Some(ref id) = self.session_id {
            builder = builder.header(SESSION_HEADER, id);
        }

        let response = ensure_success(builder.send().await?).await?;

        if let Some(id) = response.headers().get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
            if self.session_id.as_deref() != Some(id) {
                tracing::debug!(session_id = id, "MCP session established");
                self.session_id = Some(id.to_string());
            }
        }

        Ok(response)
    }
}

async fn read_streamed_response(
    response: Response,
    request: &JsonRpcRequest,
) -> Result<JsonRpcResponse, McpError> {
    let mut events = Box::pin(response.bytes_stream().eventsource());

    while let Some(event) = events.next().await {
        if let Some(message) = parse_message(&event?) {
            if let Some(found) = JsonRpcResponse::matching(&message, &request.id) {
                return Ok(found);
            }
        }
    }

    Err(McpError::ConnectionClosed)
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    async fn request(&mut self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        let response = self.post(request).await?;

        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        if is_stream {
            read_streamed_response(response, request).await
        } else {
            let message: Value = response.json().await?;
            JsonRpcResponse::matching(&message, &request.id).ok_or(McpError::ConnectionClosed)
        }
    }

    async fn notify(&mut self, notification: &JsonRpcNotification) -> Result<(), McpError> {
        self.post(notification).await?;
        Ok(())
    }

    async fn close(&mut self) {
        let Some(id) = self.session_id.take() else {
            return;
        };

        // Servers may answer 405 when they do not support explicit termination
        let result = self.client.delete(self.url.clone()).header(SESSION_HEADER, &id).send().await;
        if let Err(e) = result {
            tracing::debug!(error = %e, session_id = %id, "Session termination failed");
        }
    }
}
