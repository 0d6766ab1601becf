//! MCP sessions.
//!
//! A session is short-lived: connect, run the MCP handshake, make one or a
//! few `tools/call` requests, close. Sessions are never pooled and must not
//! be shared between concurrent callers.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::protocol::{
    CallToolParams, CallToolResult, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    MCPInitializeParams, MCPInitializeResult,
};
use super::transport::{McpError, SseTransport, StreamableHttpTransport, Transport, TransportKind};

/// Where and how to open a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTarget {
    /// Server URL
    pub address: String,
    /// Transport flavour
    pub transport: TransportKind,
}

impl SessionTarget {
    /// Create a new session target.
    pub fn new(address: impl Into<String>, transport: TransportKind) -> Self {
        Self { address: address.into(), transport }
    }
}

/// An initialized session that can call tools.
#[async_trait]
pub trait ToolSession: Send {
    /// Invoke a named tool with a JSON arguments object.
    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<CallToolResult, McpError>;

    /// Close the session.
    async fn close(self: Box<Self>);
}

/// Opens sessions against MCP servers.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Connect and initialize a session.
    async fn open(&self, target: &SessionTarget) -> Result<Box<dyn ToolSession>, McpError>;
}

/// Open a session, make a single call, close it.
///
/// The session is closed whether or not the call succeeded.
pub async fn call_once(
    connector: &dyn SessionConnector,
    target: &SessionTarget,
    tool: &str,
    arguments: Value,
) -> Result<CallToolResult, McpError> {
    let mut session = connector.open(target).await?;
    let result = session.call_tool(tool, arguments).await;
    session.close().await;
    result
}

/// MCP client session over HTTP.
pub struct McpSession {
    /// Underlying transport
    transport: Box<dyn Transport>,
    /// Request ID counter
    next_id: i64,
    /// Address, for logging
    address: String,
}

impl McpSession {
    /// Connect to the target and perform the MCP handshake.
    pub async fn connect(client: &Client, target: &SessionTarget) -> Result<Self, McpError> {
        let transport: Box<dyn Transport> = match target.transport {
            TransportKind::Sse => {
                Box::new(SseTransport::connect(client.clone(), &target.address).await?)
            }
            TransportKind::StreamableHttp => {
                Box::new(StreamableHttpTransport::new(client.clone(), &target.address)?)
            }
        };

        let mut session = Self { transport, next_id: 1, address: target.address.clone() };

        if let Err(e) = session.initialize().await {
            session.transport.close().await;
            return Err(e);
        }

        Ok(session)
    }

    /// Send a request and wait for response.
    async fn send_request(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = self.next_id;
        self.next_id += 1;

        let request = JsonRpcRequest::new(id, method, params);
        tracing::debug!(address = %self.address, method, id, "MCP request");

        let response = self.transport.request(&request).await?;
        tracing::debug!(address = %self.address, id, ok = response.error.is_none(), "MCP response");
        Ok(response)
    }

    /// Initialize the server with MCP handshake.
    async fn initialize(&mut self) -> Result<(), McpError> {
        let params = MCPInitializeParams::default();
        let response = self.send_request("initialize", Some(serde_json::to_value(&params)?)).await?;

        let result: MCPInitializeResult = response.into_result()?;
        tracing::debug!(
            address = %self.address,
            server = %result.server_info.name,
            protocol = %result.protocol_version,
            "MCP session initialized"
        );

        self.transport.notify(&JsonRpcNotification::new("notifications/initialized")).await
    }
}

#[async_trait]
impl ToolSession for McpSession {
    async fn call_tool(
        &mut self,
        name: &str,
        arguments: Value,
    ) -> Result<CallToolResult, McpError> {
        let params = CallToolParams { name: name.to_string(), arguments };
        let response = self.send_request("tools/call", Some(serde_json::to_value(&params)?)).await?;

        let result: CallToolResult = response.into_result()?;
        Ok(result)
    }

    async fn close(mut self: Box<Self>) {
        self.transport.close().await;
        tracing::debug!(address = %self.address, "MCP session closed");
    }
}

/// Production connector: real HTTP sessions.
#[derive(Debug, Clone, Default)]
pub struct HttpConnector {
    client: Client,
}

impl HttpConnector {
    /// Create a connector with its own HTTP client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a connector sharing an existing HTTP client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SessionConnector for HttpConnector {
    async fn open(&self, target: &SessionTarget) -> Result<Box<dyn ToolSession>, McpError> {
        let session = McpSession::connect(&self.client, target).await?;
        Ok(Box::new(session))
    }
}
