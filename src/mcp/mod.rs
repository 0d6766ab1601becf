//! MCP (Model Context Protocol) client.
//!
//! AgentDNS and the tool services it resolves to both speak MCP over HTTP.
//! This module provides the protocol types, the two HTTP transports and a
//! short-lived session abstraction used by the router.
//!
//! ## Architecture
//!
//! ```text
//! DirectoryResolver / ToolSessionClient
//!                │
//!                ▼
//!        SessionConnector ──open──► ToolSession (McpSession)
//!                                        │
//!                          ┌─────────────┴─────────────┐
//!                          ▼                           ▼
//!                    SseTransport          StreamableHttpTransport
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agentdns::mcp::{call_once, HttpConnector, SessionTarget, TransportKind};
//!
//! let connector = HttpConnector::new();
//! let target = SessionTarget::new("http://dns.example/sse", TransportKind::Sse);
//! let result = call_once(&connector, &target, "category_list", json!({})).await?;
//! ```

mod protocol;
mod session;
mod transport;

pub use protocol::{
    CallToolParams, CallToolResult, EmbeddedResource, JsonRpcError, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, MCPImplementation, MCPInitializeParams, MCPInitializeResult,
    RequestId, ResponseBody, ToolContent, PROTOCOL_VERSION,
};
pub use session::{
    call_once, HttpConnector, McpSession, SessionConnector, SessionTarget, ToolSession,
};
pub use transport::{McpError, SseTransport, StreamableHttpTransport, Transport, TransportKind};
