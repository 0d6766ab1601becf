//! MCP Protocol types.
//!
//! Implements the Model Context Protocol JSON-RPC message types used by
//! AgentDNS and the tool services it resolves to.
//! Based on the MCP specification: https://modelcontextprotocol.io/

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MCP protocol version sent during the handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Request ID
    pub id: RequestId,
    /// Method name
    pub method: String,
    /// Parameters (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self { jsonrpc: "2.0".to_string(), id: id.into(), method: method.into(), params }
    }
}

/// JSON-RPC request ID (can be string or number).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    /// String ID
    String(String),
    /// Numeric ID
    Number(i64),
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version
    pub jsonrpc: String,
    /// Request ID
    pub id: RequestId,
    /// Result (if successful)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Interpret an arbitrary incoming message as the response to `id`.
    ///
    /// Returns `None` for notifications, server-initiated requests and
    /// responses to other requests.
    pub fn matching(message: &Value, id: &RequestId) -> Option<Self> {
        let has_outcome = message.get("result").is_some() || message.get("error").is_some();
        if !has_outcome {
            return None;
        }

        let response: Self = serde_json::from_value(message.clone()).ok()?;
        (response.id == *id).then_some(response)
    }

    /// Get the result value.
    pub fn into_result<T: for<'de> Deserialize<'de>>(self) -> Result<T, JsonRpcError> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let result = self.result.ok_or_else(|| JsonRpcError {
            code: -32603,
            message: "No result in response".to_string(),
            data: None,
        })?;

        serde_json::from_value(result).map_err(|e| JsonRpcError {
            code: -32603,
            message: format!("Failed to parse result: {}", e),
            data: None,
        })
    }
}

/// JSON-RPC 2.0 error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Additional data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcError {}

/// JSON-RPC 2.0 notification (no response expected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// JSON-RPC version
    pub jsonrpc: String,
    /// Method name
    pub method: String,
    /// Parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Create a new notification.
    pub fn new(method: impl Into<String>) -> Self {
        Self { jsonrpc: "2.0".to_string(), method: method.into(), params: None }
    }
}

// ============================================================================
// MCP-specific message types
// ============================================================================

/// MCP initialize request parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MCPInitializeParams {
    /// Protocol version
    pub protocol_version: String,
    /// Client capabilities
    pub capabilities: Value,
    /// Client info
    pub client_info: MCPImplementation,
}

impl Default for MCPInitializeParams {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: Value::Object(serde_json::Map::new()),
            client_info: MCPImplementation {
                name: crate::APP_NAME.to_string(),
                version: Some(crate::VERSION.to_string()),
            },
        }
    }
}

/// Client or server identification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MCPImplementation {
    /// Name
    pub name: String,
    /// Version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// MCP initialize response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MCPInitializeResult {
    /// Protocol version chosen by the server
    pub protocol_version: String,
    /// Server capabilities
    #[serde(default)]
    pub capabilities: Value,
    /// Server info
    pub server_info: MCPImplementation,
}

/// Parameters for calling a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    /// Tool name
    pub name: String,
    /// Tool arguments
    pub arguments: Value,
}

/// Result from calling a tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// Content returned by the tool
    #[serde(default)]
    pub content: Vec<ToolContent>,
    /// Structured result, when the tool declares an output schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    /// Whether the tool call resulted in an error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

/// Content from a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content
    Text {
        /// The text content
        text: String,
    },
    /// Image content
    Image {
        /// Base64-encoded image data
        data: String,
        /// MIME type
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// Embedded resource
    Resource {
        /// The embedded resource
        resource: EmbeddedResource,
    },
    /// Content types this client does not understand
    #[serde(other)]
    Unsupported,
}

/// Resource embedded in a tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedResource {
    /// Resource URI
    pub uri: String,
    /// Resource text content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ToolContent {
    /// Get text content if this item carries any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ToolContent::Text { text } => Some(text),
            ToolContent::Resource { resource } => resource.text.as_deref(),
            _ => None,
        }
    }
}

/// The shape a tool response actually arrived in.
///
/// Services answer the same operation either with a structured result or with
/// a JSON document inside the first text item, so callers normalize through
/// this union instead of probing fields.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// `structuredContent` was present and non-empty
    Structured(Value),
    /// The first content item carried text
    Text(String),
    /// Neither was present
    Empty,
}

impl CallToolResult {
    /// Text of the first content item, if it has any.
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().and_then(ToolContent::as_text)
    }

    /// Structured content, ignoring `null` and empty containers.
    pub fn structured(&self) -> Option<&Value> {
        self.structured_content.as_ref().filter(|value| match value {
            Value::Null => false,
            Value::Object(map) => !map.is_empty(),
            Value::Array(items) => !items.is_empty(),
            _ => true,
        })
    }

    /// Normalize, preferring the structured result over text.
    pub fn structured_first(&self) -> ResponseBody {
        if let Some(value) = self.structured() {
            ResponseBody::Structured(value.clone())
        } else if let Some(text) = self.first_text() {
            ResponseBody::Text(text.to_string())
        } else {
            ResponseBody::Empty
        }
    }

    /// Normalize, preferring text over the structured result.
    pub fn text_first(&self) -> ResponseBody {
        if let Some(text) = self.first_text() {
            ResponseBody::Text(text.to_string())
        } else if let Some(value) = self.structured() {
            ResponseBody::Structured(value.clone())
        } else {
            ResponseBody::Empty
        }
    }
}
