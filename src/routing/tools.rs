//! Tool sessions against resolved service endpoints.
//!
//! One session per run: list candidate tools for the query, let the model
//! pick one and synthesize its arguments, execute it, normalize the result.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::ai::capabilities;
use crate::ai::CompletionGateway;
use crate::mcp::{
    McpError, ResponseBody, SessionConnector, SessionTarget, ToolSession, TransportKind,
};

const GET_AVAILABLE_TOOLS: &str = "get_available_tools";
const EXECUTE_TOOL: &str = "execute_tool";

/// A tool offered by an endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name, unique within one listing
    pub name: String,

    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema of the arguments
    #[serde(rename = "inputSchema", default = "empty_schema")]
    pub input_schema: Value,
}

fn empty_schema() -> Value {
    json!({})
}

impl ToolDescriptor {
    /// Required argument names absent from `arguments`.
    ///
    /// Validation is advisory only; the caller still executes the tool.
    pub fn missing_required(&self, arguments: &Value) -> Vec<String> {
        let Some(required) = self.input_schema.get("required").and_then(Value::as_array) else {
            return Vec::new();
        };

        required
            .iter()
            .filter_map(Value::as_str)
            .filter(|field| arguments.get(*field).is_none())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct ToolListing {
    #[serde(default)]
    tools: Vec<ToolDescriptor>,
}

/// Outcome of one tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether the tool produced a result
    pub found: bool,
    /// Tool that was executed
    pub tool: String,
    /// Arguments it was called with
    pub arguments: Value,
    /// Parsed result, raw text, or nothing
    pub result: Option<Value>,
}

impl ExecutionResult {
    /// Assemble a result; a JSON `null` counts as no result.
    pub fn new(tool: impl Into<String>, arguments: Value, result: Option<Value>) -> Self {
        let result = result.filter(|value| !value.is_null());
        Self { found: result.is_some(), tool: tool.into(), arguments, result }
    }

    /// Normalize an `execute_tool` response: text parsed as JSON, else the
    /// raw text, else the structured result.
    pub fn from_response(tool: impl Into<String>, arguments: Value, body: ResponseBody) -> Self {
        let result = match body {
            ResponseBody::Text(text) => {
                Some(serde_json::from_str(&text).unwrap_or(Value::String(text)))
            }
            ResponseBody::Structured(value) => Some(value),
            ResponseBody::Empty => None,
        };
        Self::new(tool, arguments, result)
    }
}

/// Why no tool list could be obtained.
#[derive(Debug, thiserror::Error)]
pub enum ListingError {
    /// The response carried neither text nor structured content
    #[error("no tool list returned")]
    Missing,

    /// The payload was not a tool listing
    #[error(transparent)]
    Invalid(#[from] serde_json::Error),
}

/// What a tool run came to.
#[derive(Debug)]
pub enum ToolRunOutcome {
    /// The tool ran and returned (possibly empty) data
    Completed(ExecutionResult),
    /// The endpoint offered no tools for the query
    NoTools,
    /// The tool listing was absent or unparsable
    ListingUnavailable(ListingError),
    /// The chosen tool's execution failed
    ExecutionFailed { tool: String, error: McpError },
    /// The session could not be opened or the listing call failed
    SessionFailed(McpError),
}

impl ToolRunOutcome {
    /// The execution result, if the run completed.
    pub fn into_result(self) -> Option<ExecutionResult> {
        match self {
            Self::Completed(result) => Some(result),
            _ => None,
        }
    }

    /// Borrow the execution result, if the run completed.
    pub fn result(&self) -> Option<&ExecutionResult> {
        match self {
            Self::Completed(result) => Some(result),
            _ => None,
        }
    }
}

/// Runs tools on resolved endpoints.
pub struct ToolSessionClient {
    connector: Arc<dyn SessionConnector>,
    gateway: Arc<dyn CompletionGateway>,
    transport: TransportKind,
}

impl ToolSessionClient {
    /// Create a client.
    pub fn new(
        connector: Arc<dyn SessionConnector>,
        gateway: Arc<dyn CompletionGateway>,
        transport: TransportKind,
    ) -> Self {
        Self { connector, gateway, transport }
    }

    /// Pick, parameterize and execute the best tool at `address` for `query`.
    ///
    /// The session is closed before returning, whatever the outcome.
    pub async fn run_tool(&self, address: &str, query: &str) -> ToolRunOutcome {
        let target = SessionTarget::new(address, self.transport);

        let mut session = match self.connector.open(&target).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(address, error = %e, "Failed to open tool session");
                return ToolRunOutcome::SessionFailed(e);
            }
        };

        let outcome = self.run_in_session(session.as_mut(), query).await;
        session.close().await;
        outcome
    }

    async fn run_in_session(&self, session: &mut dyn ToolSession, query: &str) -> ToolRunOutcome {
        let request = json!({ "query": query });
        let listing = match session.call_tool(GET_AVAILABLE_TOOLS, request).await {
            Ok(listing) => listing,
            Err(e) => {
                tracing::warn!(error = %e, "Tool listing call failed");
                return ToolRunOutcome::SessionFailed(e);
            }
        };

        let tools = match parse_listing(listing.text_first()) {
            Ok(tools) => tools,
            Err(e) => {
                tracing::warn!(error = %e, "Tool listing unavailable");
                return ToolRunOutcome::ListingUnavailable(e);
            }
        };
        tracing::debug!(count = tools.len(), "Candidate tools listed");

        let gateway = self.gateway.as_ref();
        let selected = capabilities::select_tool(gateway, query, &tools).await;
        let Some(chosen) = selected else {
            return ToolRunOutcome::NoTools;
        };
        tracing::debug!(tool = %chosen.name, "Tool selected");

        let schema = &chosen.input_schema;
        let arguments = capabilities::synthesize_arguments(gateway, schema, query).await;

        let missing = chosen.missing_required(&arguments);
        if !missing.is_empty() {
            tracing::warn!(
                tool = %chosen.name,
                ?missing,
                "Synthesized arguments lack required fields"
            );
        }

        let request = json!({ "toolName": chosen.name, "arguments": arguments });
        match session.call_tool(EXECUTE_TOOL, request).await {
            Ok(response) => {
                if response.is_error == Some(true) {
                    tracing::debug!(tool = %chosen.name, "Tool reported an error result");
                }
                let result =
                    ExecutionResult::from_response(&chosen.name, arguments, response.text_first());
                tracing::debug!(tool = %result.tool, found = result.found, "Tool executed");
                ToolRunOutcome::Completed(result)
            }
            Err(error) => {
                tracing::warn!(tool = %chosen.name, error = %error, "Tool execution failed");
                ToolRunOutcome::ExecutionFailed { tool: chosen.name.clone(), error }
            }
        }
    }
}

/// Candidate tools from a `get_available_tools` response.
fn parse_listing(body: ResponseBody) -> Result<Vec<ToolDescriptor>, ListingError> {
    let listing: ToolListing = match body {
        ResponseBody::Text(text) => serde_json::from_str(&text)?,
        ResponseBody::Structured(value) => serde_json::from_value(value)?,
        ResponseBody::Empty => return Err(ListingError::Missing),
    };
    Ok(listing.tools)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::ai::{CompletionRequest, FragmentStream};
    use crate::mcp::{CallToolResult, ToolContent};

    type Script = Arc<Mutex<VecDeque<Result<CallToolResult, McpError>>>>;

    #[derive(Default)]
    struct Journal {
        calls: Vec<(String, Value)>,
        closed: usize,
    }

    struct ScriptedSession {
        script: Script,
        journal: Arc<Mutex<Journal>>,
    }

    #[async_trait]
    impl ToolSession for ScriptedSession {
        async fn call_tool(
            &mut self,
            name: &str,
            arguments: Value,
        ) -> Result<CallToolResult, McpError> {
            self.journal.lock().unwrap().calls.push((name.to_string(), arguments));
            self.script.lock().unwrap().pop_front().unwrap_or(Err(McpError::ConnectionClosed))
        }

        async fn close(self: Box<Self>) {
            self.journal.lock().unwrap().closed += 1;
        }
    }

    struct ScriptedConnector {
        script: Script,
        journal: Arc<Mutex<Journal>>,
    }

    #[async_trait]
    impl SessionConnector for ScriptedConnector {
        async fn open(&self, target: &SessionTarget) -> Result<Box<dyn ToolSession>, McpError> {
            assert_eq!(target.transport, TransportKind::StreamableHttp);
            Ok(Box::new(ScriptedSession {
                script: self.script.clone(),
                journal: self.journal.clone(),
            }))
        }
    }

    /// Answers completions from a queue.
    struct QueueGateway {
        answers: Mutex<VecDeque<String>>,
    }

    #[async_trait]
    impl CompletionGateway for QueueGateway {
        async fn complete(&self, _request: CompletionRequest) -> anyhow::Result<String> {
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("no scripted answer"))
        }

        async fn complete_streaming(
            &self,
            _request: CompletionRequest,
        ) -> anyhow::Result<FragmentStream> {
            anyhow::bail!("not used")
        }
    }

    fn text(text: &str) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult {
            content: vec![ToolContent::Text { text: text.to_string() }],
            ..Default::default()
        })
    }

    fn scripted_client(
        script: Vec<Result<CallToolResult, McpError>>,
        answers: &[&str],
    ) -> (ToolSessionClient, Arc<Mutex<Journal>>) {
        let journal = Arc::new(Mutex::new(Journal::default()));
        let connector = ScriptedConnector {
            script: Arc::new(Mutex::new(script.into())),
            journal: journal.clone(),
        };
        let gateway = QueueGateway {
            answers: Mutex::new(answers.iter().map(|s| s.to_string()).collect()),
        };
        let client = ToolSessionClient::new(
            Arc::new(connector),
            Arc::new(gateway),
            TransportKind::StreamableHttp,
        );
        (client, journal)
    }

    const WEATHER_TOOLS: &str = r#"{"tools": [
        {"name": "get_weather", "description": "Weather by district",
         "inputSchema": {"type": "object", "required": ["district_id"]}},
        {"name": "get_air_quality"}
    ]}"#;

    #[tokio::test]
    async fn test_run_tool_completes() {
        let (client, journal) = scripted_client(
            vec![text(WEATHER_TOOLS), text(r#"{"temp": 21, "text": "晴"}"#)],
            &["get_weather", r#"{"district_id": "110100"}"#],
        );

        let outcome = client.run_tool("http://svc/mcp", "1. 查询北京天气").await;
        let result = outcome.into_result().unwrap();

        assert!(result.found);
        assert_eq!(result.tool, "get_weather");
        assert_eq!(result.arguments, json!({"district_id": "110100"}));
        assert_eq!(result.result, Some(json!({"temp": 21, "text": "晴"})));

        let journal = journal.lock().unwrap();
        let listing_call = ("get_available_tools".to_string(), json!({"query": "1. 查询北京天气"}));
        assert_eq!(journal.calls[0], listing_call);
        assert_eq!(
            journal.calls[1],
            (
                "execute_tool".to_string(),
                json!({"toolName": "get_weather", "arguments": {"district_id": "110100"}})
            )
        );
        assert_eq!(journal.closed, 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_name_falls_back_to_first() {
        let script = vec![text(WEATHER_TOOLS), text("sunny")];
        let (client, journal) = scripted_client(script, &["forecast_tool", "not json"]);

        let result = client.run_tool("http://svc/mcp", "weather").await.into_result().unwrap();

        assert_eq!(result.tool, "get_weather");
        assert_eq!(result.arguments, json!({"error": "Invalid JSON from model: not json"}));
        assert_eq!(result.result, Some(Value::String("sunny".to_string())));
        assert_eq!(journal.lock().unwrap().calls[1].1["toolName"], "get_weather");
    }

    #[tokio::test]
    async fn test_empty_tool_list() {
        let (client, journal) = scripted_client(vec![text(r#"{"tools": []}"#)], &[]);

        assert!(matches!(client.run_tool("http://svc/mcp", "q").await, ToolRunOutcome::NoTools));
        let journal = journal.lock().unwrap();
        assert_eq!(journal.calls.len(), 1);
        assert_eq!(journal.closed, 1);
    }

    #[tokio::test]
    async fn test_listing_unavailable() {
        let (client, _) = scripted_client(vec![text("<html>oops</html>")], &[]);
        assert!(matches!(
            client.run_tool("http://svc/mcp", "q").await,
            ToolRunOutcome::ListingUnavailable(ListingError::Invalid(_))
        ));

        let (client, _) = scripted_client(vec![Ok(CallToolResult::default())], &[]);
        assert!(matches!(
            client.run_tool("http://svc/mcp", "q").await,
            ToolRunOutcome::ListingUnavailable(ListingError::Missing)
        ));
    }

    #[tokio::test]
    async fn test_execution_failure_names_tool_and_closes() {
        let (client, journal) = scripted_client(
            vec![text(WEATHER_TOOLS), Err(McpError::ConnectionClosed)],
            &["get_air_quality", "{}"],
        );

        match client.run_tool("http://svc/mcp", "q").await {
            ToolRunOutcome::ExecutionFailed { tool, .. } => assert_eq!(tool, "get_air_quality"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(journal.lock().unwrap().closed, 1);
    }

    #[test]
    fn test_execution_result_normalization() {
        let empty = ExecutionResult::from_response("t", json!({}), ResponseBody::Empty);
        assert!(!empty.found);
        assert_eq!(empty.result, None);

        let null =
            ExecutionResult::from_response("t", json!({}), ResponseBody::Text("null".into()));
        assert!(!null.found);

        let body = ResponseBody::Structured(json!({"a": 1}));
        let structured = ExecutionResult::from_response("t", json!({}), body);
        assert_eq!(structured.result, Some(json!({"a": 1})));
        assert!(structured.found);
    }

    #[test]
    fn test_execution_result_round_trip() {
        let original = ExecutionResult::new(
            "get_weather",
            json!({"district_id": "110100"}),
            Some(json!({"forecast": [{"day": "mon", "temp": 21}]})),
        );

        let json = serde_json::to_string(&original).unwrap();
        let parsed: ExecutionResult = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, original);
        assert!(json.contains("\"found\":true"));
    }

    #[test]
    fn test_missing_required_is_advisory() {
        let tools: ToolListing = serde_json::from_str(WEATHER_TOOLS).unwrap();
        let weather = &tools.tools[0];

        assert_eq!(weather.missing_required(&json!({})), vec!["district_id"]);
        assert!(weather.missing_required(&json!({"district_id": "110100"})).is_empty());
        assert_eq!(tools.tools[1].input_schema, json!({}));
        assert!(tools.tools[1].missing_required(&json!({})).is_empty());
    }
}
