//! Per-turn orchestration.
//!
//! A turn runs strictly sequentially: decompose, match, then either a direct
//! answer or one resolve → run → explain pass per matched subtask. Only the
//! orchestrator writes to the output sink.

use std::sync::Arc;

use super::directory::DirectoryResolver;
use super::matcher::{Category, CategoryMatcher, CategorySet};
use super::tools::{ExecutionResult, ListingError, ToolRunOutcome, ToolSessionClient};
use crate::ai::{capabilities, CompletionGateway, CompletionRequest};
use crate::core::{Config, I18n};
use crate::mcp::SessionConnector;
use crate::output::{render_stream, OutputSink};

/// How a turn was handled.
#[derive(Debug)]
pub enum TurnReport {
    /// No subtask matched; the request was answered directly
    Fallback,
    /// Matched subtasks were routed, in decomposition order
    Routed(Vec<SubtaskReport>),
}

/// What happened to one subtask.
#[derive(Debug)]
pub struct SubtaskReport {
    /// Subtask text
    pub subtask: String,
    /// Assigned category
    pub category: Category,
    /// Result of routing it
    pub outcome: SubtaskOutcome,
}

/// Routing result for one subtask.
#[derive(Debug)]
pub enum SubtaskOutcome {
    /// No category matched; skipped silently
    Unmatched,
    /// The category could not be resolved
    ResolutionFailed,
    /// Resolution returned no usable address
    NoEndpoint,
    /// A tool session ran
    Ran(ToolRunOutcome),
}

impl SubtaskReport {
    /// The execution result, if the tool ran to completion.
    pub fn result(&self) -> Option<&ExecutionResult> {
        match &self.outcome {
            SubtaskOutcome::Ran(outcome) => outcome.result(),
            _ => None,
        }
    }

    /// Whether this subtask produced an execution result.
    pub fn completed(&self) -> bool {
        self.result().is_some()
    }
}

/// Drives one user turn end to end.
pub struct Orchestrator {
    gateway: Arc<dyn CompletionGateway>,
    directory: DirectoryResolver,
    tools: ToolSessionClient,
    matcher: CategoryMatcher,
    i18n: I18n,
}

impl Orchestrator {
    /// Assemble an orchestrator from its parts.
    pub fn new(
        gateway: Arc<dyn CompletionGateway>,
        directory: DirectoryResolver,
        tools: ToolSessionClient,
        matcher: CategoryMatcher,
        i18n: I18n,
    ) -> Self {
        Self { gateway, directory, tools, matcher, i18n }
    }

    /// Wire every component from the configuration.
    pub fn from_config(
        config: &Config,
        connector: Arc<dyn SessionConnector>,
        gateway: Arc<dyn CompletionGateway>,
    ) -> Self {
        let directory = DirectoryResolver::new(connector.clone(), config.agentdns.target());
        let tools = ToolSessionClient::new(connector, gateway.clone(), config.tools.transport);
        let matcher = CategoryMatcher::new(config.category_rules.clone());
        Self::new(gateway, directory, tools, matcher, I18n::new(config.locale()))
    }

    /// Localized messages.
    pub fn i18n(&self) -> &I18n {
        &self.i18n
    }

    /// Handle one user request.
    ///
    /// Fails only when the request cannot be decomposed; a diagnostic has
    /// already been written to `sink` in that case. Every later failure is
    /// reported per subtask and the turn continues.
    pub async fn handle_turn(
        &self,
        input: &str,
        sink: &mut dyn OutputSink,
    ) -> anyhow::Result<TurnReport> {
        let subtasks = match capabilities::decompose(self.gateway.as_ref(), input).await {
            Ok(subtasks) => subtasks,
            Err(e) => {
                let error = e.to_string();
                sink.diagnostic(&self.i18n.t_with("diag.decompose_failed", &[("error", &error)]));
                return Err(e.context("request decomposition failed"));
            }
        };

        sink.line(&self.i18n.t("main.classification_result"));
        for subtask in &subtasks {
            sink.line(&format!("  {}", subtask));
        }
        sink.line(&self.i18n.t("main.response_header"));

        let categories = self.supported_categories(sink).await;
        let assignment = self.matcher.assign(&subtasks, &categories);

        if assignment.all_unknown() {
            tracing::info!(subtasks = subtasks.len(), "No category matched, answering directly");
            sink.line(&self.i18n.t("main.no_match_warning"));
            self.stream_answer(capabilities::direct_answer_request(input, &self.i18n), sink).await;
            return Ok(TurnReport::Fallback);
        }

        let mut reports = Vec::with_capacity(assignment.len());
        for (subtask, category) in assignment.iter() {
            let outcome = match category {
                Category::Known(name) => self.route(subtask, name, sink).await,
                Category::Unknown => SubtaskOutcome::Unmatched,
            };
            reports.push(SubtaskReport {
                subtask: subtask.to_string(),
                category: category.clone(),
                outcome,
            });
        }

        Ok(TurnReport::Routed(reports))
    }

    async fn supported_categories(&self, sink: &mut dyn OutputSink) -> CategorySet {
        match self.directory.list_categories().await {
            Ok(categories) => categories,
            Err(e) => {
                tracing::warn!(error = %e, "Category listing failed");
                let error = e.to_string();
                sink.diagnostic(
                    &self.i18n.t_with("diag.categories_unavailable", &[("error", &error)]),
                );
                CategorySet::new()
            }
        }
    }

    async fn route(
        &self,
        subtask: &str,
        category: &str,
        sink: &mut dyn OutputSink,
    ) -> SubtaskOutcome {
        let header = [("subtask", subtask), ("category", category)];
        sink.line(&self.i18n.t_with("main.subtask_header", &header));

        let resolution = match self.directory.resolve_category(category).await {
            Ok(resolution) => resolution,
            Err(e) => {
                tracing::warn!(category, error = %e, "Category resolution failed");
                sink.diagnostic(&self.i18n.t_with(
                    "diag.resolve_failed",
                    &[("category", category), ("error", &e.to_string())],
                ));
                return SubtaskOutcome::ResolutionFailed;
            }
        };

        let Some(address) = resolution.as_ref().and_then(|r| r.address()) else {
            sink.diagnostic(&self.i18n.t_with("diag.no_endpoint", &[("category", category)]));
            return SubtaskOutcome::NoEndpoint;
        };

        let outcome = self.tools.run_tool(address, subtask).await;
        match &outcome {
            ToolRunOutcome::Completed(result) => {
                let request = capabilities::explanation_request(result, &self.i18n);
                self.stream_answer(request, sink).await;
            }
            ToolRunOutcome::NoTools => {
                tracing::info!(category, "Endpoint offered no tools");
            }
            ToolRunOutcome::ListingUnavailable(ListingError::Missing) => {
                sink.diagnostic(&self.i18n.t("diag.no_tool_list"));
            }
            ToolRunOutcome::ListingUnavailable(e) => {
                let error = e.to_string();
                sink.diagnostic(&self.i18n.t_with("diag.tool_list_invalid", &[("error", &error)]));
            }
            ToolRunOutcome::ExecutionFailed { tool, error } => {
                sink.diagnostic(&self.i18n.t_with(
                    "diag.tool_failed",
                    &[("tool", tool.as_str()), ("error", &error.to_string())],
                ));
            }
            ToolRunOutcome::SessionFailed(e) => {
                let error = e.to_string();
                sink.diagnostic(&self.i18n.t_with("diag.session_failed", &[("error", &error)]));
            }
        }
        SubtaskOutcome::Ran(outcome)
    }

    async fn stream_answer(&self, request: CompletionRequest, sink: &mut dyn OutputSink) {
        let stream_failed = |e: &anyhow::Error| {
            self.i18n.t_with("diag.stream_failed", &[("error", &e.to_string())])
        };

        match self.gateway.complete_streaming(request).await {
            Ok(stream) => {
                render_stream(stream, sink, stream_failed).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Streaming completion failed");
                sink.diagnostic(&stream_failed(&e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::stream;
    use serde_json::{json, Value};

    use super::*;
    use crate::ai::FragmentStream;
    use crate::mcp::{
        CallToolResult, McpError, SessionTarget, ToolContent, ToolSession, TransportKind,
    };
    use crate::output::BufferSink;
    use crate::routing::{CategoryRule, CategoryRules};

    /// Discovery and tool services in one fake, answering by operation name.
    #[derive(Default)]
    struct Services {
        calls: Mutex<Vec<String>>,
    }

    struct ServiceSession {
        services: Arc<Services>,
    }

    fn text(text: impl Into<String>) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult {
            content: vec![ToolContent::Text { text: text.into() }],
            ..Default::default()
        })
    }

    #[async_trait]
    impl ToolSession for ServiceSession {
        async fn call_tool(
            &mut self,
            name: &str,
            arguments: Value,
        ) -> Result<CallToolResult, McpError> {
            self.services.calls.lock().unwrap().push(name.to_string());
            match name {
                "category_list" => text(r#"["weather_forecast", "stock"]"#),
                "category_query" => {
                    let category = arguments["category"].as_str().unwrap_or_default();
                    text(json!({ "baseurl": format!("http://svc/{}", category) }).to_string())
                }
                "get_available_tools" => text(r#"{"tools": [{"name": "lookup"}]}"#),
                "execute_tool" => text(r#"{"answer": 42}"#),
                _ => Err(McpError::ConnectionClosed),
            }
        }

        async fn close(self: Box<Self>) {}
    }

    #[async_trait]
    impl SessionConnector for Arc<Services> {
        async fn open(&self, _target: &SessionTarget) -> Result<Box<dyn ToolSession>, McpError> {
            Ok(Box::new(ServiceSession { services: self.clone() }))
        }
    }

    /// Scripted completions; streaming echoes a fixed answer.
    struct Scripted {
        decomposition: Option<&'static str>,
    }

    #[async_trait]
    impl CompletionGateway for Scripted {
        async fn complete(&self, request: CompletionRequest) -> anyhow::Result<String> {
            if request.user.starts_with("User Query:") {
                return Ok("lookup".to_string());
            }
            if request.user.starts_with("Schema:") {
                return Ok("{}".to_string());
            }
            self.decomposition.map(str::to_string).ok_or_else(|| anyhow::anyhow!("rate limited"))
        }

        async fn complete_streaming(
            &self,
            _request: CompletionRequest,
        ) -> anyhow::Result<FragmentStream> {
            Ok(Box::pin(stream::iter(vec![Ok("答".to_string()), Ok("案".to_string())])))
        }
    }

    fn orchestrator(decomposition: Option<&'static str>) -> (Orchestrator, Arc<Services>) {
        let services = Arc::new(Services::default());
        let connector: Arc<dyn SessionConnector> = Arc::new(services.clone());
        let gateway: Arc<dyn CompletionGateway> = Arc::new(Scripted { decomposition });

        let rules = CategoryRules::new(vec![
            CategoryRule::new("weather_forecast", ["天气"]),
            CategoryRule::new("stock", ["股票"]),
        ]);
        let directory = DirectoryResolver::new(
            connector.clone(),
            SessionTarget::new("http://dns/sse", TransportKind::Sse),
        );
        let tools =
            ToolSessionClient::new(connector, gateway.clone(), TransportKind::StreamableHttp);
        let matcher = CategoryMatcher::new(rules);
        let i18n = I18n::new("en-US");
        let orchestrator = Orchestrator::new(gateway, directory, tools, matcher, i18n);
        (orchestrator, services)
    }

    #[tokio::test]
    async fn test_routes_matched_subtasks_in_order() {
        let (orchestrator, services) = orchestrator(Some("1. 查询北京天气\n2. 讲个笑话\n3. 查询股票代码"));
        let mut sink = BufferSink::new();

        let report = orchestrator.handle_turn("北京天气和股票", &mut sink).await.unwrap();

        let TurnReport::Routed(reports) = report else { panic!("expected routed turn") };
        assert_eq!(reports.len(), 3);
        assert!(reports[0].completed());
        assert!(matches!(reports[1].outcome, SubtaskOutcome::Unmatched));
        assert_eq!(reports[2].category, Category::Known("stock".to_string()));

        assert_eq!(sink.answers(), vec!["答案", "答案"]);
        assert!(sink.diagnostics().is_empty());
        assert!(sink.lines().contains(&"▶ 1. 查询北京天气  [weather_forecast]"));

        let calls = services.calls.lock().unwrap();
        assert_eq!(calls.iter().filter(|c| *c == "execute_tool").count(), 2);
    }

    #[tokio::test]
    async fn test_all_unknown_answers_directly() {
        let (orchestrator, services) = orchestrator(Some("1. 讲个笑话"));
        let mut sink = BufferSink::new();

        let report = orchestrator.handle_turn("讲个笑话", &mut sink).await.unwrap();

        assert!(matches!(report, TurnReport::Fallback));
        assert_eq!(sink.answers(), vec!["答案"]);
        assert_eq!(*services.calls.lock().unwrap(), vec!["category_list"]);
    }

    #[tokio::test]
    async fn test_no_subtasks_falls_back() {
        let (orchestrator, _) = orchestrator(Some("I cannot split this."));
        let mut sink = BufferSink::new();

        let report = orchestrator.handle_turn("hello", &mut sink).await.unwrap();
        assert!(matches!(report, TurnReport::Fallback));
    }

    #[tokio::test]
    async fn test_decomposition_failure_reports_diagnostic() {
        let (orchestrator, services) = orchestrator(None);
        let mut sink = BufferSink::new();

        assert!(orchestrator.handle_turn("北京天气", &mut sink).await.is_err());
        assert_eq!(sink.diagnostics(), vec!["Could not decompose the request: rate limited"]);
        assert!(services.calls.lock().unwrap().is_empty());
    }
}
