//! Prompt-level capabilities built on the completion gateway.
//!
//! Models are asked for bare output (a numbered list, a tool name, a JSON
//! object) but routinely wrap it in prose, quotes or code fences, so every
//! parser here is best-effort and never fails the turn.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use super::{CompletionGateway, CompletionRequest};
use crate::core::I18n;
use crate::routing::{ExecutionResult, ToolDescriptor};

static NUMBERED_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.").unwrap());

const DECOMPOSE_PROMPT: &str = "You are a task classifier. Split the user's request into short, \
numbered subtasks, one per line, formatted as `1. ...`, `2. ...`. Keep each subtask in the \
language of the request. Output only the list.";

const SELECT_PROMPT: &str = "You are a tool selector. You receive a user query and a list of \
available tools. Pick the BEST matching tool.\n\
Rules:\n\
1. ONLY output the tool name string, nothing else.\n\
2. If multiple tools could work, pick the most specific one.\n\
3. If none match well, pick the closest.";

const SYNTHESIZE_PROMPT: &str = "You are a JSON argument generator. Given a tool inputSchema \
(JSON Schema) and a user's natural-language query, produce a minimal valid JSON object that \
satisfies the schema.\n\
Rules:\n\
1. ONLY output the JSON object, nothing else.\n\
2. If the schema includes 'district_id', return the correct 6-digit adcode for the mentioned \
city at the CITY level (not province), e.g. '北京' -> '110100', '上海' -> '310100'.\n\
3. Ensure the result is valid JSON, with no commentary.";

/// Split a request into subtasks.
pub async fn decompose(
    gateway: &dyn CompletionGateway,
    input: &str,
) -> anyhow::Result<Vec<String>> {
    let raw = gateway.complete(CompletionRequest::new(DECOMPOSE_PROMPT, input)).await?;
    let subtasks = parse_subtasks(&raw);
    tracing::debug!(count = subtasks.len(), "Request decomposed");
    Ok(subtasks)
}

/// Keep lines of the form `<digits>. ...`; everything else is dropped.
pub fn parse_subtasks(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| NUMBERED_LINE.is_match(line))
        .map(str::to_string)
        .collect()
}

/// Ask the model which tool fits the query.
///
/// Returns `None` only when `tools` is empty. A failed call or an answer
/// that names no candidate falls back to the first tool.
pub async fn select_tool<'t>(
    gateway: &dyn CompletionGateway,
    query: &str,
    tools: &'t [ToolDescriptor],
) -> Option<&'t ToolDescriptor> {
    if tools.is_empty() {
        return None;
    }

    let listing = tools
        .iter()
        .map(|t| match t.description {
            Some(ref desc) => format!("- {}: {}", t.name, desc),
            None => format!("- {}", t.name),
        })
        .collect::<Vec<_>>()
        .join("\n");
    let user = format!("User Query: {}\nAvailable Tools:\n{}", query, listing);

    match gateway.complete(CompletionRequest::new(SELECT_PROMPT, user).deterministic()).await {
        Ok(raw) => pick_tool(&raw, tools),
        Err(e) => {
            tracing::warn!(error = %e, "Tool selection failed, using first candidate");
            tools.first()
        }
    }
}

/// Resolve a model answer to a candidate, falling back to the first one.
pub fn pick_tool<'t>(raw: &str, tools: &'t [ToolDescriptor]) -> Option<&'t ToolDescriptor> {
    let name = raw.trim().trim_matches(|c| matches!(c, '`' | '"' | '\'' | '*')).trim();

    tools.iter().find(|t| t.name == name).or_else(|| {
        tracing::debug!(answer = name, "Model named no candidate tool, using first");
        tools.first()
    })
}

/// Ask the model for arguments matching `schema`.
///
/// Never fails: unusable output becomes an `{"error": ...}` object that is
/// passed on to the tool like any other arguments.
pub async fn synthesize_arguments(
    gateway: &dyn CompletionGateway,
    schema: &Value,
    query: &str,
) -> Value {
    let user = format!("Schema: {}\nQuery: {}", schema, query);

    match gateway.complete(CompletionRequest::new(SYNTHESIZE_PROMPT, user).deterministic()).await {
        Ok(raw) => parse_arguments(&raw),
        Err(e) => {
            tracing::warn!(error = %e, "Argument synthesis failed");
            json!({ "error": format!("Argument synthesis failed: {}", e) })
        }
    }
}

/// Parse a JSON object out of model output.
pub fn parse_arguments(raw: &str) -> Value {
    let trimmed = raw.trim();

    let parsed = [trimmed, strip_code_fence(trimmed), brace_span(trimmed)]
        .into_iter()
        .find_map(|candidate| match serde_json::from_str::<Value>(candidate) {
            Ok(value @ Value::Object(_)) => Some(value),
            _ => None,
        });

    parsed.unwrap_or_else(|| json!({ "error": format!("Invalid JSON from model: {}", trimmed) }))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = rest.split_once('\n').map_or(rest, |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn brace_span(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => "",
    }
}

/// Prompt that explains an execution result to the user.
pub fn explanation_request(result: &ExecutionResult, i18n: &I18n) -> CompletionRequest {
    let system = format!(
        "You are a result explanation assistant. Turn the JSON query result you are given into \
         a short, clear explanation in {} that an ordinary user can understand.",
        i18n.language_name()
    );
    let user = serde_json::to_string(result).unwrap_or_else(|_| format!("{:?}", result));
    CompletionRequest::new(system, user)
}

/// Prompt for answering the request without any tool.
pub fn direct_answer_request(input: &str, i18n: &I18n) -> CompletionRequest {
    let system = format!(
        "You are a helpful assistant. Answer the user's question directly. Reply in {} unless \
         the user writes in another language.",
        i18n.language_name()
    );
    CompletionRequest::new(system, input)
}
