//! AgentDNS directory lookups.
//!
//! Every call opens its own discovery session and closes it afterwards;
//! nothing is pooled or cached between calls.

use std::sync::Arc;

use serde_json::{json, Value};

use super::matcher::CategorySet;
use crate::mcp::{
    call_once, CallToolResult, McpError, ResponseBody, SessionConnector, SessionTarget,
};

const CATEGORY_LIST: &str = "category_list";
const CATEGORY_QUERY: &str = "category_query";

/// Directory lookup errors.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// The session could not be opened or the call failed
    #[error(transparent)]
    Session(#[from] McpError),

    /// The service answered with a tool-level error
    #[error("{operation} rejected: {message}")]
    Rejected { operation: &'static str, message: String },
}

/// What `category_query` returned, in the shape it arrived in.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Structured result
    Structured(Value),
    /// JSON parsed from the text payload
    Parsed(Value),
    /// Text payload that was not JSON
    Raw(String),
}

impl Resolution {
    /// The endpoint address (`baseurl`), when present and non-empty.
    pub fn address(&self) -> Option<&str> {
        match self {
            Self::Structured(value) | Self::Parsed(value) => value
                .get("baseurl")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty()),
            Self::Raw(_) => None,
        }
    }

    /// The resolution as a JSON value; raw text becomes `{"raw": text}`.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Structured(value) | Self::Parsed(value) => value.clone(),
            Self::Raw(text) => json!({ "raw": text }),
        }
    }
}

/// Client for the AgentDNS discovery service.
pub struct DirectoryResolver {
    connector: Arc<dyn SessionConnector>,
    target: SessionTarget,
}

impl DirectoryResolver {
    /// Create a resolver for the given discovery service.
    pub fn new(connector: Arc<dyn SessionConnector>, target: SessionTarget) -> Self {
        Self { connector, target }
    }

    /// Categories the service currently supports.
    ///
    /// An unparsable payload yields an empty set; only session failures are
    /// returned as errors.
    pub async fn list_categories(&self) -> Result<CategorySet, DirectoryError> {
        let result = self.call(CATEGORY_LIST, json!({})).await?;

        let categories = match result.structured_first() {
            ResponseBody::Structured(value) => {
                let items = value.get("result").unwrap_or(&value);
                string_items(items)
            }
            ResponseBody::Text(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => map.into_iter().map(|(k, _)| k).collect(),
                Ok(items @ Value::Array(_)) => string_items(&items),
                Ok(other) => {
                    tracing::warn!(payload = %other, "Unexpected category list shape");
                    CategorySet::new()
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse category list");
                    CategorySet::new()
                }
            },
            ResponseBody::Empty => CategorySet::new(),
        };

        tracing::debug!(count = categories.len(), "Categories listed");
        Ok(categories)
    }

    /// Resolve a category to whatever the service returns for it.
    pub async fn resolve_category(
        &self,
        category: &str,
    ) -> Result<Option<Resolution>, DirectoryError> {
        let result = self.call(CATEGORY_QUERY, json!({ "category": category })).await?;

        let resolution = match result.structured_first() {
            ResponseBody::Structured(value) => Some(Resolution::Structured(value)),
            ResponseBody::Text(text) => Some(match serde_json::from_str(&text) {
                Ok(value) => Resolution::Parsed(value),
                Err(_) => Resolution::Raw(text),
            }),
            ResponseBody::Empty => None,
        };

        tracing::debug!(
            category,
            address = resolution.as_ref().and_then(Resolution::address),
            "Category resolved"
        );
        Ok(resolution)
    }

    async fn call(
        &self,
        operation: &'static str,
        arguments: Value,
    ) -> Result<CallToolResult, DirectoryError> {
        let result = call_once(self.connector.as_ref(), &self.target, operation, arguments).await?;

        if result.is_error == Some(true) {
            let message = result.first_text().unwrap_or_default().to_string();
            return Err(DirectoryError::Rejected { operation, message });
        }
        Ok(result)
    }
}

fn string_items(value: &Value) -> CategorySet {
    value
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}
