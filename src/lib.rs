//! # AgentDNS
//!
//! Natural-language task router for MCP tool services.
//!
//! A request is split into subtasks, each subtask is matched to a service
//! category with a keyword table, the category is resolved to a live endpoint
//! through the AgentDNS discovery service, and the best tool on that endpoint
//! is selected, parameterized and executed. Results are explained back to the
//! user as a streamed answer.
//!
//! ## Features
//!
//! - **Rule-based matching**: ordered keyword table, first match wins
//! - **Live discovery**: categories and endpoints come from AgentDNS on every turn
//! - **MCP over HTTP**: SSE and streamable HTTP transports
//! - **Streaming answers**: OpenAI-compatible completions (DeepSeek by default)
//! - **Fallback**: requests no service covers are answered directly
//!
//! ## Quick Start
//!
//! ```bash
//! # Write configure.toml, then
//! agentdns
//!
//! # Or point at a configuration file
//! agentdns --config ~/.config/agentdns/config.toml
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::large_enum_variant)]

pub mod ai;
pub mod core;
pub mod mcp;
pub mod output;
pub mod routing;

// Re-export commonly used types
pub use ai::{CompletionGateway, OpenAICompatibleGateway};
pub use core::{Config, I18n};
pub use mcp::{HttpConnector, SessionConnector};
pub use output::{BufferSink, ConsoleSink, OutputSink};
pub use routing::{Orchestrator, TurnReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "agentdns";
