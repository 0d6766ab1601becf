//! Task routing pipeline.
//!
//! ```text
//! request ──decompose──► subtasks ──CategoryMatcher──► assignment
//!                                                         │
//!                     all unknown? ── yes ──► direct streamed answer
//!                                                         │ no
//!                                                         ▼
//!        for each matched subtask, in order:
//!            DirectoryResolver::resolve_category ──► endpoint
//!            ToolSessionClient::run_tool          ──► ExecutionResult
//!            explanation streamed to the sink
//! ```

mod directory;
mod matcher;
mod orchestrator;
mod tools;

pub use directory::{DirectoryError, DirectoryResolver, Resolution};
pub use matcher::{
    normalize, Category, CategoryAssignment, CategoryMatcher, CategoryRule, CategoryRules,
    CategorySet,
};
pub use orchestrator::{Orchestrator, SubtaskOutcome, SubtaskReport, TurnReport};
pub use tools::{ExecutionResult, ListingError, ToolDescriptor, ToolRunOutcome, ToolSessionClient};
