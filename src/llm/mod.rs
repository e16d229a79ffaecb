pub mod backend;
pub mod client;
pub mod message;
pub mod models;
pub mod parse;
pub mod prompts;
pub mod repair;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{BackendError, CompletionBackend, CompletionRequest, GeminiBackend};
pub use client::{Completion, CompletionClient, RetryPolicy};
pub use message::{build_parts, HistoryTurn, MessagePart, Role};
pub use models::{ModelMap, ModelProfile};
pub use parse::{parse_response, ParsedResponse};
pub use repair::{
    RepairBudgets, RepairOrchestrator, RepairOutcome, RepairPhase, RepairProgress, RepairState,
};
