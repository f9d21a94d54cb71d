//! Conversational layer: prompt building, the tool-calling exchange and
//! error-content screening.

pub mod guard;
pub mod orchestrator;
pub mod prompt;

pub use orchestrator::{
    Orchestration, OrchestrationError, OrchestrationState, Orchestrator, ToolInvocation,
};
pub use prompt::{build_summary_prompt, NO_NEWS_SUMMARY};
