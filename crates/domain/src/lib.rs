//! Shared domain types for the agent-orchestra workspace.
//!
//! Value types (messages, tool calls, agent configuration), the error
//! taxonomy every crate speaks, the trace-event catalogue, and the service
//! configuration tree. Everything here is plain data — no I/O.

pub mod agent;
pub mod config;
pub mod error;
pub mod message;
pub mod trace;

pub use agent::{
    AgentConfig, HistoryPage, OrchestrationRequest, OrchestrationResponse, ProviderTag,
    ResponseMetadata, RetryConfig,
};
pub use error::{Error, Result};
pub use message::{Message, Role, ToolCall, ToolResult, ToolSchema};
pub use trace::{TraceEventKind, TraceStep};
