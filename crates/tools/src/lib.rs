//! Tool registry and built-in tools for agent-orchestra.
//!
//! Tools are registered once at startup; the registry is read-only at
//! request time. Arguments arriving from models are validated against each
//! tool's JSON-Schema-shaped descriptor before execution.

pub mod builtin;
pub mod registry;

pub use registry::{validate_arguments, Tool, ToolRegistry};
