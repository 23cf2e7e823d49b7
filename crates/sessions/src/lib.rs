//! In-memory session state for agent-orchestra.
//!
//! Sessions hold the append-only conversation history, the summary of any
//! collapsed prefix, and the per-session debug trace. The store gives each
//! session its own lock so concurrent requests against different sessions
//! never contend.

pub mod store;

pub use store::{Session, SessionMetricsSummary, SessionStore};
