use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use ao_domain::{Error, Message, Result, TraceEventKind, TraceStep};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One conversation's server-side state.
///
/// Invariant: `message_count == messages.len() + summary_covered_count` at
/// every instant — the count only grows, even when summarization removes
/// messages from the live list.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub session_id: String,
    pub agent_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// How many appended messages the summary stands in for.
    pub summary_covered_count: usize,
    pub message_count: usize,
    pub trace: Vec<TraceStep>,
    /// Whether an orchestration has finalized on this session.
    pub completed: bool,
    #[serde(skip)]
    trace_truncated: bool,
}

impl Session {
    fn new(agent_id: &str) -> Self {
        let now = Utc::now();
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
            summary: None,
            summary_covered_count: 0,
            message_count: 0,
            trace: Vec::new(),
            completed: false,
            trace_truncated: false,
        }
    }

    /// Number of live (non-summary) messages, the summarization trigger.
    pub fn live_message_count(&self) -> usize {
        self.messages.len()
    }
}

/// Per-session aggregates for the session metrics endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SessionMetricsSummary {
    pub session_id: String,
    pub agent_id: String,
    pub message_count: usize,
    pub live_messages: usize,
    pub summarized_messages: usize,
    pub trace_steps: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub tool_messages: usize,
    pub providers_used: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SessionStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// In-memory session store.
///
/// The outer map is only locked for lookup and insertion; every mutation
/// of a session body happens under that session's own mutex, so appends
/// within one session are strictly serialized while different sessions
/// proceed without contention.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
    trace_cap: usize,
}

impl SessionStore {
    pub fn new(trace_cap: usize) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), trace_cap }
    }

    /// Mint a new session and return a snapshot of it.
    pub fn create(&self, agent_id: &str) -> Session {
        let session = Session::new(agent_id);
        let snapshot = session.clone();
        self.sessions
            .write()
            .insert(session.session_id.clone(), Arc::new(Mutex::new(session)));
        tracing::debug!(session_id = %snapshot.session_id, agent_id, "session created");
        snapshot
    }

    /// Snapshot a session by id.
    pub fn get(&self, session_id: &str) -> Result<Session> {
        let entry = self.entry(session_id)?;
        let session = entry.lock();
        Ok(session.clone())
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.sessions.read().contains_key(session_id)
    }

    fn entry(&self, session_id: &str) -> Result<Arc<Mutex<Session>>> {
        self.sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))
    }

    /// Append one message. Atomic against concurrent callers on the same
    /// session; messages are immutable once appended.
    pub fn append_message(&self, session_id: &str, message: Message) -> Result<()> {
        let entry = self.entry(session_id)?;
        let mut session = entry.lock();
        session.messages.push(message);
        session.message_count += 1;
        session.updated_at = Utc::now();
        Ok(())
    }

    /// Append a trace step, enforcing the trace ceiling.
    ///
    /// Overflow drops the oldest steps, never the newest, and injects a
    /// one-shot `trace_truncated` marker the first time it happens.
    pub fn append_trace_step(&self, session_id: &str, step: TraceStep) -> Result<()> {
        let entry = self.entry(session_id)?;
        let mut session = entry.lock();

        if session.trace.len() >= self.trace_cap {
            // Reserve room for the incoming step, and for the one-shot
            // truncation marker the first time the ceiling is hit.
            let marker = usize::from(!session.trace_truncated);
            let overflow = (session.trace.len() + 1 + marker).saturating_sub(self.trace_cap);
            let drain_to = overflow.min(session.trace.len());
            session.trace.drain(..drain_to);
            if !session.trace_truncated {
                session.trace_truncated = true;
                session.trace.push(TraceStep::new(
                    "SessionStore",
                    TraceEventKind::TraceTruncated,
                    serde_json::json!({ "cap": self.trace_cap }),
                ));
            }
        }

        session.trace.push(step);
        session.updated_at = Utc::now();
        Ok(())
    }

    /// Atomically replace the summarized prefix: the session's summary
    /// becomes `summary` and its live history becomes `kept_messages`.
    /// `message_count` is preserved by growing `summary_covered_count`.
    pub fn replace_summary(
        &self,
        session_id: &str,
        summary: String,
        kept_messages: Vec<Message>,
    ) -> Result<()> {
        let entry = self.entry(session_id)?;
        let mut session = entry.lock();

        let collapsed = session.messages.len().saturating_sub(kept_messages.len());
        session.summary_covered_count += collapsed;
        session.summary = Some(summary);
        session.messages = kept_messages;
        session.updated_at = Utc::now();
        Ok(())
    }

    /// Flag the session as completed. Returns whether this call was the
    /// one that flipped the flag, so lifecycle events fire exactly once.
    pub fn mark_completed(&self, session_id: &str) -> Result<bool> {
        let entry = self.entry(session_id)?;
        let mut session = entry.lock();
        let newly = !session.completed;
        session.completed = true;
        session.updated_at = Utc::now();
        Ok(newly)
    }

    /// Per-session aggregates for the metrics endpoint.
    pub fn metrics_summary(&self, session_id: &str) -> Result<SessionMetricsSummary> {
        let entry = self.entry(session_id)?;
        let session = entry.lock();

        let mut user = 0;
        let mut assistant = 0;
        let mut tool = 0;
        for msg in &session.messages {
            match msg.role {
                ao_domain::Role::User => user += 1,
                ao_domain::Role::Assistant => assistant += 1,
                ao_domain::Role::Tool => tool += 1,
                ao_domain::Role::System => {}
            }
        }

        let providers: BTreeSet<String> = session
            .trace
            .iter()
            .filter(|s| s.event == TraceEventKind::LlmCallSuccess)
            .filter_map(|s| s.details.get("provider"))
            .filter_map(|p| p.as_str())
            .map(String::from)
            .collect();

        Ok(SessionMetricsSummary {
            session_id: session.session_id.clone(),
            agent_id: session.agent_id.clone(),
            message_count: session.message_count,
            live_messages: session.messages.len(),
            summarized_messages: session.summary_covered_count,
            trace_steps: session.trace.len(),
            user_messages: user,
            assistant_messages: assistant,
            tool_messages: tool,
            providers_used: providers.into_iter().collect(),
            created_at: session.created_at,
            updated_at: session.updated_at,
        })
    }

    pub fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
