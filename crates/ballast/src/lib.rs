//! Runtime control plane for LLM agent orchestration.
//!
//! `ballast` is the subsystem that keeps long-running, multi-provider
//! conversational agents inside their context windows, survives provider
//! failures, records per-call telemetry, and decides when a session's message
//! log should be semantically compacted. It deliberately does *not* talk to
//! any provider: the actual LLM call is a closure supplied by the caller, the
//! summarizer is a collaborator invoked when the compaction guard says so,
//! and rendering/CLI concerns live elsewhere.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`context`] | Token estimation, budget allocation, history pruning, tool-result truncation, and the discipline orchestrator that composes them |
//! | [`failover`] | Error taxonomy, at-most-one retry, and structured escalation records |
//! | [`telemetry`] | Trace contexts with task-local propagation, the in-process event bus, the in-memory scoreboard, and the durable SQLite store |
//! | [`session`] | Lock-serialized session metadata store and the auto-compaction / token-pressure guards |
//! | [`auth`] | Lock-serialized credential store and fail-closed environment autosync |
//! | [`contract`] | Declarative validation for plan/task/result envelopes crossing the boundary |
//!
//! # Design principles
//!
//! 1. **Context is the scarcest resource.** Every byte headed for a provider
//!    passes through a budget: the system prompt is measured, tool results
//!    are truncated, history is pruned oldest-first with recent turns and
//!    system messages protected.
//!
//! 2. **Fail fast, retry once.** Transient failures (rate limits, timeouts,
//!    5xx, network) get exactly one retry. Everything else escalates
//!    immediately with a structured record. Unknown errors are treated as
//!    non-retriable.
//!
//! 3. **Shared state lives behind a file lock.** Session metadata and
//!    credentials are JSON files updated under an advisory lock with atomic
//!    rename, so concurrent processes never lose writes and the auto-compact
//!    guard can make its decide-and-record step atomic.
//!
//! 4. **Observability over magic.** Every provider call can be wrapped in a
//!    trace context and timed through the telemetry bus; the scoreboard and
//!    the durable store answer "which model is failing" without any external
//!    tracing backend.

pub mod auth;
pub mod context;
pub mod contract;
pub mod failover;
pub mod prelude;
pub mod session;
pub mod storage;
pub mod telemetry;

use serde::{Deserialize, Serialize};

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation history.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// A single typed part of a structured message.
///
/// Parts carry a discriminator (`type`) and arbitrary associated fields.
/// Only `text` parts contribute their text length to character counts; any
/// other part is charged a flat overhead by the estimator.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Part-type-specific fields (image payloads, tool-call ids, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ContentPart {
    /// A plain text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".into(),
            text: Some(text.into()),
            extra: serde_json::Map::new(),
        }
    }

    /// A non-text part with only a discriminator (extra fields default empty).
    pub fn other(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            text: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Whether this is a `text` part.
    pub fn is_text(&self) -> bool {
        self.kind == "text"
    }
}

/// Message content: either a plain string or an ordered list of typed parts.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        MessageContent::Text(s.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        MessageContent::Text(s)
    }
}

/// A message in the conversation history.
///
/// System messages are immutable and protected from pruning; see
/// [`context::prune`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HistoryMessage {
    pub role: MessageRole,
    pub content: MessageContent,
}

impl HistoryMessage {
    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn tool(content: impl Into<MessageContent>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
        }
    }

    /// Build a message with structured parts.
    pub fn with_parts(role: MessageRole, parts: Vec<ContentPart>) -> Self {
        Self {
            role,
            content: MessageContent::Parts(parts),
        }
    }
}
