//! Hot state: the small structured document carried near the top of context.
//!
//! Holds the facts that must survive any amount of pruning or compaction:
//! the session id, the current objective, the risk level, and the running
//! lists of constraints, open questions, and accepted decisions. The document
//! enforces its own token cap at render time: when the full serialization
//! would not fit, it degrades to a minimal form that keeps the session id and
//! risk level.

use serde::{Deserialize, Serialize};

use crate::context::estimator::CHARS_PER_TOKEN;

/// Risk posture of the current session.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// The hot state document.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HotState {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objective: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub open_questions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accepted_decisions: Vec<String>,
}

impl HotState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            objective: None,
            risk_level: None,
            constraints: Vec::new(),
            open_questions: Vec::new(),
            accepted_decisions: Vec::new(),
        }
    }

    pub fn with_objective(mut self, objective: impl Into<String>) -> Self {
        self.objective = Some(objective.into());
        self
    }

    pub fn with_risk_level(mut self, level: RiskLevel) -> Self {
        self.risk_level = Some(level);
        self
    }

    /// Serialize the document to JSON.
    pub fn render(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.minimal().to_fallback_json())
    }

    /// The minimal fallback document: session id and risk level only.
    fn minimal(&self) -> MinimalHotState<'_> {
        MinimalHotState {
            session_id: &self.session_id,
            risk_level: self.risk_level,
        }
    }

    /// Serialize within a token cap.
    ///
    /// If the full serialization fits the cap, return it. Otherwise fall back
    /// to the minimal document so downstream budgeting never sees an
    /// unboundedly large hot state.
    pub fn render_within(&self, max_tokens: usize) -> String {
        let full = self.render();
        if estimate_rendered_tokens(&full) <= max_tokens {
            return full;
        }
        self.minimal().to_fallback_json()
    }

    /// Estimated token cost of the full serialization.
    pub fn estimated_tokens(&self) -> usize {
        estimate_rendered_tokens(&self.render())
    }
}

fn estimate_rendered_tokens(rendered: &str) -> usize {
    rendered.len().div_ceil(CHARS_PER_TOKEN)
}

#[derive(Serialize)]
struct MinimalHotState<'a> {
    session_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    risk_level: Option<RiskLevel>,
}

impl MinimalHotState<'_> {
    fn to_fallback_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            // session_id may contain arbitrary text; escape through Value.
            format!(
                "{{\"session_id\":{}}}",
                serde_json::Value::String(self.session_id.to_string())
            )
        })
    }
}
