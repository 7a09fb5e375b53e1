//! In-memory per-(provider, model) scoreboard fed by the telemetry bus.
//!
//! The scoreboard answers the cheap question ("how is this model doing right
//! now") without touching the durable store. It is a process-wide singleton:
//! [`start`] registers one bus listener, [`stop`] removes it, both are
//! idempotent, and [`reset`] clears the counters for tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock};

use crate::telemetry::bus::{TelemetryListener, register_listener, unregister_listener};
use crate::telemetry::record::CallTelemetry;
use crate::telemetry::trace::epoch_millis;

/// Aggregate counters for one (provider, model) pair.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScoreboardEntry {
    pub success_count: u64,
    pub fail_count: u64,
    pub total_latency_ms: u64,
    pub total_tokens_in: u64,
    pub total_tokens_out: u64,
    /// Epoch milliseconds of the most recent event.
    pub last_event_at: i64,
}

impl ScoreboardEntry {
    fn total(&self) -> u64 {
        self.success_count + self.fail_count
    }

    /// Fraction of calls that succeeded. `None` until an event arrives.
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.total();
        (total > 0).then(|| self.success_count as f64 / total as f64)
    }

    /// Mean latency across all calls. `None` until an event arrives.
    pub fn avg_latency_ms(&self) -> Option<f64> {
        let total = self.total();
        (total > 0).then(|| self.total_latency_ms as f64 / total as f64)
    }
}

struct ScoreboardState {
    entries: BTreeMap<String, ScoreboardEntry>,
    listener: Option<Arc<dyn TelemetryListener>>,
}

fn state() -> &'static Mutex<ScoreboardState> {
    static STATE: OnceLock<Mutex<ScoreboardState>> = OnceLock::new();
    STATE.get_or_init(|| {
        Mutex::new(ScoreboardState {
            entries: BTreeMap::new(),
            listener: None,
        })
    })
}

fn with_state<R>(f: impl FnOnce(&mut ScoreboardState) -> R) -> R {
    let mut guard = state().lock().unwrap_or_else(|e| e.into_inner());
    f(&mut guard)
}

/// Scoreboard key for a provider/model pair. Missing names become "unknown".
pub fn scoreboard_key(provider: &str, model: &str) -> String {
    let provider = if provider.is_empty() { "unknown" } else { provider };
    let model = if model.is_empty() { "unknown" } else { model };
    format!("{provider}::{model}")
}

struct ScoreboardListener;

impl TelemetryListener for ScoreboardListener {
    fn on_event(&self, event: &CallTelemetry) {
        let key = scoreboard_key(&event.provider, &event.model_id);
        with_state(|state| {
            let entry = state.entries.entry(key).or_default();
            if event.status.is_failure() {
                entry.fail_count += 1;
            } else {
                entry.success_count += 1;
            }
            entry.total_latency_ms += event.latency_ms.unwrap_or(0);
            entry.total_tokens_in += event.prompt_tokens.unwrap_or(0);
            entry.total_tokens_out += event.completion_tokens.unwrap_or(0);
            entry.last_event_at = if event.completed_at.unwrap_or(0) > 0 {
                event.completed_at.unwrap_or(0)
            } else {
                epoch_millis()
            };
        });
    }
}

/// Attach the scoreboard to the bus. Safe to call repeatedly; only one
/// listener is ever registered.
pub fn start() {
    with_state(|state| {
        if state.listener.is_none() {
            let listener: Arc<dyn TelemetryListener> = Arc::new(ScoreboardListener);
            register_listener(listener.clone());
            state.listener = Some(listener);
        }
    });
}

/// Detach the scoreboard from the bus. Safe to call repeatedly. Counters are
/// kept; use [`reset`] to clear them.
pub fn stop() {
    let listener = with_state(|state| state.listener.take());
    if let Some(listener) = listener {
        unregister_listener(&listener);
    }
}

/// Clear all counters. Test affordance.
pub fn reset() {
    with_state(|state| state.entries.clear());
}

/// Counters for one provider/model pair, if any events were seen.
pub fn entry(provider: &str, model: &str) -> Option<ScoreboardEntry> {
    let key = scoreboard_key(provider, model);
    with_state(|state| state.entries.get(&key).cloned())
}

/// All counters, keyed `"<provider>::<model>"`.
pub fn snapshot() -> BTreeMap<String, ScoreboardEntry> {
    with_state(|state| state.entries.clone())
}

/// Multi-line human-readable summary, one line per pair.
pub fn summary() -> String {
    let entries = snapshot();
    let mut lines = Vec::with_capacity(entries.len());
    for (key, entry) in entries {
        let rate = entry
            .success_rate()
            .map(|r| format!("{:.1}%", r * 100.0))
            .unwrap_or_else(|| "n/a".into());
        let avg = entry
            .avg_latency_ms()
            .map(|l| format!("{l:.0}ms"))
            .unwrap_or_else(|| "n/a".into());
        lines.push(format!(
            "{key}: {} ok / {} fail ({rate}), avg {avg}, tokens {} in / {} out",
            entry.success_count, entry.fail_count, entry.total_tokens_in, entry.total_tokens_out,
        ));
    }
    lines.join("\n")
}
