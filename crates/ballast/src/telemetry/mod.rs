//! Telemetry: trace contexts, the in-process bus, the in-memory scoreboard,
//! and the durable store.
//!
//! One call produces one [`CallTelemetry`](record::CallTelemetry) record.
//! The record flows through [`bus::emit_telemetry`], where it picks up the
//! current trace id, reaches every registered listener (the
//! [`scoreboard`] among them when started), and is optionally persisted in
//! the [`store::TelemetryStore`] for indexed queries, percentile
//! scoreboards, and regression detection.
//!
//! - [`trace`] — 128-bit trace / 64-bit span ids, parent/child spans, and
//!   task-local propagation via [`trace::with_trace_context`].
//! - [`record`] — the `CallTelemetry` row and its closed enums.
//! - [`bus`] — process-wide listener registry, [`bus::emit_telemetry`], and
//!   the [`bus::with_telemetry`] timing helper.
//! - [`scoreboard`] — cheap in-memory per-(provider, model) aggregates.
//! - [`store`] — SQLite persistence, indexed queries, p50/p95/p99, and
//!   [`store::TelemetryStore::detect_regressions`].

pub mod bus;
pub mod record;
pub mod scoreboard;
pub mod store;
pub mod trace;

// Re-export commonly used items at the module level.
pub use bus::{
    TelemetryListener, TelemetryOptions, emit_telemetry, register_listener, reset_listeners,
    unregister_listener, with_telemetry,
};
pub use record::{CallRole, CallStatus, CallTelemetry, ErrorKind, MemoryPressure};
pub use store::{
    RegressionAlert, RegressionMetric, RegressionSeverity, RegressionThresholds,
    RoutingScoreboardEntry, TelemetryFilter, TelemetryStore,
};
pub use trace::{
    AttrValue, TraceContext, current_trace_context, current_trace_id, generate_span_id,
    generate_trace_id, with_trace_context,
};
