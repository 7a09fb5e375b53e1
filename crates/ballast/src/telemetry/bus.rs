//! The in-process telemetry bus.
//!
//! Listeners register process-wide; [`emit_telemetry`] enriches each event
//! with the current trace id and fans it out in registration order. A
//! panicking listener is contained and logged; it never stops the fan-out
//! and never reaches the emitting call path. [`with_telemetry`] is the
//! scoped helper that times a future and emits exactly one success or
//! failure event for it.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use tracing::{debug, warn};

use crate::telemetry::record::{CallRole, CallStatus, CallTelemetry};
use crate::telemetry::trace::{current_trace_context, epoch_millis, generate_trace_id};

/// A bus listener. Implementations must tolerate events with missing
/// optional fields.
pub trait TelemetryListener: Send + Sync {
    fn on_event(&self, event: &CallTelemetry);
}

type ListenerList = Vec<Arc<dyn TelemetryListener>>;

fn listeners() -> &'static Mutex<ListenerList> {
    static LISTENERS: OnceLock<Mutex<ListenerList>> = OnceLock::new();
    LISTENERS.get_or_init(|| Mutex::new(Vec::new()))
}

fn with_listeners<R>(f: impl FnOnce(&mut ListenerList) -> R) -> R {
    let mut guard = listeners().lock().unwrap_or_else(|e| e.into_inner());
    f(&mut guard)
}

/// Register a listener. Events are delivered in registration order.
pub fn register_listener(listener: Arc<dyn TelemetryListener>) {
    with_listeners(|list| list.push(listener));
}

/// Remove a previously registered listener (matched by identity).
pub fn unregister_listener(listener: &Arc<dyn TelemetryListener>) {
    with_listeners(|list| list.retain(|l| !Arc::ptr_eq(l, listener)));
}

/// Drop every registered listener. Test affordance.
pub fn reset_listeners() {
    with_listeners(|list| list.clear());
}

/// Number of registered listeners.
pub fn listener_count() -> usize {
    with_listeners(|list| list.len())
}

/// Serializes tests that touch the process-wide listener registry.
#[cfg(test)]
pub(crate) fn test_guard() -> std::sync::MutexGuard<'static, ()> {
    static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
    GUARD
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

/// Emit one telemetry event to every registered listener.
///
/// Events without a trace id inherit the current task-local trace context's
/// id when one is installed.
pub fn emit_telemetry(mut event: CallTelemetry) {
    if event.trace_id.is_empty()
        && let Some(ctx) = current_trace_context()
    {
        event.trace_id = ctx.trace_id;
    }

    match event.status {
        CallStatus::Success => debug!(
            id = event.id,
            trace_id = event.trace_id,
            provider = event.provider,
            model = event.model_id,
            latency_ms = event.latency_ms,
            "telemetry: call succeeded"
        ),
        _ => warn!(
            id = event.id,
            trace_id = event.trace_id,
            provider = event.provider,
            model = event.model_id,
            status = event.status.as_str(),
            error = event.error_message.as_deref().unwrap_or(""),
            "telemetry: call did not succeed"
        ),
    }

    // Snapshot the list so listeners can (un)register from inside a callback
    // without deadlocking.
    let snapshot: ListenerList = with_listeners(|list| list.clone());
    for listener in snapshot {
        if catch_unwind(AssertUnwindSafe(|| listener.on_event(&event))).is_err() {
            warn!(id = event.id, "telemetry listener panicked; continuing fan-out");
        }
    }
}

/// Options for [`with_telemetry`].
#[derive(Clone, Debug)]
pub struct TelemetryOptions {
    pub model_id: String,
    pub provider: String,
    pub role: CallRole,
    pub request_id: Option<String>,
    pub session_id: Option<String>,
    pub session_key: Option<String>,
    pub is_subagent: bool,
    pub subagent_label: Option<String>,
    pub lane: Option<String>,
}

impl TelemetryOptions {
    pub fn new(model_id: impl Into<String>, provider: impl Into<String>, role: CallRole) -> Self {
        Self {
            model_id: model_id.into(),
            provider: provider.into(),
            role,
            request_id: None,
            session_id: None,
            session_key: None,
            is_subagent: false,
            subagent_label: None,
            lane: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// Time a future and emit one telemetry event for its outcome.
///
/// A normal return emits a success event with the measured latency; an error
/// emits a failure event carrying the error's display text, and the error is
/// returned to the caller unchanged.
pub async fn with_telemetry<T, E, F>(options: TelemetryOptions, fut: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: std::future::Future<Output = Result<T, E>>,
{
    let started_at = epoch_millis();
    let timer = Instant::now();
    let result = fut.await;
    let latency_ms = timer.elapsed().as_millis() as u64;

    let mut event = CallTelemetry::new(
        generate_trace_id(),
        options.model_id.clone(),
        options.provider.clone(),
        options.role,
        started_at,
        match result {
            Ok(_) => CallStatus::Success,
            Err(_) => CallStatus::Failure,
        },
    );
    event.request_id = options.request_id.unwrap_or_else(generate_trace_id);
    event.session_id = options.session_id;
    event.session_key = options.session_key;
    event.is_subagent = options.is_subagent;
    event.subagent_label = options.subagent_label;
    event.lane = options.lane;
    event.completed_at = Some(epoch_millis());
    event.latency_ms = Some(latency_ms);
    if let Err(e) = &result {
        event.error_message = Some(e.to_string());
    }

    emit_telemetry(event);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::trace::{TraceContext, with_trace_context};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        events: Mutex<Vec<CallTelemetry>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
            })
        }
    }

    impl TelemetryListener for Recorder {
        fn on_event(&self, event: &CallTelemetry) {
            self.events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(event.clone());
        }
    }

    struct Panicker;

    impl TelemetryListener for Panicker {
        fn on_event(&self, _event: &CallTelemetry) {
            panic!("bad listener");
        }
    }

    struct Counter(AtomicUsize);

    impl TelemetryListener for Counter {
        fn on_event(&self, _event: &CallTelemetry) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn sample_event(id: &str, status: CallStatus) -> CallTelemetry {
        CallTelemetry::new(id, "model", "provider", CallRole::Executor, 0, status)
    }

    // Bus tests share the process-wide registry, so they run inside a single
    // test to avoid cross-test interference.
    #[tokio::test]
    async fn bus_behaviour() {
        let _guard = test_guard();
        reset_listeners();

        // Fan-out reaches listeners in order.
        let rec = Recorder::new();
        let listener: Arc<dyn TelemetryListener> = rec.clone();
        register_listener(listener.clone());

        emit_telemetry(sample_event("e1", CallStatus::Success));
        emit_telemetry(sample_event("e2", CallStatus::Failure));
        {
            let events = rec.events.lock().unwrap();
            assert_eq!(events.len(), 2);
            assert_eq!(events[0].id, "e1");
            assert_eq!(events[1].id, "e2");
        }

        // A panicking listener does not break the fan-out for others.
        let panicker: Arc<dyn TelemetryListener> = Arc::new(Panicker);
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let counting: Arc<dyn TelemetryListener> = counter.clone();
        reset_listeners();
        register_listener(panicker);
        register_listener(counting.clone());
        emit_telemetry(sample_event("e3", CallStatus::Success));
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        // Trace id enrichment from the task-local context.
        let rec2 = Recorder::new();
        reset_listeners();
        register_listener(rec2.clone());
        let ctx = TraceContext::root();
        let trace_id = ctx.trace_id.clone();
        with_trace_context(ctx, async {
            emit_telemetry(sample_event("e4", CallStatus::Success));
        })
        .await;
        assert_eq!(rec2.events.lock().unwrap()[0].trace_id, trace_id);

        // An explicit trace id is never overwritten.
        let mut explicit = sample_event("e5", CallStatus::Success);
        explicit.trace_id = "preset".into();
        emit_telemetry(explicit);
        assert_eq!(rec2.events.lock().unwrap()[1].trace_id, "preset");

        // with_telemetry emits success with latency.
        let rec3 = Recorder::new();
        reset_listeners();
        register_listener(rec3.clone());
        let ok: Result<u32, String> = with_telemetry(
            TelemetryOptions::new("m", "p", CallRole::Planner),
            async { Ok(5) },
        )
        .await;
        assert_eq!(ok.unwrap(), 5);
        {
            let events = rec3.events.lock().unwrap();
            assert_eq!(events[0].status, CallStatus::Success);
            assert!(events[0].latency_ms.is_some());
            assert!(events[0].error_message.is_none());
        }

        // with_telemetry emits failure with the error text and rethrows.
        let err: Result<u32, String> = with_telemetry(
            TelemetryOptions::new("m", "p", CallRole::Planner),
            async { Err("boom".to_string()) },
        )
        .await;
        assert_eq!(err.unwrap_err(), "boom");
        {
            let events = rec3.events.lock().unwrap();
            assert_eq!(events[1].status, CallStatus::Failure);
            assert_eq!(events[1].error_message.as_deref(), Some("boom"));
        }

        // Unregister removes exactly the given listener.
        let as_listener: Arc<dyn TelemetryListener> = rec3.clone();
        unregister_listener(&as_listener);
        assert_eq!(listener_count(), 0);

        reset_listeners();
    }
}
