//! Trace contexts with task-local propagation.
//!
//! A trace is one request; spans nest inside it, sharing the trace id and
//! forming a parent/child tree through `parent_span_id`. Propagation uses a
//! tokio task-local: [`with_trace_context`] installs a context for the
//! duration of a future and every descendant in the same asynchronous
//! lineage, and nesting restores the outer context on exit. Work moved to a
//! different lineage (e.g. `spawn_blocking`) does not see the context; pass
//! it explicitly there.

use std::collections::BTreeMap;
use std::future::Future;

use serde::{Deserialize, Serialize};

/// Attribute value: string, number, or boolean.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum AttrValue {
    Str(String),
    Num(f64),
    Bool(bool),
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

impl From<f64> for AttrValue {
    fn from(n: f64) -> Self {
        AttrValue::Num(n)
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        AttrValue::Num(n as f64)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

/// Generate a 128-bit trace id as 32 lowercase hex characters.
pub fn generate_trace_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}

/// Generate a 64-bit span id as 16 lowercase hex characters.
pub fn generate_span_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

/// Epoch milliseconds now.
pub fn epoch_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A trace context: ids, start time, and attributes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    /// Epoch milliseconds when the span started.
    pub started_at: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttrValue>,
}

impl TraceContext {
    /// Start a fresh root trace.
    pub fn new(attributes: BTreeMap<String, AttrValue>) -> Self {
        Self {
            trace_id: generate_trace_id(),
            span_id: generate_span_id(),
            parent_span_id: None,
            started_at: epoch_millis(),
            attributes,
        }
    }

    /// Root trace with no attributes.
    pub fn root() -> Self {
        Self::new(BTreeMap::new())
    }

    /// Derive a child span: same trace id, fresh span id, this span as
    /// parent. Attributes are merged with the child's keys winning.
    pub fn child_span(&self, attributes: BTreeMap<String, AttrValue>) -> Self {
        let mut merged = self.attributes.clone();
        merged.extend(attributes);
        Self {
            trace_id: self.trace_id.clone(),
            span_id: generate_span_id(),
            parent_span_id: Some(self.span_id.clone()),
            started_at: epoch_millis(),
            attributes: merged,
        }
    }
}

tokio::task_local! {
    static CURRENT_TRACE: TraceContext;
}

/// Run `fut` with `ctx` installed as the current trace context.
///
/// The context is visible to `fut` and all descendant async work in the same
/// lineage; when `fut` completes, the previously installed context (if any)
/// is visible again.
pub async fn with_trace_context<F>(ctx: TraceContext, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT_TRACE.scope(ctx, fut).await
}

/// The currently installed trace context, if any.
pub fn current_trace_context() -> Option<TraceContext> {
    CURRENT_TRACE.try_with(|ctx| ctx.clone()).ok()
}

/// The current trace id, if a context is installed.
pub fn current_trace_id() -> Option<String> {
    CURRENT_TRACE.try_with(|ctx| ctx.trace_id.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, AttrValue)]) -> BTreeMap<String, AttrValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn id_shapes() {
        let trace = generate_trace_id();
        let span = generate_span_id();
        assert_eq!(trace.len(), 32);
        assert_eq!(span.len(), 16);
        assert!(trace.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
        assert!(span.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
        assert_ne!(generate_trace_id(), generate_trace_id());
    }

    #[test]
    fn child_inherits_trace_and_merges_attributes() {
        let root = TraceContext::new(attrs(&[
            ("provider", "anthropic".into()),
            ("attempt", AttrValue::Num(0.0)),
        ]));
        let child = root.child_span(attrs(&[
            ("attempt", AttrValue::Num(1.0)),
            ("lane", "fast".into()),
        ]));

        assert_eq!(child.trace_id, root.trace_id);
        assert_ne!(child.span_id, root.span_id);
        assert_eq!(child.parent_span_id.as_deref(), Some(root.span_id.as_str()));
        // Child keys win on merge.
        assert_eq!(child.attributes["attempt"], AttrValue::Num(1.0));
        assert_eq!(child.attributes["provider"], AttrValue::Str("anthropic".into()));
        assert_eq!(child.attributes["lane"], AttrValue::Str("fast".into()));
    }

    #[tokio::test]
    async fn context_visible_inside_scope_only() {
        assert!(current_trace_context().is_none());

        let ctx = TraceContext::root();
        let trace_id = ctx.trace_id.clone();
        with_trace_context(ctx, async {
            assert_eq!(current_trace_id().as_deref(), Some(trace_id.as_str()));

            // Visible through nested async calls in the same lineage.
            async fn deeper() -> Option<String> {
                current_trace_id()
            }
            assert_eq!(deeper().await.as_deref(), Some(trace_id.as_str()));
        })
        .await;

        assert!(current_trace_context().is_none());
    }

    #[tokio::test]
    async fn nesting_restores_outer_context() {
        let outer = TraceContext::root();
        let inner = TraceContext::root();
        let outer_id = outer.trace_id.clone();
        let inner_id = inner.trace_id.clone();

        with_trace_context(outer, async {
            assert_eq!(current_trace_id().as_deref(), Some(outer_id.as_str()));
            with_trace_context(inner, async {
                assert_eq!(current_trace_id().as_deref(), Some(inner_id.as_str()));
            })
            .await;
            assert_eq!(current_trace_id().as_deref(), Some(outer_id.as_str()));
        })
        .await;
    }

    #[tokio::test]
    async fn sibling_task_does_not_observe_context() {
        let ctx = TraceContext::root();
        with_trace_context(ctx, async {
            let sibling = tokio::spawn(async { current_trace_context() });
            assert!(sibling.await.unwrap().is_none());
        })
        .await;
    }

    #[test]
    fn serde_roundtrip() {
        let ctx = TraceContext::new(attrs(&[("ok", AttrValue::Bool(true))]));
        let json = serde_json::to_string(&ctx).unwrap();
        let back: TraceContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ctx);
    }
}
