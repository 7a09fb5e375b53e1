//! Durable telemetry storage with indexed queries, percentiles, and
//! regression detection.
//!
//! Records live in a local SQLite database behind `Arc<Mutex<Connection>>`;
//! every operation runs on the blocking pool so the async runtime is never
//! stalled by disk I/O. The lock is held only for the duration of each
//! statement, so independent sessions interleave freely.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, params, params_from_iter};
use tracing::debug;

use crate::telemetry::record::{
    CallRole, CallStatus, CallTelemetry, ErrorKind, MemoryPressure,
};
use crate::telemetry::trace::epoch_millis;

/// Telemetry database schema. The `seq` key is monotonic; the three indexes
/// back trace lookups, routing aggregation, and time-window cleanup.
const TELEMETRY_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS call_telemetry (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        trace_id TEXT NOT NULL,
        request_id TEXT NOT NULL,
        session_id TEXT,
        session_key TEXT,
        model_id TEXT NOT NULL,
        provider TEXT NOT NULL,
        role TEXT NOT NULL,
        started_at INTEGER NOT NULL,
        completed_at INTEGER,
        latency_ms INTEGER,
        prompt_tokens INTEGER,
        completion_tokens INTEGER,
        cache_read_tokens INTEGER,
        cache_write_tokens INTEGER,
        total_tokens INTEGER,
        retry_count INTEGER NOT NULL DEFAULT 0,
        escalation_codes TEXT,
        artifact_bytes INTEGER,
        status TEXT NOT NULL,
        error_kind TEXT,
        error_message TEXT,
        local_memory_pressure TEXT,
        stop_reason TEXT,
        is_subagent INTEGER NOT NULL DEFAULT 0,
        subagent_label TEXT,
        lane TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_call_telemetry_trace
        ON call_telemetry (trace_id);
    CREATE INDEX IF NOT EXISTS idx_call_telemetry_model_role
        ON call_telemetry (model_id, role, started_at);
    CREATE INDEX IF NOT EXISTS idx_call_telemetry_started
        ON call_telemetry (started_at);
";

/// Default row cap for [`TelemetryStore::query`] when the filter sets none.
const DEFAULT_QUERY_LIMIT: usize = 500;

/// Minimum samples a (model, role) pair needs in the baseline window before
/// regression detection will consider it.
const MIN_BASELINE_SAMPLES: usize = 10;

/// Filter for [`TelemetryStore::query`]. All fields are conjunctive.
#[derive(Clone, Debug, Default)]
pub struct TelemetryFilter {
    pub trace_id: Option<String>,
    pub model_id: Option<String>,
    pub provider: Option<String>,
    pub role: Option<CallRole>,
    pub status: Option<CallStatus>,
    /// Inclusive lower bound on `started_at`, epoch ms.
    pub start_time: Option<i64>,
    /// Inclusive upper bound on `started_at`, epoch ms.
    pub end_time: Option<i64>,
    pub limit: Option<usize>,
}

/// Aggregate row of [`TelemetryStore::routing_scoreboard`].
#[derive(Clone, Debug, PartialEq)]
pub struct RoutingScoreboardEntry {
    pub model_id: String,
    pub role: CallRole,
    pub total_calls: u64,
    pub failure_count: u64,
    /// Fraction in [0, 1].
    pub failure_rate: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub avg_tokens_in: f64,
    pub avg_tokens_out: f64,
}

/// Which metric regressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegressionMetric {
    LatencyP95,
    FailureRate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RegressionSeverity {
    Warning,
    Critical,
}

/// Thresholds for [`TelemetryStore::detect_regressions`].
#[derive(Clone, Copy, Debug)]
pub struct RegressionThresholds {
    /// Percent increase of p95 latency over baseline that trips an alert.
    pub latency_p95_pct: f64,
    /// Percentage-point increase of failure rate that trips an alert.
    pub failure_rate_points: f64,
}

/// One detected regression.
#[derive(Clone, Debug, PartialEq)]
pub struct RegressionAlert {
    pub model_id: String,
    pub role: CallRole,
    pub metric: RegressionMetric,
    pub baseline: f64,
    pub current: f64,
    /// Percent change for latency, percentage points for failure rate.
    pub change: f64,
    pub severity: RegressionSeverity,
}

/// Percentile over an ascending-sorted slice: index `ceil(p/100 * n) - 1`
/// clamped to the valid range.
pub(crate) fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len();
    let idx = ((p / 100.0 * n as f64).ceil() as usize)
        .saturating_sub(1)
        .min(n - 1);
    sorted[idx]
}

/// Durable store of [`CallTelemetry`] rows.
#[derive(Clone)]
pub struct TelemetryStore {
    conn: Arc<Mutex<Connection>>,
}

impl TelemetryStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub async fn connect(path: PathBuf) -> Result<Self, String> {
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, rusqlite::Error> {
            let conn = Connection::open(&path)?;
            conn.execute_batch(TELEMETRY_SCHEMA)?;
            Ok(conn)
        })
        .await
        .map_err(|e| format!("failed to run blocking open: {e}"))?
        .map_err(|e| format!("failed to open telemetry db: {e}"))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// An in-memory store, mainly for tests.
    pub fn in_memory() -> Result<Self, String> {
        let conn =
            Connection::open_in_memory().map_err(|e| format!("failed to open memory db: {e}"))?;
        conn.execute_batch(TELEMETRY_SCHEMA)
            .map_err(|e| format!("failed to apply telemetry schema: {e}"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run_blocking<F, R>(&self, f: F) -> Result<R, String>
    where
        F: FnOnce(&mut Connection) -> Result<R, rusqlite::Error> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(|e| e.into_inner());
            f(&mut guard)
        })
        .await
        .map_err(|e| format!("blocking task failed: {e}"))?
        .map_err(|e| format!("telemetry db error: {e}"))
    }

    /// Insert or replace one record (keyed by `id`).
    pub async fn store(&self, record: &CallTelemetry) -> Result<(), String> {
        let record = record.clone();
        let escalation_codes = match &record.escalation_codes {
            Some(codes) => Some(
                serde_json::to_string(codes)
                    .map_err(|e| format!("failed to serialize escalation codes: {e}"))?,
            ),
            None => None,
        };
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO call_telemetry (
                    id, trace_id, request_id, session_id, session_key,
                    model_id, provider, role, started_at, completed_at,
                    latency_ms, prompt_tokens, completion_tokens,
                    cache_read_tokens, cache_write_tokens, total_tokens,
                    retry_count, escalation_codes, artifact_bytes, status,
                    error_kind, error_message, local_memory_pressure,
                    stop_reason, is_subagent, subagent_label, lane
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                          ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22,
                          ?23, ?24, ?25, ?26, ?27)",
                params![
                    record.id,
                    record.trace_id,
                    record.request_id,
                    record.session_id,
                    record.session_key,
                    record.model_id,
                    record.provider,
                    record.role.as_str(),
                    record.started_at,
                    record.completed_at,
                    record.latency_ms,
                    record.prompt_tokens,
                    record.completion_tokens,
                    record.cache_read_tokens,
                    record.cache_write_tokens,
                    record.total_tokens,
                    record.retry_count,
                    escalation_codes,
                    record.artifact_bytes,
                    record.status.as_str(),
                    record.error_kind.map(|k| k.as_str()),
                    record.error_message,
                    record.local_memory_pressure.map(|p| p.as_str()),
                    record.stop_reason,
                    record.is_subagent,
                    record.subagent_label,
                    record.lane,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Query records matching `filter`, newest first.
    pub async fn query(&self, filter: TelemetryFilter) -> Result<Vec<CallTelemetry>, String> {
        self.run_blocking(move |conn| {
            let mut sql = String::from(
                "SELECT id, trace_id, request_id, session_id, session_key, model_id, \
                 provider, role, started_at, completed_at, latency_ms, prompt_tokens, \
                 completion_tokens, cache_read_tokens, cache_write_tokens, total_tokens, \
                 retry_count, escalation_codes, artifact_bytes, status, error_kind, \
                 error_message, local_memory_pressure, stop_reason, is_subagent, \
                 subagent_label, lane FROM call_telemetry WHERE 1=1",
            );
            let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(trace_id) = &filter.trace_id {
                sql.push_str(" AND trace_id = ?");
                args.push(Box::new(trace_id.clone()));
            }
            if let Some(model_id) = &filter.model_id {
                sql.push_str(" AND model_id = ?");
                args.push(Box::new(model_id.clone()));
            }
            if let Some(provider) = &filter.provider {
                sql.push_str(" AND provider = ?");
                args.push(Box::new(provider.clone()));
            }
            if let Some(role) = filter.role {
                sql.push_str(" AND role = ?");
                args.push(Box::new(role.as_str()));
            }
            if let Some(status) = filter.status {
                sql.push_str(" AND status = ?");
                args.push(Box::new(status.as_str()));
            }
            if let Some(start) = filter.start_time {
                sql.push_str(" AND started_at >= ?");
                args.push(Box::new(start));
            }
            if let Some(end) = filter.end_time {
                sql.push_str(" AND started_at <= ?");
                args.push(Box::new(end));
            }
            sql.push_str(" ORDER BY started_at DESC LIMIT ?");
            args.push(Box::new(filter.limit.unwrap_or(DEFAULT_QUERY_LIMIT) as i64));

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params_from_iter(args.iter().map(|a| a.as_ref())),
                row_to_record,
            )?;
            rows.collect()
        })
        .await
    }

    /// Aggregate calls from the last `hours` by (model, role).
    pub async fn routing_scoreboard(
        &self,
        hours: u32,
    ) -> Result<Vec<RoutingScoreboardEntry>, String> {
        let since = epoch_millis() - i64::from(hours) * 3_600_000;
        self.aggregate_window(since, i64::MAX).await
    }

    /// Aggregate raw records with `since <= started_at < until`.
    async fn aggregate_window(
        &self,
        since: i64,
        until: i64,
    ) -> Result<Vec<RoutingScoreboardEntry>, String> {
        let rows = self
            .run_blocking(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT model_id, role, status, latency_ms, prompt_tokens, completion_tokens
                     FROM call_telemetry WHERE started_at >= ?1 AND started_at < ?2",
                )?;
                let rows = stmt.query_map(params![since, until], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                        row.get::<_, Option<i64>>(4)?,
                        row.get::<_, Option<i64>>(5)?,
                    ))
                })?;
                rows.collect::<Result<Vec<_>, _>>()
            })
            .await?;
        // Percentiles need the raw distribution, so grouping happens here
        // rather than in SQL.

        let mut groups: BTreeMap<(String, String), Vec<(bool, Option<i64>, Option<i64>, Option<i64>)>> =
            BTreeMap::new();
        for (model_id, role, status, latency, tokens_in, tokens_out) in rows {
            let failed = CallStatus::parse(&status).is_none_or(|s| s.is_failure());
            groups
                .entry((model_id, role))
                .or_default()
                .push((failed, latency, tokens_in, tokens_out));
        }

        let mut entries = Vec::with_capacity(groups.len());
        for ((model_id, role_str), calls) in groups {
            let Some(role) = CallRole::parse(&role_str) else {
                continue;
            };
            let total_calls = calls.len() as u64;
            let failure_count = calls.iter().filter(|c| c.0).count() as u64;

            let mut latencies: Vec<f64> = calls
                .iter()
                .filter_map(|c| c.1)
                .map(|l| l as f64)
                .collect();
            latencies.sort_by(f64::total_cmp);

            let tokens_in: Vec<f64> = calls.iter().filter_map(|c| c.2).map(|t| t as f64).collect();
            let tokens_out: Vec<f64> =
                calls.iter().filter_map(|c| c.3).map(|t| t as f64).collect();
            let avg = |v: &[f64]| {
                if v.is_empty() {
                    0.0
                } else {
                    v.iter().sum::<f64>() / v.len() as f64
                }
            };

            entries.push(RoutingScoreboardEntry {
                model_id,
                role,
                total_calls,
                failure_count,
                failure_rate: failure_count as f64 / total_calls as f64,
                p50_latency_ms: percentile(&latencies, 50.0),
                p95_latency_ms: percentile(&latencies, 95.0),
                p99_latency_ms: percentile(&latencies, 99.0),
                avg_tokens_in: avg(&tokens_in),
                avg_tokens_out: avg(&tokens_out),
            });
        }
        Ok(entries)
    }

    /// Delete records older than `days`. Returns the number removed.
    pub async fn cleanup(&self, days: u32) -> Result<usize, String> {
        let cutoff = epoch_millis() - i64::from(days) * 86_400_000;
        let removed = self
            .run_blocking(move |conn| {
                conn.execute(
                    "DELETE FROM call_telemetry WHERE started_at < ?1",
                    params![cutoff],
                )
            })
            .await?;
        debug!(removed, days, "telemetry cleanup complete");
        Ok(removed)
    }

    /// Compare the current window against a longer baseline window and flag
    /// (model, role) pairs whose p95 latency or failure rate degraded beyond
    /// the thresholds. The baseline is built from raw records between the two
    /// cutoffs, so a degradation in the current window cannot inflate its own
    /// baseline. Pairs with fewer than 10 baseline samples are skipped.
    /// Alerts are sorted by change, largest first.
    pub async fn detect_regressions(
        &self,
        baseline_hours: u32,
        current_hours: u32,
        thresholds: RegressionThresholds,
    ) -> Result<Vec<RegressionAlert>, String> {
        let now = epoch_millis();
        let current = self.routing_scoreboard(current_hours).await?;
        let baseline = self
            .aggregate_window(
                now - i64::from(baseline_hours) * 3_600_000,
                now - i64::from(current_hours) * 3_600_000,
            )
            .await?;

        let baseline_by_key: BTreeMap<(String, CallRole), &RoutingScoreboardEntry> = baseline
            .iter()
            .filter(|b| b.total_calls as usize >= MIN_BASELINE_SAMPLES)
            .map(|b| ((b.model_id.clone(), b.role), b))
            .collect();

        let mut alerts = Vec::new();
        for cur in &current {
            let Some(base) = baseline_by_key.get(&(cur.model_id.clone(), cur.role)) else {
                continue;
            };

            if base.p95_latency_ms > 0.0 {
                let change_pct =
                    (cur.p95_latency_ms - base.p95_latency_ms) / base.p95_latency_ms * 100.0;
                if change_pct > thresholds.latency_p95_pct {
                    alerts.push(RegressionAlert {
                        model_id: cur.model_id.clone(),
                        role: cur.role,
                        metric: RegressionMetric::LatencyP95,
                        baseline: base.p95_latency_ms,
                        current: cur.p95_latency_ms,
                        change: change_pct,
                        severity: severity_for(change_pct, thresholds.latency_p95_pct),
                    });
                }
            }

            let change_points = (cur.failure_rate - base.failure_rate) * 100.0;
            if change_points > thresholds.failure_rate_points {
                alerts.push(RegressionAlert {
                    model_id: cur.model_id.clone(),
                    role: cur.role,
                    metric: RegressionMetric::FailureRate,
                    baseline: base.failure_rate,
                    current: cur.failure_rate,
                    change: change_points,
                    severity: severity_for(change_points, thresholds.failure_rate_points),
                });
            }
        }

        alerts.sort_by(|a, b| b.change.total_cmp(&a.change));
        Ok(alerts)
    }
}

fn severity_for(change: f64, threshold: f64) -> RegressionSeverity {
    if change > 2.0 * threshold {
        RegressionSeverity::Critical
    } else {
        RegressionSeverity::Warning
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> Result<CallTelemetry, rusqlite::Error> {
    let role_str: String = row.get(7)?;
    let status_str: String = row.get(19)?;
    let error_kind_str: Option<String> = row.get(20)?;
    let pressure_str: Option<String> = row.get(22)?;
    let escalation_codes_str: Option<String> = row.get(17)?;

    Ok(CallTelemetry {
        id: row.get(0)?,
        trace_id: row.get(1)?,
        request_id: row.get(2)?,
        session_id: row.get(3)?,
        session_key: row.get(4)?,
        model_id: row.get(5)?,
        provider: row.get(6)?,
        role: CallRole::parse(&role_str).unwrap_or(CallRole::Executor),
        started_at: row.get(8)?,
        completed_at: row.get(9)?,
        latency_ms: row.get::<_, Option<i64>>(10)?.map(|v| v.max(0) as u64),
        prompt_tokens: row.get::<_, Option<i64>>(11)?.map(|v| v.max(0) as u64),
        completion_tokens: row.get::<_, Option<i64>>(12)?.map(|v| v.max(0) as u64),
        cache_read_tokens: row.get::<_, Option<i64>>(13)?.map(|v| v.max(0) as u64),
        cache_write_tokens: row.get::<_, Option<i64>>(14)?.map(|v| v.max(0) as u64),
        total_tokens: row.get::<_, Option<i64>>(15)?.map(|v| v.max(0) as u64),
        retry_count: row.get::<_, i64>(16)?.max(0) as u32,
        escalation_codes: escalation_codes_str
            .and_then(|s| serde_json::from_str::<Vec<String>>(&s).ok()),
        artifact_bytes: row.get::<_, Option<i64>>(18)?.map(|v| v.max(0) as u64),
        status: CallStatus::parse(&status_str).unwrap_or(CallStatus::Failure),
        error_kind: error_kind_str.as_deref().and_then(ErrorKind::parse),
        error_message: row.get(21)?,
        local_memory_pressure: pressure_str.as_deref().and_then(MemoryPressure::parse),
        stop_reason: row.get(23)?,
        is_subagent: row.get(24)?,
        subagent_label: row.get(25)?,
        lane: row.get(26)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        id: &str,
        model: &str,
        role: CallRole,
        status: CallStatus,
        started_at: i64,
        latency_ms: u64,
    ) -> CallTelemetry {
        let mut r = CallTelemetry::new(id, model, "test-provider", role, started_at, status);
        r.trace_id = format!("trace-{id}");
        r.request_id = format!("req-{id}");
        r.latency_ms = Some(latency_ms);
        r.prompt_tokens = Some(1000);
        r.completion_tokens = Some(100);
        r
    }

    #[test]
    fn percentile_indexing() {
        let values: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        assert_eq!(percentile(&values, 50.0), 50.0);
        assert_eq!(percentile(&values, 95.0), 95.0);
        assert_eq!(percentile(&values, 99.0), 99.0);
        assert_eq!(percentile(&values, 100.0), 100.0);

        assert_eq!(percentile(&[], 95.0), 0.0);
        assert_eq!(percentile(&[42.0], 50.0), 42.0);
        assert_eq!(percentile(&[1.0, 2.0], 50.0), 1.0);
        assert_eq!(percentile(&[1.0, 2.0], 95.0), 2.0);
    }

    #[tokio::test]
    async fn store_and_query_roundtrip() {
        let store = TelemetryStore::in_memory().unwrap();
        let now = epoch_millis();

        let mut r = record("a", "claude", CallRole::Executor, CallStatus::Success, now, 120);
        r.escalation_codes = Some(vec!["rate_limit".into()]);
        r.error_kind = Some(ErrorKind::RateLimit);
        r.local_memory_pressure = Some(MemoryPressure::High);
        store.store(&r).await.unwrap();

        let rows = store
            .query(TelemetryFilter {
                trace_id: Some("trace-a".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], r);
    }

    #[tokio::test]
    async fn query_filters_compose() {
        let store = TelemetryStore::in_memory().unwrap();
        let now = epoch_millis();

        for (i, (role, status)) in [
            (CallRole::Executor, CallStatus::Success),
            (CallRole::Executor, CallStatus::Failure),
            (CallRole::Planner, CallStatus::Success),
        ]
        .iter()
        .enumerate()
        {
            store
                .store(&record(
                    &format!("r{i}"),
                    "claude",
                    *role,
                    *status,
                    now - i as i64,
                    50,
                ))
                .await
                .unwrap();
        }

        let executors = store
            .query(TelemetryFilter {
                role: Some(CallRole::Executor),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(executors.len(), 2);

        let failures = store
            .query(TelemetryFilter {
                role: Some(CallRole::Executor),
                status: Some(CallStatus::Failure),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].id, "r1");

        let limited = store
            .query(TelemetryFilter {
                limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
        // Newest first.
        assert_eq!(limited[0].id, "r0");
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let store = TelemetryStore::in_memory().unwrap();
        let now = epoch_millis();

        store
            .store(&record("x", "claude", CallRole::Executor, CallStatus::Success, now, 10))
            .await
            .unwrap();
        store
            .store(&record("x", "claude", CallRole::Executor, CallStatus::Failure, now, 99))
            .await
            .unwrap();

        let rows = store.query(TelemetryFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, CallStatus::Failure);
    }

    #[tokio::test]
    async fn routing_scoreboard_aggregates() {
        let store = TelemetryStore::in_memory().unwrap();
        let now = epoch_millis();

        for i in 0..10u64 {
            let status = if i < 2 {
                CallStatus::Failure
            } else {
                CallStatus::Success
            };
            store
                .store(&record(
                    &format!("e{i}"),
                    "claude",
                    CallRole::Executor,
                    status,
                    now - i as i64,
                    100 + i * 10,
                ))
                .await
                .unwrap();
        }

        let board = store.routing_scoreboard(24).await.unwrap();
        assert_eq!(board.len(), 1);
        let entry = &board[0];
        assert_eq!(entry.model_id, "claude");
        assert_eq!(entry.total_calls, 10);
        assert_eq!(entry.failure_count, 2);
        assert!((entry.failure_rate - 0.2).abs() < 1e-9);
        // Latencies 100..190: p50 is the 5th of 10 sorted values.
        assert_eq!(entry.p50_latency_ms, 140.0);
        assert_eq!(entry.p99_latency_ms, 190.0);
        assert!((entry.avg_tokens_in - 1000.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn cleanup_removes_old_rows() {
        let store = TelemetryStore::in_memory().unwrap();
        let now = epoch_millis();
        let old = now - 40 * 86_400_000;

        store
            .store(&record("old", "m", CallRole::Executor, CallStatus::Success, old, 1))
            .await
            .unwrap();
        store
            .store(&record("new", "m", CallRole::Executor, CallStatus::Success, now, 1))
            .await
            .unwrap();

        let removed = store.cleanup(30).await.unwrap();
        assert_eq!(removed, 1);

        let rows = store.query(TelemetryFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "new");
    }

    #[tokio::test]
    async fn regression_detection_flags_latency_blowup() {
        let store = TelemetryStore::in_memory().unwrap();
        let now = epoch_millis();
        let day = 86_400_000i64;

        // Baseline: 20 calls over the past week around 100ms.
        for i in 0..20u64 {
            store
                .store(&record(
                    &format!("base{i}"),
                    "claude",
                    CallRole::Executor,
                    CallStatus::Success,
                    now - 3 * day - i as i64 * 1000,
                    100,
                ))
                .await
                .unwrap();
        }
        // Current: 12 calls in the last day around 300ms.
        for i in 0..12u64 {
            store
                .store(&record(
                    &format!("cur{i}"),
                    "claude",
                    CallRole::Executor,
                    CallStatus::Success,
                    now - i as i64 * 1000,
                    300,
                ))
                .await
                .unwrap();
        }

        let alerts = store
            .detect_regressions(
                168,
                24,
                RegressionThresholds {
                    latency_p95_pct: 50.0,
                    failure_rate_points: 10.0,
                },
            )
            .await
            .unwrap();

        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.metric, RegressionMetric::LatencyP95);
        assert_eq!(alert.baseline, 100.0);
        assert_eq!(alert.current, 300.0);
        // (300 - 100) / 100 = 200%, more than twice the 50% threshold.
        assert!((alert.change - 200.0).abs() < 1e-9);
        assert_eq!(alert.severity, RegressionSeverity::Critical);
    }

    #[tokio::test]
    async fn regression_detection_skips_thin_baselines() {
        let store = TelemetryStore::in_memory().unwrap();
        let now = epoch_millis();
        let day = 86_400_000i64;

        // Only 5 baseline samples: below the minimum.
        for i in 0..5u64 {
            store
                .store(&record(
                    &format!("b{i}"),
                    "claude",
                    CallRole::Planner,
                    CallStatus::Success,
                    now - 3 * day,
                    100,
                ))
                .await
                .unwrap();
        }
        store
            .store(&record("c0", "claude", CallRole::Planner, CallStatus::Success, now, 900))
            .await
            .unwrap();

        let alerts = store
            .detect_regressions(
                168,
                24,
                RegressionThresholds {
                    latency_p95_pct: 50.0,
                    failure_rate_points: 10.0,
                },
            )
            .await
            .unwrap();
        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn regression_detection_flags_failure_rate() {
        let store = TelemetryStore::in_memory().unwrap();
        let now = epoch_millis();
        let day = 86_400_000i64;

        // Baseline: 20 calls, all successes.
        for i in 0..20u64 {
            store
                .store(&record(
                    &format!("fb{i}"),
                    "gpt-4o",
                    CallRole::Executor,
                    CallStatus::Success,
                    now - 3 * day - i as i64,
                    100,
                ))
                .await
                .unwrap();
        }
        // Current: half failing.
        for i in 0..10u64 {
            let status = if i % 2 == 0 {
                CallStatus::Failure
            } else {
                CallStatus::Success
            };
            store
                .store(&record(
                    &format!("fc{i}"),
                    "gpt-4o",
                    CallRole::Executor,
                    status,
                    now - i as i64,
                    100,
                ))
                .await
                .unwrap();
        }

        let alerts = store
            .detect_regressions(
                168,
                24,
                RegressionThresholds {
                    latency_p95_pct: 5000.0,
                    failure_rate_points: 10.0,
                },
            )
            .await
            .unwrap();

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].metric, RegressionMetric::FailureRate);
        assert!(alerts[0].change > 10.0);
    }
}
