//! Lock-serialized, file-backed session metadata store.
//!
//! One JSON object maps session keys (colon-delimited strings like
//! `"agent:channel:1234"`) to [`SessionEntry`] values. Every mutation runs
//! under the shared advisory-lock discipline from [`crate::storage`], which
//! is what lets the auto-compact guard make its decide-and-record step
//! atomic across processes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::storage::{read_json_store, update_json_store};

/// Per-session metadata persisted across restarts.
///
/// `updated_at` and the two rate-limit timestamp pairs are monotone: the
/// store never lets them decrease.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SessionEntry {
    pub session_id: String,
    /// Epoch milliseconds of the last update. Never decreases.
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_tokens: Option<u64>,
    /// Wall-clock epoch ms of the last auto-compaction. Never decreases.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_auto_compact_last_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_auto_compact_last_at_tokens: Option<u64>,
    /// Wall-clock epoch ms of the last token-pressure warning. Never
    /// decreases.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token_warning_last_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token_warning_last_at_tokens: Option<u64>,
}

type SessionMap = BTreeMap<String, SessionEntry>;

/// File-backed map of session key to [`SessionEntry`].
#[derive(Clone, Debug)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole store without the lock (eventually-consistent view).
    pub fn load(&self) -> Result<BTreeMap<String, SessionEntry>, String> {
        read_json_store(&self.path)
    }

    /// Read one entry without the lock.
    pub fn get(&self, session_key: &str) -> Result<Option<SessionEntry>, String> {
        Ok(self.load()?.remove(session_key))
    }

    /// Update (or create) one entry under the store lock.
    ///
    /// The entry handed to the updater is the current persisted state, or a
    /// fresh one whose `session_id` is the session key. After the updater
    /// runs, `updated_at` and the rate-limit timestamps are clamped so they
    /// never move backwards.
    pub fn update_entry<R>(
        &self,
        session_key: &str,
        now_ms: i64,
        update: impl FnOnce(&mut SessionEntry) -> R,
    ) -> Result<R, String> {
        update_json_store::<SessionMap, R, _>(&self.path, |map| {
            let entry = map.entry(session_key.to_string()).or_insert_with(|| {
                SessionEntry {
                    session_id: session_key.to_string(),
                    ..Default::default()
                }
            });
            let prev_updated = entry.updated_at;
            let prev_compact_at = entry.session_auto_compact_last_at;
            let prev_warning_at = entry.session_token_warning_last_at;

            let value = update(entry);

            entry.updated_at = entry.updated_at.max(prev_updated).max(now_ms);
            entry.session_auto_compact_last_at =
                max_opt(entry.session_auto_compact_last_at, prev_compact_at);
            entry.session_token_warning_last_at =
                max_opt(entry.session_token_warning_last_at, prev_warning_at);
            Ok(value)
        })
    }

    /// Remove one entry under the store lock. Returns whether it existed.
    pub fn remove(&self, session_key: &str) -> Result<bool, String> {
        update_json_store::<SessionMap, bool, _>(&self.path, |map| {
            Ok(map.remove(session_key).is_some())
        })
    }
}

fn max_opt(new: Option<i64>, prev: Option<i64>) -> Option<i64> {
    match (new, prev) {
        (Some(n), Some(p)) => Some(n.max(p)),
        (None, prev) => prev,
        (new, None) => new,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("sessions.json"));
        (dir, store)
    }

    #[test]
    fn missing_file_is_empty() {
        let (_dir, store) = store();
        assert!(store.load().unwrap().is_empty());
        assert!(store.get("agent:main:1").unwrap().is_none());
    }

    #[test]
    fn create_and_update_entry() {
        let (_dir, store) = store();

        store
            .update_entry("agent:main:1", 1_000, |entry| {
                entry.total_tokens = Some(500);
                entry.context_tokens = Some(10_000);
            })
            .unwrap();

        let entry = store.get("agent:main:1").unwrap().unwrap();
        assert_eq!(entry.session_id, "agent:main:1");
        assert_eq!(entry.updated_at, 1_000);
        assert_eq!(entry.total_tokens, Some(500));

        store
            .update_entry("agent:main:1", 2_000, |entry| {
                entry.total_tokens = Some(900);
            })
            .unwrap();
        let entry = store.get("agent:main:1").unwrap().unwrap();
        assert_eq!(entry.updated_at, 2_000);
        assert_eq!(entry.total_tokens, Some(900));
        // context_tokens survives the second update.
        assert_eq!(entry.context_tokens, Some(10_000));
    }

    #[test]
    fn updated_at_never_decreases() {
        let (_dir, store) = store();
        store.update_entry("k", 5_000, |_| {}).unwrap();
        // An update with an older clock cannot move updated_at backwards.
        store.update_entry("k", 3_000, |_| {}).unwrap();
        assert_eq!(store.get("k").unwrap().unwrap().updated_at, 5_000);
    }

    #[test]
    fn rate_limit_timestamps_never_decrease() {
        let (_dir, store) = store();
        store
            .update_entry("k", 1_000, |entry| {
                entry.session_auto_compact_last_at = Some(9_000);
                entry.session_token_warning_last_at = Some(8_000);
            })
            .unwrap();
        store
            .update_entry("k", 2_000, |entry| {
                entry.session_auto_compact_last_at = Some(4_000);
                entry.session_token_warning_last_at = None;
            })
            .unwrap();

        let entry = store.get("k").unwrap().unwrap();
        assert_eq!(entry.session_auto_compact_last_at, Some(9_000));
        assert_eq!(entry.session_token_warning_last_at, Some(8_000));
    }

    #[test]
    fn remove_entry() {
        let (_dir, store) = store();
        store.update_entry("k", 1, |_| {}).unwrap();
        assert!(store.remove("k").unwrap());
        assert!(!store.remove("k").unwrap());
        assert!(store.get("k").unwrap().is_none());
    }

    #[test]
    fn entries_isolated_by_key() {
        let (_dir, store) = store();
        store
            .update_entry("a:1", 1, |e| e.total_tokens = Some(1))
            .unwrap();
        store
            .update_entry("b:2", 2, |e| e.total_tokens = Some(2))
            .unwrap();

        let map = store.load().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["a:1"].total_tokens, Some(1));
        assert_eq!(map["b:2"].total_tokens, Some(2));
    }

    #[test]
    fn concurrent_fresh_sessions_both_persist() {
        let (_dir, store) = store();
        let s1 = store.clone();
        let s2 = store.clone();

        let t1 = std::thread::spawn(move || {
            s1.update_entry("fresh:1", 100, |e| e.total_tokens = Some(11))
                .unwrap();
        });
        let t2 = std::thread::spawn(move || {
            s2.update_entry("fresh:2", 100, |e| e.total_tokens = Some(22))
                .unwrap();
        });
        t1.join().unwrap();
        t2.join().unwrap();

        let map = store.load().unwrap();
        assert_eq!(map.len(), 2, "one writer clobbered the other");
    }
}
