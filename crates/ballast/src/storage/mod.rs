//! Advisory-locked, atomically replaced JSON file stores.
//!
//! The session and credential stores share one update discipline: take an
//! exclusive advisory lock on a sibling `.lock` file, read the current JSON
//! (a missing file is an empty store; malformed JSON is a hard error and the
//! file is never rewritten), apply the caller's updater, and if the contents
//! changed, write a temp file, fsync it, and rename it into place. Concurrent
//! processes serialize on the lock, so no update is ever lost; readers that
//! can tolerate a slightly stale view may use [`read_json_store`] without
//! the lock.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Path of the advisory lock file guarding `path`.
pub fn lock_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_string());
    name.push_str(".lock");
    path.with_file_name(name)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = String::from(".");
    name.push_str(
        &path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store".to_string()),
    );
    name.push_str(".tmp");
    path.with_file_name(name)
}

/// Read a store without taking the lock (eventually-consistent view).
///
/// Missing file yields `T::default()`. Malformed JSON is fail-closed: the
/// error is surfaced and the file is left untouched.
pub fn read_json_store<T>(path: &Path) -> Result<T, String>
where
    T: Default + DeserializeOwned,
{
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(format!("failed to read store {}: {e}", path.display())),
    };
    serde_json::from_str(&raw)
        .map_err(|e| format!("malformed store file {}: {e}", path.display()))
}

/// Update a store under its advisory lock.
///
/// The updater sees the current contents and may return a value; its `Err`
/// aborts the update with nothing written. The file is only rewritten when
/// the serialized contents actually changed.
pub fn update_json_store<T, R, F>(path: &Path, update: F) -> Result<R, String>
where
    T: Default + Serialize + DeserializeOwned,
    F: FnOnce(&mut T) -> Result<R, String>,
{
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|e| format!("failed to create store dir {}: {e}", parent.display()))?;
    }

    let lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path(path))
        .map_err(|e| format!("failed to open lock file for {}: {e}", path.display()))?;
    lock_file
        .lock_exclusive()
        .map_err(|e| format!("failed to lock store {}: {e}", path.display()))?;

    // Everything below runs under the lock; the result is computed before
    // the lock is released so decide-and-record callers stay atomic.
    let result = (|| {
        let mut store: T = read_json_store(path)?;
        let before = serde_json::to_value(&store)
            .map_err(|e| format!("failed to serialize store {}: {e}", path.display()))?;

        let value = update(&mut store)?;

        let after = serde_json::to_value(&store)
            .map_err(|e| format!("failed to serialize store {}: {e}", path.display()))?;
        if after != before || !path.exists() {
            let rendered = serde_json::to_string_pretty(&after)
                .map_err(|e| format!("failed to serialize store {}: {e}", path.display()))?;
            write_atomic(path, &rendered)?;
            debug!(path = %path.display(), "store updated");
        }
        Ok(value)
    })();

    let _ = fs2::FileExt::unlock(&lock_file);
    result
}

/// Write `contents` to `path` via temp file, fsync, and rename.
fn write_atomic(path: &Path, contents: &str) -> Result<(), String> {
    let tmp = temp_path(path);
    {
        let mut file = File::create(&tmp)
            .map_err(|e| format!("failed to create temp store {}: {e}", tmp.display()))?;
        use std::io::Write;
        file.write_all(contents.as_bytes())
            .map_err(|e| format!("failed to write temp store {}: {e}", tmp.display()))?;
        file.sync_all()
            .map_err(|e| format!("failed to sync temp store {}: {e}", tmp.display()))?;
    }
    fs::rename(&tmp, path)
        .map_err(|e| format!("failed to move store into place {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    type Store = BTreeMap<String, u32>;

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store: Store = read_json_store(&path).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn update_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let returned = update_json_store::<Store, _, _>(&path, |store| {
            store.insert("a".into(), 1);
            Ok(store.len())
        })
        .unwrap();
        assert_eq!(returned, 1);

        let store: Store = read_json_store(&path).unwrap();
        assert_eq!(store.get("a"), Some(&1));
    }

    #[test]
    fn malformed_json_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "{not json").unwrap();

        let read: Result<Store, _> = read_json_store(&path);
        assert!(read.is_err());

        let update = update_json_store::<Store, _, _>(&path, |store| {
            store.insert("a".into(), 1);
            Ok(())
        });
        assert!(update.is_err());
        // The corrupt file was not rewritten.
        assert_eq!(fs::read_to_string(&path).unwrap(), "{not json");
    }

    #[test]
    fn updater_error_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        update_json_store::<Store, _, _>(&path, |store| {
            store.insert("keep".into(), 1);
            Ok(())
        })
        .unwrap();

        let failed = update_json_store::<Store, _, _>(&path, |store| {
            store.insert("discard".into(), 2);
            Err::<(), _>("nope".into())
        });
        assert!(failed.is_err());

        let store: Store = read_json_store(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.contains_key("keep"));
    }

    #[test]
    fn no_op_update_leaves_mtime_content_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        update_json_store::<Store, _, _>(&path, |store| {
            store.insert("a".into(), 1);
            Ok(())
        })
        .unwrap();
        let first = fs::read_to_string(&path).unwrap();

        update_json_store::<Store, _, _>(&path, |_| Ok(())).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), first);
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        update_json_store::<Store, _, _>(&path, |store| {
            store.insert("a".into(), 1);
            Ok(())
        })
        .unwrap();
        assert!(!temp_path(&path).exists());
        assert!(lock_path(&path).exists());
    }

    #[test]
    fn concurrent_writers_both_land() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let path = path.clone();
                std::thread::spawn(move || {
                    update_json_store::<Store, _, _>(&path, |store| {
                        store.insert(format!("writer-{i}"), i);
                        Ok(())
                    })
                    .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let store: Store = read_json_store(&path).unwrap();
        assert_eq!(store.len(), 8);
    }
}
