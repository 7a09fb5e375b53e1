//! Lock-serialized credential store.
//!
//! Auth profiles live in a versioned JSON file, one credential per profile
//! id. The file follows the shared advisory-lock update discipline, and
//! credential material never reaches the logs: the `Debug` impl redacts key
//! and token values.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::storage::{read_json_store, update_json_store};

/// Current store file format version.
pub const AUTH_PROFILES_VERSION: u32 = 1;

/// Default store file name inside the agent directory.
pub const AUTH_PROFILES_FILE: &str = "auth-profiles.json";

/// One stored credential.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credential {
    ApiKey { provider: String, key: String },
    Token { provider: String, token: String },
}

impl Credential {
    pub fn provider(&self) -> &str {
        match self {
            Credential::ApiKey { provider, .. } | Credential::Token { provider, .. } => provider,
        }
    }
}

// Credential material must never leak through Debug formatting in logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::ApiKey { provider, .. } => f
                .debug_struct("ApiKey")
                .field("provider", provider)
                .field("key", &"<redacted>")
                .finish(),
            Credential::Token { provider, .. } => f
                .debug_struct("Token")
                .field("provider", provider)
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

/// On-disk shape of the store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AuthProfilesFile {
    pub version: u32,
    #[serde(default)]
    pub profiles: BTreeMap<String, Credential>,
}

impl Default for AuthProfilesFile {
    fn default() -> Self {
        Self {
            version: AUTH_PROFILES_VERSION,
            profiles: BTreeMap::new(),
        }
    }
}

/// File-backed credential store.
#[derive(Clone, Debug)]
pub struct AuthProfileStore {
    path: PathBuf,
}

impl AuthProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The conventional location inside an agent directory.
    pub fn default_path(agent_dir: &Path) -> PathBuf {
        agent_dir.join(AUTH_PROFILES_FILE)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole store without the lock.
    pub fn load(&self) -> Result<AuthProfilesFile, String> {
        read_json_store(&self.path)
    }

    /// Read one profile without the lock.
    pub fn get(&self, profile_id: &str) -> Result<Option<Credential>, String> {
        Ok(self.load()?.profiles.remove(profile_id))
    }

    /// Update the store under its lock. The updater's `Err` aborts with
    /// nothing written.
    pub fn update<R>(
        &self,
        update: impl FnOnce(&mut AuthProfilesFile) -> Result<R, String>,
    ) -> Result<R, String> {
        update_json_store(&self.path, update)
    }

    /// Insert or replace one profile.
    pub fn put(&self, profile_id: &str, credential: Credential) -> Result<(), String> {
        self.update(|file| {
            file.profiles.insert(profile_id.to_string(), credential);
            Ok(())
        })
    }

    /// Remove one profile. Returns whether it existed.
    pub fn remove(&self, profile_id: &str) -> Result<bool, String> {
        self.update(|file| Ok(file.profiles.remove(profile_id).is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, AuthProfileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = AuthProfileStore::new(AuthProfileStore::default_path(dir.path()));
        (dir, store)
    }

    #[test]
    fn missing_file_is_empty_versioned_store() {
        let (_dir, store) = store();
        let file = store.load().unwrap();
        assert_eq!(file.version, AUTH_PROFILES_VERSION);
        assert!(file.profiles.is_empty());
    }

    #[test]
    fn put_get_remove() {
        let (_dir, store) = store();
        store
            .put(
                "anthropic:work",
                Credential::ApiKey {
                    provider: "anthropic".into(),
                    key: "sk-test".into(),
                },
            )
            .unwrap();

        let cred = store.get("anthropic:work").unwrap().unwrap();
        assert_eq!(cred.provider(), "anthropic");

        assert!(store.remove("anthropic:work").unwrap());
        assert!(!store.remove("anthropic:work").unwrap());
    }

    #[test]
    fn file_format_matches_contract() {
        let (_dir, store) = store();
        store
            .put(
                "openai:env",
                Credential::ApiKey {
                    provider: "openai".into(),
                    key: "sk-abc".into(),
                },
            )
            .unwrap();
        store
            .put(
                "github-copilot:env",
                Credential::Token {
                    provider: "github-copilot".into(),
                    token: "gho_xyz".into(),
                },
            )
            .unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["profiles"]["openai:env"]["type"], "api_key");
        assert_eq!(json["profiles"]["openai:env"]["key"], "sk-abc");
        assert_eq!(json["profiles"]["github-copilot:env"]["type"], "token");
    }

    #[test]
    fn debug_redacts_credential_material() {
        let cred = Credential::ApiKey {
            provider: "openai".into(),
            key: "sk-supersecret".into(),
        };
        let debug = format!("{cred:?}");
        assert!(!debug.contains("supersecret"));
        assert!(debug.contains("<redacted>"));

        let token = Credential::Token {
            provider: "zai".into(),
            token: "tok-private".into(),
        };
        let debug = format!("{token:?}");
        assert!(!debug.contains("tok-private"));
    }

    #[test]
    fn updater_error_aborts_whole_update() {
        let (_dir, store) = store();
        store
            .put(
                "openai:env",
                Credential::ApiKey {
                    provider: "openai".into(),
                    key: "sk-1".into(),
                },
            )
            .unwrap();

        let failed = store.update(|file| {
            file.profiles.clear();
            Err::<(), _>("abort".into())
        });
        assert!(failed.is_err());
        assert_eq!(store.load().unwrap().profiles.len(), 1);
    }
}
