//! Credential storage and environment autosync.
//!
//! - [`profiles`] — the versioned, lock-serialized `auth-profiles.json`
//!   store. Credential values are redacted from all Debug output.
//! - [`env_sync`] — fail-closed import of provider credentials from the
//!   environment into the reserved `"<provider>:env"` profile ids.

pub mod env_sync;
pub mod profiles;

// Re-export commonly used items at the module level.
pub use env_sync::{
    AutosyncReport, EnvSnapshot, KNOWN_PROVIDERS, autosync_env_credentials_to_auth_profiles,
    env_candidates_for, resolve_env_credential,
};
pub use profiles::{AUTH_PROFILES_VERSION, AuthProfileStore, AuthProfilesFile, Credential};
