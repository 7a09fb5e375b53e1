//! Fail-closed import of environment credentials into the profile store.
//!
//! For each known provider, the resolver walks an ordered list of candidate
//! environment variables (OAuth tokens before API keys) and produces at most
//! one credential. Autosync only ever *adds*: a provider that already has any
//! profile, or whose reserved `"<provider>:env"` id exists, is left alone.
//! One provider without credentials never stops the others, but any actual
//! error aborts the whole update with nothing written.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::auth::profiles::{AuthProfileStore, Credential};

/// What kind of credential an env var carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialKind {
    OAuthToken,
    ApiKey,
}

/// One candidate environment variable for a provider.
#[derive(Clone, Copy, Debug)]
pub struct EnvCandidate {
    pub var: &'static str,
    pub kind: CredentialKind,
}

const fn token(var: &'static str) -> EnvCandidate {
    EnvCandidate {
        var,
        kind: CredentialKind::OAuthToken,
    }
}

const fn api_key(var: &'static str) -> EnvCandidate {
    EnvCandidate {
        var,
        kind: CredentialKind::ApiKey,
    }
}

/// Providers eligible for env autosync, in evaluation order.
///
/// google-vertex is deliberately absent: it authenticates through external
/// credential providers, not env vars.
pub const KNOWN_PROVIDERS: &[&str] = &[
    "openai",
    "anthropic",
    "gemini",
    "groq",
    "cerebras",
    "xai",
    "openrouter",
    "moonshot",
    "mistral",
    "ollama",
    "chutes",
    "zai",
    "opencode",
    "qwen-portal",
    "minimax-portal",
    "kimi-coding",
    "github-copilot",
];

/// Ordered env-var candidates for a normalized provider id. OAuth tokens are
/// listed before API keys where a provider supports both.
pub fn env_candidates_for(provider: &str) -> &'static [EnvCandidate] {
    match provider {
        "openai" => &const { [api_key("OPENAI_API_KEY")] },
        "anthropic" => {
            &const { [token("ANTHROPIC_OAUTH_TOKEN"), api_key("ANTHROPIC_API_KEY")] }
        }
        "gemini" => &const { [api_key("GEMINI_API_KEY")] },
        "groq" => &const { [api_key("GROQ_API_KEY")] },
        "cerebras" => &const { [api_key("CEREBRAS_API_KEY")] },
        "xai" => &const { [api_key("XAI_API_KEY")] },
        "openrouter" => &const { [api_key("OPENROUTER_API_KEY")] },
        "moonshot" => &const { [api_key("MOONSHOT_API_KEY")] },
        "mistral" => &const { [api_key("MISTRAL_API_KEY")] },
        "ollama" => &const { [api_key("OLLAMA_API_KEY")] },
        "chutes" => &const { [token("CHUTES_OAUTH_TOKEN"), api_key("CHUTES_API_KEY")] },
        "zai" => &const { [token("ZAI_OAUTH_TOKEN"), api_key("ZAI_API_KEY")] },
        "opencode" => {
            &const { [token("OPENCODE_OAUTH_TOKEN"), api_key("OPENCODE_API_KEY")] }
        }
        "qwen-portal" => {
            &const { [token("QWEN_OAUTH_TOKEN"), api_key("QWEN_PORTAL_API_KEY")] }
        }
        "minimax-portal" => {
            &const { [token("MINIMAX_OAUTH_TOKEN"), api_key("MINIMAX_API_KEY")] }
        }
        "kimi-coding" => &const { [token("KIMI_OAUTH_TOKEN"), api_key("KIMI_API_KEY")] },
        // Copilot accepts several token vars, in this preference order.
        "github-copilot" => {
            &const {
                [
                    token("COPILOT_GITHUB_TOKEN"),
                    token("GH_TOKEN"),
                    token("GITHUB_TOKEN"),
                ]
            }
        }
        _ => &[],
    }
}

/// A snapshot of the environment, decoupled from `std::env` for testability
/// and so a shell-env layer can mark which vars it contributed.
#[derive(Clone, Debug, Default)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
    /// Vars that came from an applied shell profile rather than the process
    /// environment; their source label is prefixed accordingly.
    shell_sourced: BTreeSet<String>,
}

impl EnvSnapshot {
    /// Capture the current process environment.
    pub fn from_process_env() -> Self {
        Self {
            vars: std::env::vars().collect(),
            shell_sourced: BTreeSet::new(),
        }
    }

    pub fn set(mut self, var: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(var.into(), value.into());
        self
    }

    /// Mark a var as contributed by an applied shell profile.
    pub fn mark_shell_sourced(mut self, var: impl Into<String>) -> Self {
        self.shell_sourced.insert(var.into());
        self
    }

    fn get(&self, var: &str) -> Option<&str> {
        self.vars.get(var).map(String::as_str).filter(|v| !v.is_empty())
    }

    fn source_label(&self, var: &str) -> String {
        if self.shell_sourced.contains(var) {
            format!("shell-env:{var}")
        } else {
            format!("env:{var}")
        }
    }
}

/// A credential resolved from the environment, with its source label.
#[derive(Clone, Debug)]
pub struct ResolvedEnvCredential {
    pub credential: Credential,
    /// `"env:VAR"` or `"shell-env:VAR"`.
    pub source: String,
}

/// Resolve a provider's credential from the environment, if any candidate
/// var is set and non-empty. Earlier candidates win.
pub fn resolve_env_credential(
    provider: &str,
    env: &EnvSnapshot,
) -> Option<ResolvedEnvCredential> {
    for candidate in env_candidates_for(provider) {
        if let Some(value) = env.get(candidate.var) {
            let credential = match candidate.kind {
                CredentialKind::ApiKey => Credential::ApiKey {
                    provider: provider.to_string(),
                    key: value.to_string(),
                },
                CredentialKind::OAuthToken => Credential::Token {
                    provider: provider.to_string(),
                    token: value.to_string(),
                },
            };
            return Some(ResolvedEnvCredential {
                credential,
                source: env.source_label(candidate.var),
            });
        }
    }
    None
}

/// Profiles added by one autosync pass, by profile id and source label.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AutosyncReport {
    pub added: Vec<(String, String)>,
}

/// Import environment credentials into the store, fail-closed.
///
/// For each known provider, a profile `"<provider>:env"` is added only when
/// the provider currently has zero profiles, a credential resolves from the
/// environment, and the reserved id is absent. Existing profiles are never
/// overwritten. The whole pass is one locked update: if anything errors, no
/// partial state is written.
pub fn autosync_env_credentials_to_auth_profiles(
    store: &AuthProfileStore,
    env: &EnvSnapshot,
) -> Result<AutosyncReport, String> {
    store.update(|file| {
        let mut report = AutosyncReport::default();
        for provider in KNOWN_PROVIDERS {
            let profile_id = format!("{provider}:env");
            let has_any = file
                .profiles
                .values()
                .any(|cred| cred.provider() == *provider);
            if has_any || file.profiles.contains_key(&profile_id) {
                continue;
            }
            let Some(resolved) = resolve_env_credential(provider, env) else {
                debug!(provider, "no env credential for provider; skipping");
                continue;
            };
            info!(
                profile_id,
                source = resolved.source,
                "importing env credential into auth profiles"
            );
            file.profiles.insert(profile_id.clone(), resolved.credential);
            report.added.push((profile_id, resolved.source));
        }
        Ok(report)
    })
}
