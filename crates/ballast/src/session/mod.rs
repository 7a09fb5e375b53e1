//! Session metadata persistence and the auto-compaction guard.
//!
//! - [`store`] — the lock-serialized JSON file mapping session keys to
//!   [`SessionEntry`](store::SessionEntry) metadata, including the
//!   rate-limit timestamps the guards depend on.
//! - [`autocompact`] — the decision logic for when a session's message log
//!   should be semantically compacted, plus the identically rate-limited
//!   token-pressure warning. The summarizer itself is a collaborator; this
//!   module only answers "now or not".

pub mod autocompact;
pub mod store;

// Re-export commonly used items at the module level.
pub use autocompact::{
    AutoCompactConfig, AutoCompactDecision, AutoCompactInput, AutoCompactOverrides,
    AutoCompactReason, TokenWarningConfig, decide_and_record_session_auto_compact,
    decide_and_record_session_token_warning, decide_session_auto_compact,
    has_oversized_message_for_summary, resolve_auto_compact_config,
};
pub use store::{SessionEntry, SessionStore};
