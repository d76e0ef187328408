// =============================================================================
// Core Error Taxonomy
// =============================================================================
//
// The error kinds from the error-handling design: each variant carries enough
// context to decide policy (retry, degrade, or propagate to process exit) at
// the call site. `CoreError` is the typed error surfaced by Store, Bus,
// Collector, and Signal Monitor APIs; callers that just need to propagate
// upward continue to use `anyhow::Result` with `.context(...)`, the way the
// rest of this codebase does.
// =============================================================================

use thiserror::Error;

/// Typed error kinds shared by Store, Bus, Collector, and Signal Monitor.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Missing or invalid upstream credentials. Fatal at collector start;
    /// at runtime the caller should degrade to `unhealthy` rather than spin.
    #[error("authentication required: {0}")]
    AuthRequired(String),

    /// The Store (or another required backend) is unreachable. Retryable
    /// with backoff; if it persists past 30s the caller should exit non-zero.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A transient failure — upstream timeout, one malformed message.
    /// Callers log and count, then continue.
    #[error("transient error: {0}")]
    Transient(String),

    /// A contract violation — unknown channel, disallowed ACL, quota
    /// breach, duplicate signal registration. No state change is made.
    #[error("contract violation: {0}")]
    Contract(String),

    /// A logic error surfaced as a terminal signal state (e.g. a predicate
    /// referencing an unknown indicator).
    #[error("logic error: {0}")]
    Logic(String),

    /// A key existed but could not be decoded. Treated as `NotFound` by
    /// callers after logging; the corrupt value is never deleted.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// No tick/bar/record has ever been written under the requested key.
    #[error("not found: {0}")]
    NotFound(String),
}

impl CoreError {
    /// True for error kinds that the caller should retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::BackendUnavailable(_) | CoreError::Transient(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
