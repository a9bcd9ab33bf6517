use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds for the turn orchestration core.
///
/// Upstream failures are classified at the provider boundary so that the
/// retry and fallback layers can decide on the kind alone: only
/// `TransientUpstream` is ever retried, everything else moves straight to
/// the next model or surfaces to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Rate limit, timeout, or 5xx-equivalent upstream failure. Retried
    /// with backoff.
    #[error("transient upstream failure: {0}")]
    TransientUpstream(String),

    /// Auth or bad-request-equivalent upstream failure. Never retried,
    /// but still allows fallback to the next model.
    #[error("upstream rejected request: {0}")]
    NonTransientUpstream(String),

    /// Every registered model failed within one invocation cycle.
    #[error("all {tried} models exhausted; last error: {last}")]
    AllModelsExhausted { tried: usize, last: String },

    /// Unknown provider, model, tool, or thread. Surfaced immediately.
    #[error("not found: {0}")]
    NotFound(String),

    /// The turn used more tool-call rounds than configured.
    #[error("turn exceeded {0} tool-call rounds")]
    TurnBudgetExceeded(usize),

    /// The turn as a whole ran past its timeout budget.
    #[error("turn timed out after {0:?}")]
    TurnTimeout(Duration),

    /// Token counting failed for the active model. Recovered locally by
    /// the window preparer; never crosses the component boundary.
    #[error("token counting failed: {0}")]
    TokenCounting(String),

    /// A message failed boundary validation (empty, oversized, bad role).
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the retry wrapper should attempt this call again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientUpstream(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_upstream_is_retryable() {
        assert!(Error::TransientUpstream("429".into()).is_transient());
        assert!(!Error::NonTransientUpstream("401".into()).is_transient());
        assert!(!Error::NotFound("gpt-x".into()).is_transient());
        assert!(!Error::Database("locked".into()).is_transient());
    }

    #[test]
    fn exhaustion_error_carries_last_cause() {
        let err = Error::AllModelsExhausted {
            tried: 4,
            last: "status 503".into(),
        };
        let text = err.to_string();
        assert!(text.contains("4 models"));
        assert!(text.contains("status 503"));
    }
}
