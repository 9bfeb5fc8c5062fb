//! Narrow interfaces the client consumes from its host.
//!
//! Both are synchronous and side-effect only. They are called from inside the
//! session actor, so implementations must not block.

use lawbuddy_core::ClientError;
use tracing::{error, warn};

/// Source of the bearer credential sent at connect time.
pub trait CredentialProvider: Send {
    /// Current bearer token. `None` means the user must authenticate first.
    fn bearer_token(&self) -> Option<String>;
}

/// Fixed token, e.g. from the command line.
#[derive(Clone)]
pub struct StaticCredential(String);

impl StaticCredential {
    /// Wrap a token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticCredential(..)")
    }
}

impl CredentialProvider for StaticCredential {
    fn bearer_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Receives every error the client records.
pub trait ErrorSink: Send {
    /// Report one error.
    fn report(&mut self, error: &ClientError);
}

/// Logs errors with `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&mut self, err: &ClientError) {
        if err.requires_reauth() {
            error!(error = %err, "credential rejected");
        } else {
            warn!(error = %err, retryable = err.is_retryable(), "client error");
        }
    }
}
