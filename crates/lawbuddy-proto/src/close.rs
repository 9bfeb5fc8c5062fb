//! Socket close signals.

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Server hit an unexpected condition.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Server rejected the bearer credential. Never retried.
pub const CLOSE_AUTH_FAILED: u16 = 4001;

/// Why the transport closed.
///
/// `code` is `None` when the socket dropped without a close frame (network
/// loss, connect failure, timeout).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// Close code from the peer's close frame
    pub code: Option<u16>,
    /// Human-readable reason
    pub reason: String,
}

impl CloseInfo {
    /// Close with an explicit code.
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self { code: Some(code), reason: reason.into() }
    }

    /// Transport loss without a close frame.
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self { code: None, reason: reason.into() }
    }

    /// Server rejected the credential; reconnecting cannot succeed.
    #[must_use]
    pub fn is_fatal_auth(&self) -> bool {
        self.code == Some(CLOSE_AUTH_FAILED)
    }
}

impl std::fmt::Display for CloseInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "closed ({code}): {}", self.reason),
            None => write!(f, "connection lost: {}", self.reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_auth_code_is_fatal() {
        assert!(CloseInfo::new(CLOSE_AUTH_FAILED, "Authentication failed").is_fatal_auth());
        assert!(!CloseInfo::new(CLOSE_NORMAL, "bye").is_fatal_auth());
        assert!(!CloseInfo::new(CLOSE_INTERNAL_ERROR, "Internal server error").is_fatal_auth());
        assert!(!CloseInfo::abnormal("reset by peer").is_fatal_auth());
    }
}
