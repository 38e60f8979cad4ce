//! Collection error taxonomy
//!
//! Transient failures (network, timeout) are retried and then skipped
//! for the cycle; anything else is a per-source fault that is logged
//! and never retried.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("network failure for {source_id}: {message}")]
    Network { source_id: String, message: String },

    #[error("{source_id} timed out after {after:?}")]
    Timeout { source_id: String, after: Duration },

    #[error("malformed payload from {source_id}: {message}")]
    Payload { source_id: String, message: String },

    #[error("source {0} is disabled")]
    Disabled(String),
}

impl CollectError {
    /// Transient errors are worth retrying within the same cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CollectError::Network { .. } | CollectError::Timeout { .. }
        )
    }

    pub fn source_id(&self) -> &str {
        match self {
            CollectError::Network { source_id, .. }
            | CollectError::Timeout { source_id, .. }
            | CollectError::Payload { source_id, .. } => source_id,
            CollectError::Disabled(source_id) => source_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_network_and_timeout_are_transient() {
        let net = CollectError::Network {
            source_id: "feed".into(),
            message: "reset".into(),
        };
        let bad = CollectError::Payload {
            source_id: "feed".into(),
            message: "truncated json".into(),
        };
        assert!(net.is_transient());
        assert!(!bad.is_transient());
        assert!(!CollectError::Disabled("feed".into()).is_transient());
    }
}
