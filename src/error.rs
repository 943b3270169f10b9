//! Error types for the pre-commit batcher.

use thiserror::Error;

/// Errors surfaced by the batcher and its collaborators.
///
/// Payloads are strings so a single failure can be cloned into the result of
/// every sector it affected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatcherError {
    /// Current sealing configuration could not be read.
    #[error("getting config: {0}")]
    Config(String),

    /// A chain state read failed.
    #[error("chain query failed: {0}")]
    Query(String),

    /// Message params could not be serialized.
    #[error("encoding params: {0}")]
    Encoding(String),

    /// No address can fund the message.
    #[error("no good address to send from: {0}")]
    Funding(String),

    /// The aggregate fee could not be computed.
    #[error("getting aggregate precommit network fee: {0}")]
    Fee(String),

    /// The message was rejected or could not be pushed.
    #[error("sending message failed: {0}")]
    Transport(String),

    /// The sector's pre-commit cutoff is already behind the chain head.
    #[error("cutoff has already passed (cutoff {cutoff} <= curEpoch {current})")]
    CutoffPassed { cutoff: i64, current: i64 },

    /// Address has no ID form.
    #[error("address {0} is not an ID address")]
    Address(String),

    /// The caller's context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The batcher has been stopped.
    #[error("batcher stopped")]
    Stopped,
}

impl BatcherError {
    /// Errors that only affect the calling request.
    pub const fn is_caller_local(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn cutoff_passed_display() {
        let err = BatcherError::CutoffPassed { cutoff: 10, current: 12 };
        assert_eq!(err.to_string(), "cutoff has already passed (cutoff 10 <= curEpoch 12)");
    }

    #[test]
    fn transport_display() {
        let err = BatcherError::Transport("mpool full".to_string());
        assert_eq!(err.to_string(), "sending message failed: mpool full");
    }

    #[rstest]
    #[case(BatcherError::Cancelled, true)]
    #[case(BatcherError::Stopped, true)]
    #[case(BatcherError::Config("x".to_string()), false)]
    #[case(BatcherError::Query("x".to_string()), false)]
    #[case(BatcherError::Funding("x".to_string()), false)]
    #[case(BatcherError::Transport("x".to_string()), false)]
    fn is_caller_local(#[case] err: BatcherError, #[case] expected: bool) {
        assert_eq!(err.is_caller_local(), expected);
    }
}
