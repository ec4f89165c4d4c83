//! Error taxonomy for the ledger client.

use crate::ids::EntryId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Terminal result code recorded on a completed operation.
///
/// Set at most once by the aggregation collaborator (or by the dispatch
/// engine for synchronous precondition failures) and read by the
/// user-facing callback.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ErrorCode {
    /// Operation completed successfully.
    #[default]
    Ok,
    /// Ensemble smaller than the configured quorum size at dispatch time.
    NotEnoughBookies,
    /// A targeted replica could not be issued the send for its slot.
    BookieUnavailable,
    /// Enough replicas nacked a write that quorum is provably unreachable.
    QuorumUnreachable,
    /// A read entry could not be recovered from any targeted replica.
    ReadMissingEntry,
    /// The ledger (or its engine) was closed before completion.
    LedgerClosed,
    /// Request parameters were malformed (e.g. a reversed read range).
    InvalidRequest,
}

impl ErrorCode {
    /// Whether this code denotes success.
    pub fn is_ok(self) -> bool {
        matches!(self, ErrorCode::Ok)
    }

    /// Convert a completion code into a `Result`, for callers that wait
    /// synchronously on an operation.
    pub fn ok_or_err(self) -> Result<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(LedgerError::Failed(self))
        }
    }
}

/// Errors surfaced synchronously from the dispatch path.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Ensemble too small to satisfy the quorum precondition.
    #[error("not enough bookies: have {have}, need {need}")]
    NotEnoughBookies {
        /// Current ensemble size.
        have: usize,
        /// Configured quorum size.
        need: usize,
    },

    /// The engine has processed a stop operation and accepts no more work.
    #[error("quorum engine is stopped")]
    EngineStopped,

    /// A read range with `first > last`.
    #[error("invalid read range: {first}..{last}")]
    InvalidReadRange {
        /// Requested range start.
        first: EntryId,
        /// Requested range end.
        last: EntryId,
    },

    /// An operation terminated with a non-ok result code.
    #[error("operation failed: {0:?}")]
    Failed(ErrorCode),
}

impl LedgerError {
    /// The result code equivalent of this error, as recorded on an
    /// operation's completion signal.
    pub fn code(&self) -> ErrorCode {
        match self {
            LedgerError::NotEnoughBookies { .. } => ErrorCode::NotEnoughBookies,
            LedgerError::EngineStopped => ErrorCode::LedgerClosed,
            LedgerError::InvalidReadRange { .. } => ErrorCode::InvalidRequest,
            LedgerError::Failed(code) => *code,
        }
    }
}

/// Immediate failure raised by a transport send call.
///
/// Distinct from an asynchronous nack: the request was never issued.
#[derive(Debug, Clone, Error)]
pub enum SendError {
    /// No usable connection to the replica right now.
    #[error("no connection to replica")]
    NoConnection,
    /// The replica's channel is closed and will not come back.
    #[error("replica channel closed: {reason}")]
    ChannelClosed {
        /// Transport-provided close reason.
        reason: String,
    },
}

/// Result type for ledger client operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
