//! Boundary traits for the engine's external collaborators.
//!
//! The engine consumes three collaborators it does not implement: the
//! per-replica transport, the ack/nack aggregation policy, and the
//! callback delivery worker. Each is specified here only through the
//! contract the dispatch path relies on.

use crate::ledger::LedgerContext;
use crate::operation::Operation;
use crate::subop::{SubAddOp, SubReadOp};
use async_trait::async_trait;
use plume_core::{EntryId, ErrorCode, SendError};
use std::sync::Arc;

/// Per-replica transport handle, one per ensemble member.
///
/// Both send methods are non-blocking: they only *issue* the request.
/// The replica's eventual ack or nack is reported asynchronously through
/// the sub-operation's trampoline, off the dispatch thread. An `Err`
/// return is an immediate failure (the request was never issued), which
/// is distinct from an asynchronous nack.
pub trait BookieClient: Send + Sync {
    /// Whether this replica should currently be targeted.
    fn is_enabled(&self) -> bool;

    /// Issue an asynchronous write of `entry` to this replica.
    fn send_add(
        &self,
        ledger: &LedgerContext,
        sub: SubAddOp,
        entry: EntryId,
    ) -> Result<(), SendError>;

    /// Issue an asynchronous read of `entry` from this replica.
    fn send_read(
        &self,
        ledger: &LedgerContext,
        sub: SubReadOp,
        entry: EntryId,
    ) -> Result<(), SendError>;
}

/// Aggregation collaborator: owns the quorum completion decision.
///
/// Receives one registration per operation before any sub-operation is
/// dispatched, then one report per completed sub-operation, delivered by
/// the transport through the trampoline attached to each descriptor. It
/// alone decides when an operation's completion signal fires (the
/// per-entry unreachability threshold, `n - q + 1` nacks, is this
/// collaborator's policy).
pub trait QuorumMonitor: Send + Sync {
    /// Register `op` before its first sub-operation is dispatched.
    fn register_op(&self, op: &Arc<Operation>);

    /// A write sub-operation finished with `code`.
    fn write_complete(&self, code: ErrorCode, sub: SubAddOp);

    /// A read sub-operation finished with `code`, carrying the entry
    /// payload on success.
    fn read_complete(&self, code: ErrorCode, sub: SubReadOp, payload: Option<Vec<u8>>);
}

/// Callback delivery collaborator: invokes user callbacks off the
/// dispatch path.
#[async_trait]
pub trait CallbackWorker: Send + Sync {
    /// Register `op` at submission time so its eventual completion is
    /// deliverable.
    fn register_op(&self, op: &Arc<Operation>);

    /// Hand a completed operation over for user callback delivery.
    /// Called by the aggregation collaborator once the completion signal
    /// has fired.
    fn deliver(&self, op: Arc<Operation>);

    /// Drain previously enqueued completions, then stop. Deliveries
    /// requested after shutdown are dropped with a warning rather than
    /// silently lost.
    async fn shutdown(&self);
}
