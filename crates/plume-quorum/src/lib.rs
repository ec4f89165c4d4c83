//! Quorum-replication dispatch engine for the plume ledger client
//!
//! For every logical entry written to or read from a ledger, this crate
//! selects a quorum-size subset of replica storage nodes (bookies), issues
//! one send per selected replica through the per-replica transport, and
//! tracks the operation until the aggregation collaborator declares it
//! complete or unreachable.
//!
//! # Architecture
//!
//! - **Operations**: the `Add`/`Read`/`Stop` request envelopes
//! - **Selection**: deterministic round-robin-from-offset replica indices
//! - **Sub-operations**: per-replica send descriptors with a completion
//!   trampoline back into the aggregation collaborator
//! - **Engine**: the `submit` entry point driving sub-operations to the
//!   transport, with bounded local retry on immediate send failure
//!
//! The transport, the ack/nack aggregation policy, and the callback
//! delivery worker are external collaborators behind the [`boundary`]
//! traits.

pub mod boundary;
pub mod completion;
pub mod engine;
pub mod ledger;
pub mod operation;
pub mod selection;
pub mod subop;

pub use boundary::{BookieClient, CallbackWorker, QuorumMonitor};
pub use completion::CompletionSignal;
pub use engine::QuorumEngine;
pub use ledger::LedgerContext;
pub use operation::{
    AddCallback, AddOp, LedgerEntry, Operation, OperationKind, ReadCallback, ReadOp,
};
pub use subop::{PendingAdd, PendingRead, SubAddOp, SubReadOp};

// Core type re-exports
pub use plume_core::{
    BookieId, DispatchConfig, EntryId, ErrorCode, LedgerError, LedgerId, OpId, OpIdAllocator,
    Result, RetryConfig, SendError,
};
