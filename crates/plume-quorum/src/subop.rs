//! Per-replica send descriptors and their shared pending trackers.
//!
//! A sub-operation binds one replica index to its parent operation for a
//! single send attempt. It is created per attempt and not retained once
//! the transport call returns or its trampoline fires; the shared pending
//! tracker, not the descriptor, is authoritative for completion.

use crate::boundary::QuorumMonitor;
use crate::operation::Operation;
use plume_core::{EntryId, ErrorCode};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Ack/nack tally shared by every sub-operation of one add.
#[derive(Debug, Default)]
pub struct PendingAdd {
    acks: AtomicU32,
    nacks: AtomicU32,
}

impl PendingAdd {
    /// Fresh tracker with zero responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one positive response; returns the new ack total.
    pub fn record_ack(&self) -> u32 {
        self.acks.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Count one negative response; returns the new nack total.
    pub fn record_nack(&self) -> u32 {
        self.nacks.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Positive responses observed so far.
    pub fn acks(&self) -> u32 {
        self.acks.load(Ordering::Acquire)
    }

    /// Negative responses observed so far.
    pub fn nacks(&self) -> u32 {
        self.nacks.load(Ordering::Acquire)
    }
}

/// Ack/nack tally shared by every sub-operation targeting one entry of a
/// read.
#[derive(Debug)]
pub struct PendingRead {
    entry: EntryId,
    acks: AtomicU32,
    nacks: AtomicU32,
}

impl PendingRead {
    /// Fresh tracker for `entry`.
    pub fn new(entry: EntryId) -> Self {
        Self {
            entry,
            acks: AtomicU32::new(0),
            nacks: AtomicU32::new(0),
        }
    }

    /// The entry this tracker covers.
    pub fn entry(&self) -> EntryId {
        self.entry
    }

    /// Count one positive response; returns the new ack total.
    pub fn record_ack(&self) -> u32 {
        self.acks.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Count one negative response; returns the new nack total.
    pub fn record_nack(&self) -> u32 {
        self.nacks.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Positive responses observed so far.
    pub fn acks(&self) -> u32 {
        self.acks.load(Ordering::Acquire)
    }

    /// Negative responses observed so far.
    pub fn nacks(&self) -> u32 {
        self.nacks.load(Ordering::Acquire)
    }
}

/// One replica-targeted write send on behalf of an add operation.
#[derive(Clone)]
pub struct SubAddOp {
    op: Arc<Operation>,
    pending: Arc<PendingAdd>,
    bookie_index: usize,
    trampoline: Arc<dyn QuorumMonitor>,
}

impl SubAddOp {
    /// Bind slot `bookie_index` of `op` to a single send attempt.
    pub fn new(
        op: Arc<Operation>,
        pending: Arc<PendingAdd>,
        bookie_index: usize,
        trampoline: Arc<dyn QuorumMonitor>,
    ) -> Self {
        Self {
            op,
            pending,
            bookie_index,
            trampoline,
        }
    }

    /// Parent operation.
    pub fn op(&self) -> &Arc<Operation> {
        &self.op
    }

    /// Tracker shared across all sub-operations of the parent add.
    pub fn pending(&self) -> &Arc<PendingAdd> {
        &self.pending
    }

    /// Replica index within the ensemble snapshot used at dispatch time.
    /// May go stale if the ensemble changes afterward.
    pub fn bookie_index(&self) -> usize {
        self.bookie_index
    }

    /// Report this send's outcome into the aggregation collaborator.
    ///
    /// Called by the transport when the replica responds (or the engine,
    /// for a slot that could not be issued at all).
    pub fn complete(self, code: ErrorCode) {
        let trampoline = Arc::clone(&self.trampoline);
        trampoline.write_complete(code, self);
    }
}

/// One replica-targeted read send for a single entry of a read operation.
#[derive(Clone)]
pub struct SubReadOp {
    op: Arc<Operation>,
    pending: Arc<PendingRead>,
    bookie_index: usize,
    trampoline: Arc<dyn QuorumMonitor>,
}

impl SubReadOp {
    /// Bind one read send for `pending.entry()` to replica `bookie_index`.
    pub fn new(
        op: Arc<Operation>,
        pending: Arc<PendingRead>,
        bookie_index: usize,
        trampoline: Arc<dyn QuorumMonitor>,
    ) -> Self {
        Self {
            op,
            pending,
            bookie_index,
            trampoline,
        }
    }

    /// Parent operation.
    pub fn op(&self) -> &Arc<Operation> {
        &self.op
    }

    /// Tracker shared across all sub-operations for this entry.
    pub fn pending(&self) -> &Arc<PendingRead> {
        &self.pending
    }

    /// The entry this send targets.
    pub fn entry(&self) -> EntryId {
        self.pending.entry()
    }

    /// Replica index within the ensemble snapshot used at dispatch time.
    pub fn bookie_index(&self) -> usize {
        self.bookie_index
    }

    /// Report this send's outcome into the aggregation collaborator,
    /// carrying the entry payload on success.
    pub fn complete(self, code: ErrorCode, payload: Option<Vec<u8>>) {
        let trampoline = Arc::clone(&self.trampoline);
        trampoline.read_complete(code, self, payload);
    }
}
