//! Ledger context: the metadata surface the engine dispatches against.

use crate::boundary::BookieClient;
use plume_core::{EnsembleView, EntryId, LedgerId, OpIdAllocator};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Per-ledger state consumed by the dispatch engine: the fixed quorum
/// size, the current replica ensemble, and the atomic next-entry-id
/// allocator.
pub struct LedgerContext {
    id: LedgerId,
    quorum_size: usize,
    ensemble: EnsembleView<Arc<dyn BookieClient>>,
    next_entry: AtomicU64,
    op_ids: Arc<OpIdAllocator>,
}

impl LedgerContext {
    /// Create a context for `id` with the given quorum size, initial
    /// replica handles, and first entry id to allocate.
    pub fn new(
        id: LedgerId,
        quorum_size: usize,
        bookies: Vec<Arc<dyn BookieClient>>,
        first_entry: EntryId,
        op_ids: Arc<OpIdAllocator>,
    ) -> Self {
        Self {
            id,
            quorum_size,
            ensemble: EnsembleView::new(bookies),
            next_entry: AtomicU64::new(first_entry.0),
            op_ids,
        }
    }

    /// Ledger identifier.
    pub fn id(&self) -> LedgerId {
        self.id
    }

    /// Quorum size, fixed for the lifetime of the ledger.
    pub fn quorum_size(&self) -> usize {
        self.quorum_size
    }

    /// The copy-on-read view of the current replica ensemble.
    pub fn ensemble(&self) -> &EnsembleView<Arc<dyn BookieClient>> {
        &self.ensemble
    }

    /// Allocate the next entry id.
    ///
    /// A single atomic increment per ledger: concurrent adds never
    /// receive the same id, and ids are consecutive in allocation order.
    pub fn allocate_entry_id(&self) -> EntryId {
        EntryId(self.next_entry.fetch_add(1, Ordering::SeqCst))
    }

    /// The shared operation-id allocator.
    pub fn op_ids(&self) -> &Arc<OpIdAllocator> {
        &self.op_ids
    }
}
