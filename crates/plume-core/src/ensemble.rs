//! Copy-on-read view of a ledger's replica ensemble.
//!
//! Selection math must see one consistent ensemble size per decision, so
//! readers take an `Arc` snapshot and never observe a half-applied change.

use std::sync::{Arc, RwLock};

/// One immutable snapshot of the ordered replica list.
#[derive(Debug)]
pub struct Ensemble<B> {
    replicas: Vec<B>,
    version: u64,
}

impl<B> Ensemble<B> {
    /// Build the initial ensemble (version 0).
    pub fn new(replicas: Vec<B>) -> Self {
        Self {
            replicas,
            version: 0,
        }
    }

    /// Number of replicas in this snapshot.
    pub fn size(&self) -> usize {
        self.replicas.len()
    }

    /// Replica at `index`, which must come from selection math over
    /// this snapshot's `size()`.
    pub fn replica(&self, index: usize) -> &B {
        &self.replicas[index]
    }

    /// Ordered replica list.
    pub fn replicas(&self) -> &[B] {
        &self.replicas
    }

    /// Monotonic snapshot version, bumped on every replacement.
    pub fn version(&self) -> u64 {
        self.version
    }
}

/// Shared, versioned holder of the current [`Ensemble`].
///
/// Writers install whole replacement snapshots; readers clone the `Arc`
/// and do all index math against that one snapshot.
#[derive(Debug)]
pub struct EnsembleView<B> {
    current: RwLock<Arc<Ensemble<B>>>,
}

impl<B> EnsembleView<B> {
    /// Create a view over the initial replica list.
    pub fn new(replicas: Vec<B>) -> Self {
        Self {
            current: RwLock::new(Arc::new(Ensemble::new(replicas))),
        }
    }

    /// Take a consistent snapshot of the current ensemble.
    pub fn snapshot(&self) -> Arc<Ensemble<B>> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            // A poisoned lock still holds a valid snapshot; writers only
            // swap the Arc.
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Install a replacement replica list as a new snapshot.
    pub fn replace(&self, replicas: Vec<B>) {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let version = guard.version + 1;
        *guard = Arc::new(Ensemble { replicas, version });
    }
}
