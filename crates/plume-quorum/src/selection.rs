//! Replica selection and the quorum precondition check.
//!
//! Selection is a pure function of `(entry, n, q)`: slot `k` of an entry
//! maps to replica index `(entry + k) mod n`. The same inputs always
//! produce the same ordered index sequence.

use plume_core::{EntryId, LedgerError, Result};

/// Fail with `NotEnoughBookies` when the ensemble cannot satisfy the
/// quorum size.
pub fn check_quorum(ensemble_size: usize, quorum_size: usize) -> Result<()> {
    if ensemble_size < quorum_size {
        return Err(LedgerError::NotEnoughBookies {
            have: ensemble_size,
            need: quorum_size,
        });
    }
    Ok(())
}

/// Replica index for quorum slot `slot` of `entry` in an ensemble of
/// `ensemble_size` replicas.
pub fn slot_index(entry: EntryId, slot: usize, ensemble_size: usize) -> usize {
    ((entry.0 + slot as u64) % ensemble_size as u64) as usize
}

/// The `quorum_size` replica indices targeted for `entry`, in dispatch
/// order.
pub fn quorum_indices(entry: EntryId, ensemble_size: usize, quorum_size: usize) -> Vec<usize> {
    (0..quorum_size)
        .map(|slot| slot_index(entry, slot, ensemble_size))
        .collect()
}

/// Full ring walk for `entry`: every ensemble index once, starting at the
/// entry's offset. Used for replacement selection when a primary candidate
/// cannot be issued its send.
pub fn ring_indices(entry: EntryId, ensemble_size: usize) -> impl Iterator<Item = usize> {
    (0..ensemble_size).map(move |slot| slot_index(entry, slot, ensemble_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn quorum_check_rejects_small_ensembles() {
        assert!(check_quorum(3, 2).is_ok());
        assert!(check_quorum(2, 2).is_ok());
        let err = check_quorum(1, 2).expect_err("1 < 2 must fail");
        assert!(matches!(
            err,
            LedgerError::NotEnoughBookies { have: 1, need: 2 }
        ));
    }

    #[test]
    fn entry_five_in_ensemble_of_three() {
        // (5+0) % 3 = 2, (5+1) % 3 = 0
        assert_eq!(quorum_indices(EntryId(5), 3, 2), vec![2, 0]);
    }

    #[test]
    fn entry_ten_in_ensemble_of_three() {
        assert_eq!(quorum_indices(EntryId(10), 3, 2), vec![1, 2]);
    }

    #[test]
    fn ring_walk_covers_every_index_once() {
        let mut ring: Vec<usize> = ring_indices(EntryId(7), 5).collect();
        assert_eq!(ring, vec![2, 3, 4, 0, 1]);
        ring.sort_unstable();
        assert_eq!(ring, vec![0, 1, 2, 3, 4]);
    }

    proptest! {
        #[test]
        fn selection_is_deterministic_and_in_range(
            entry in 0u64..1_000_000,
            n in 1usize..64,
            q in 1usize..64,
        ) {
            prop_assume!(q <= n);
            let entry = EntryId(entry);
            let first = quorum_indices(entry, n, q);
            let second = quorum_indices(entry, n, q);
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.len(), q);
            for &index in &first {
                prop_assert!(index < n);
            }
        }

        #[test]
        fn indices_are_pairwise_distinct_when_quorum_fits(
            entry in 0u64..1_000_000,
            n in 1usize..64,
            q in 1usize..64,
        ) {
            prop_assume!(q <= n);
            let mut indices = quorum_indices(EntryId(entry), n, q);
            indices.sort_unstable();
            indices.dedup();
            prop_assert_eq!(indices.len(), q);
        }
    }
}
