//! Flatten per-partition results, collapse copies of the same drug, order.

use rustc_hash::FxHashSet;
use rxsearch_core::{rank_order, RankedDrug};

use crate::config::MergeOrder;

#[derive(Debug, Default)]
pub struct Merged {
    pub items: Vec<RankedDrug>,
    /// Later copies dropped by deduplication.
    pub dropped: usize,
}

/// Flatten in partition order and keep the first occurrence of each dedup
/// key. Records without a key are never collapsed. With
/// [`MergeOrder::Score`] the survivors are stably re-sorted, so equal ranks
/// keep partition order.
pub fn merge(per_partition: Vec<Vec<RankedDrug>>, order: MergeOrder) -> Merged {
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut out = Merged::default();
    for hit in per_partition.into_iter().flatten() {
        if let Some(key) = hit.record.dedup_key() {
            if !seen.insert(key) {
                out.dropped += 1;
                continue;
            }
        }
        out.items.push(hit);
    }
    if order == MergeOrder::Score {
        out.items.sort_by(rank_order);
    }
    out
}
