/// Compaction module for stratadb
///
/// Compaction reads the merged, globally sorted stream of internal entries
/// from a set of overlapping runs and writes back a smaller equivalent
/// stream. The work happens in `CompactionIter`, a forward-only iterator
/// that collapses entries which are no longer observable:
///
/// ```text
/// [merged sorted input stream]
///         │
///         ▼
///  CompactionIter ──► point entries (to the run writer)
///         │
///         └─────────► fragmented range tombstones (drained via tombstones())
/// ```
///
/// ## Reduction rules
///
/// 1. **Shadowing**: for one user key, only the newest version inside a
///    snapshot stripe survives (`a.SET.2`, `a.SET.1` collapse to `a.SET.2`).
/// 2. **Tombstone elision**: a point deletion at the lowest stripe is
///    dropped when the elide predicate says no deeper run contains the key.
/// 3. **Merge folding**: consecutive MERGE operands fold newest-to-oldest;
///    folding into a SET relabels the result SET so deeper operands can
///    never recombine with it.
/// 4. **Snapshot stripes**: live snapshots partition the sequence axis;
///    collapsing never crosses a stripe boundary, so every snapshot keeps
///    its view of the database.
/// 5. **Range deletions**: range tombstones are fragmented into disjoint
///    pieces, filtered to the newest fragment per stripe, and consulted when
///    deciding whether a point entry is covered.
mod compaction_iter;

use crate::key::SEQ_NUM_MAX;

pub use compaction_iter::CompactionIter;

/// Locate the snapshot stripe of a sequence number.
///
/// Returns the index of the first snapshot strictly greater than `seq`
/// together with that snapshot's sequence number; entries in the topmost
/// stripe get the `SEQ_NUM_MAX` sentinel as their upper bound. An entry
/// whose sequence number equals a snapshot boundary lies above it.
pub fn snapshot_index(seq: u64, snapshots: &[u64]) -> (usize, u64) {
    let idx = snapshots.partition_point(|&s| s <= seq);
    match snapshots.get(idx) {
        Some(&bound) => (idx, bound),
        None => (idx, SEQ_NUM_MAX),
    }
}
