use std::cmp::Ordering;
use std::sync::Arc;

use log::{debug, warn};

use crate::compaction::snapshot_index;
use crate::iterator::InternalIterator;
use crate::key::{InternalKeyRef, ValueKind, SEQ_NUM_MAX};
use crate::merge::MergeOperator;
use crate::rangedel::{FragmentSink, Fragmenter, Tombstone};
use crate::statistics::CompactionStats;
use crate::util::{Arena, Comparator, Result, Status};

/// Stripe filtering of fragmented tombstones.
///
/// Receives each fragment chunk (identical range, sequence numbers
/// descending) and keeps only the newest fragment per snapshot stripe; the
/// survivors wait in `tombstones` until the writer drains them. At the
/// lowest stripe the optional range-elision hook may drop the fragment
/// entirely; nothing below the lowest stripe can exist, so filtering stops
/// there.
struct StripeFilter<'a> {
    snapshots: Vec<u64>,
    elide_range: Option<Box<dyn Fn(&[u8], &[u8]) -> bool + 'a>>,
    tombstones: Vec<Tombstone<'a>>,
}

impl<'a> FragmentSink<'a> for StripeFilter<'a> {
    fn emit(&mut self, chunk: Vec<Tombstone<'a>>) {
        let mut current_idx = None;
        for tombstone in chunk {
            let (idx, _) = snapshot_index(tombstone.start.seq, &self.snapshots);
            if current_idx == Some(idx) {
                continue;
            }
            if idx == 0 {
                let elided = self
                    .elide_range
                    .as_ref()
                    .is_some_and(|elide| elide(tombstone.start.user_key, tombstone.end));
                if !elided {
                    self.tombstones.push(tombstone);
                }
                break;
            }
            self.tombstones.push(tombstone);
            current_idx = Some(idx);
        }
    }
}

/// Forward-only iterator that collapses entries during compaction.
///
/// Wraps the merged input stream and emits one point entry per user key per
/// snapshot stripe, applying shadowing, merge folding, tombstone elision and
/// range-delete masking along the way. See the module documentation for the
/// reduction rules.
///
/// # Usage
///
/// ```ignore
/// let arena = Arena::new();
/// let mut iter = CompactionIter::new(
///     &arena,
///     Arc::new(BytewiseComparator),
///     Arc::new(CounterMerge),
///     input,
///     snapshots,
///     |key| !deeper_levels_contain(key),
/// );
/// let mut positioned = iter.first();
/// while positioned {
///     writer.add(iter.key(), iter.value())?;
///     positioned = iter.next();
/// }
/// writer.add_tombstones(iter.tombstones(None))?;
/// iter.close()?;
/// ```
///
/// The arena outlives the iterator and owns the bytes of every drained
/// tombstone; the compaction task resets it once the output run is durable.
pub struct CompactionIter<'a, I: InternalIterator> {
    cmp: Arc<dyn Comparator>,
    merge: Arc<dyn MergeOperator>,
    iter: I,
    arena: &'a Arena,
    elide_tombstone: Box<dyn Fn(&[u8]) -> bool + 'a>,
    /// Live snapshot sequence numbers, ascending. Empty means one stripe.
    snapshots: Vec<u64>,
    stats: Arc<CompactionStats>,
    frag: Fragmenter<'a, StripeFilter<'a>>,
    /// Buffers for the current entry, reused across positioning calls
    key_buf: Vec<u8>,
    value_buf: Vec<u8>,
    cur_seq: u64,
    cur_kind: ValueKind,
    valid: bool,
    /// Whether the remainder of the current stripe still has to be skipped
    /// before the next entry can be produced
    skip: bool,
    cur_snapshot_idx: usize,
    cur_snapshot_seq: u64,
    err: Option<Status>,
}

impl<'a, I: InternalIterator> CompactionIter<'a, I> {
    pub fn new(
        arena: &'a Arena,
        cmp: Arc<dyn Comparator>,
        merge: Arc<dyn MergeOperator>,
        iter: I,
        snapshots: Vec<u64>,
        elide_tombstone: impl Fn(&[u8]) -> bool + 'a,
    ) -> Self {
        debug_assert!(
            snapshots.windows(2).all(|w| w[0] < w[1]),
            "snapshot list must be sorted ascending without duplicates"
        );
        let filter = StripeFilter {
            snapshots: snapshots.clone(),
            elide_range: None,
            tombstones: Vec::new(),
        };
        CompactionIter {
            frag: Fragmenter::new(cmp.clone(), filter),
            cmp,
            merge,
            iter,
            arena,
            elide_tombstone: Box::new(elide_tombstone),
            snapshots,
            stats: Arc::new(CompactionStats::new()),
            key_buf: Vec::new(),
            value_buf: Vec::new(),
            cur_seq: 0,
            cur_kind: ValueKind::Invalid,
            valid: false,
            skip: false,
            cur_snapshot_idx: 0,
            cur_snapshot_seq: SEQ_NUM_MAX,
            err: None,
        }
    }

    /// Install the range-tombstone elision hook.
    ///
    /// Consulted only for fragments that reach the lowest stripe; when it
    /// answers true the fragment is dropped. Without the hook every fragment
    /// surviving stripe filtering is retained.
    pub fn with_elide_range(mut self, elide: impl Fn(&[u8], &[u8]) -> bool + 'a) -> Self {
        self.frag.sink_mut().elide_range = Some(Box::new(elide));
        self
    }

    /// Record reductions into a shared statistics handle
    pub fn with_statistics(mut self, stats: Arc<CompactionStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn statistics(&self) -> Arc<CompactionStats> {
        self.stats.clone()
    }

    /// Position on the first output entry. Must be called once, before any
    /// call to `next`.
    pub fn first(&mut self) -> bool {
        if self.err.is_some() {
            return false;
        }
        if let Err(e) = self.iter.seek_to_first() {
            self.latch(e);
            return false;
        }
        if self.iter.valid() {
            let seq = self.iter.key().seq;
            let (idx, bound) = snapshot_index(seq, &self.snapshots);
            self.cur_snapshot_idx = idx;
            self.cur_snapshot_seq = bound;
        }
        self.next()
    }

    /// Advance to the next output entry. Returns whether the iterator is
    /// positioned on a valid entry afterwards.
    pub fn next(&mut self) -> bool {
        if self.err.is_some() {
            return false;
        }

        if self.skip {
            self.skip = false;
            self.skip_stripe();
        }

        self.valid = false;
        while self.iter.valid() {
            if self.err.is_some() {
                return false;
            }
            let kind = self.iter.key().kind;
            match kind {
                ValueKind::Delete => {
                    if self.current_entry_masked() {
                        self.stats.record_masked();
                        self.save_key();
                        self.skip_stripe();
                        continue;
                    }
                    // At the lowest stripe a tombstone that shadows nothing
                    // below can disappear entirely.
                    if self.cur_snapshot_idx == 0
                        && (self.elide_tombstone)(self.iter.key().user_key)
                    {
                        self.stats.record_tombstone_elided();
                        self.save_key();
                        self.skip_stripe();
                        continue;
                    }

                    self.save_key();
                    self.save_value();
                    self.valid = true;
                    self.skip = true;
                    self.stats.record_emit();
                    return true;
                }

                ValueKind::RangeDelete => {
                    // Cloned into the arena and fragmented; never a point
                    // output. The stripe decision happens per fragment.
                    self.save_key();
                    self.add_range_tombstone();
                    if self.err.is_some() {
                        return false;
                    }
                    self.next_in_stripe();
                    continue;
                }

                ValueKind::Set => {
                    if self.current_entry_masked() {
                        self.stats.record_masked();
                        self.save_key();
                        self.skip_stripe();
                        continue;
                    }

                    self.save_key();
                    self.save_value();
                    self.valid = true;
                    self.skip = true;
                    self.stats.record_emit();
                    return true;
                }

                ValueKind::Merge => {
                    if self.current_entry_masked() {
                        self.stats.record_masked();
                        self.save_key();
                        self.skip_stripe();
                        continue;
                    }

                    return self.merge_next();
                }

                ValueKind::Invalid => {
                    // Keys that failed to parse are handed through unchanged
                    // so repair tooling can observe them.
                    self.save_key();
                    self.save_value();
                    self.stats.record_invalid_passed();
                    self.stats.record_emit();
                    if let Err(e) = self.iter.next() {
                        self.latch(e);
                    }
                    self.valid = true;
                    return true;
                }
            }
        }

        false
    }

    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Current output key. Valid until the next positioning call.
    pub fn key(&self) -> InternalKeyRef<'_> {
        InternalKeyRef::new(&self.key_buf, self.cur_seq, self.cur_kind)
    }

    /// Current output value. Valid until the next positioning call.
    pub fn value(&self) -> &[u8] {
        &self.value_buf
    }

    pub fn error(&self) -> Option<&Status> {
        self.err.as_ref()
    }

    /// Drain retained range-tombstone fragments whose start key is below
    /// `up_to`, splitting fragments that span the boundary. `None` finishes
    /// the fragmenter and drains everything that remains.
    pub fn tombstones(&mut self, up_to: Option<&[u8]>) -> Vec<Tombstone<'a>> {
        match up_to {
            Some(key) => {
                let boundary = self.arena.alloc_slice(key);
                self.frag.flush_to(boundary);
            }
            None => self.frag.finish(),
        }
        std::mem::take(&mut self.frag.sink_mut().tombstones)
    }

    /// Close the input iterator and report the first error seen, if any
    pub fn close(&mut self) -> Result<()> {
        if let Err(e) = self.iter.close() {
            if self.err.is_none() {
                self.err = Some(e);
            }
        }
        debug!(
            "compaction iterator closed: {} entries emitted, {} shadowed, {} elided",
            self.stats.entries_emitted(),
            self.stats.entries_shadowed(),
            self.stats.tombstones_elided()
        );
        match &self.err {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// Whether a fragmenter tombstone covers the current input entry within
    /// the current stripe
    fn current_entry_masked(&self) -> bool {
        self.frag.deleted(self.iter.key(), self.cur_snapshot_seq)
    }

    /// Skip the remaining entries of the current user key's current stripe
    fn skip_stripe(&mut self) {
        while self.next_in_stripe() {
            if self.iter.key().kind != ValueKind::RangeDelete {
                self.stats.record_shadowed();
            }
        }
    }

    /// Advance the input one entry. Returns true while the new entry belongs
    /// to the same user key and snapshot stripe as the current one; on a key
    /// or stripe change the stripe bookkeeping is updated and false is
    /// returned. Range tombstones encountered on the way are always fed to
    /// the fragmenter.
    fn next_in_stripe(&mut self) -> bool {
        if let Err(e) = self.iter.next() {
            self.latch(e);
            return false;
        }
        if !self.iter.valid() {
            return false;
        }

        let (kind, seq, same_user_key) = {
            let key = self.iter.key();
            (
                key.kind,
                key.seq,
                self.cmp.compare(&self.key_buf, key.user_key) == Ordering::Equal,
            )
        };

        if !same_user_key {
            let (idx, bound) = snapshot_index(seq, &self.snapshots);
            self.cur_snapshot_idx = idx;
            self.cur_snapshot_seq = bound;
            return false;
        }

        match kind {
            ValueKind::RangeDelete => {
                self.add_range_tombstone();
                return self.err.is_none();
            }
            ValueKind::Invalid => {
                let (idx, bound) = snapshot_index(seq, &self.snapshots);
                self.cur_snapshot_idx = idx;
                self.cur_snapshot_seq = bound;
                return false;
            }
            _ => {}
        }

        if self.snapshots.is_empty() {
            return true;
        }
        let (idx, bound) = snapshot_index(seq, &self.snapshots);
        if idx == self.cur_snapshot_idx {
            return true;
        }
        self.cur_snapshot_idx = idx;
        self.cur_snapshot_seq = bound;
        false
    }

    /// Fold MERGE operands forward within the current stripe.
    ///
    /// The accumulator starts at the newest operand. Older MERGE operands
    /// fold in one by one; a SET folds in once and relabels the output SET
    /// so that operands in deeper levels can never recombine with it; a
    /// tombstone below the accumulator ends the fold with the accumulator
    /// emitted as a MERGE, because everything older is definitively gone.
    fn merge_next(&mut self) -> bool {
        self.save_key();
        self.save_value();
        self.valid = true;

        loop {
            if !self.next_in_stripe() {
                if self.err.is_some() {
                    self.valid = false;
                    return false;
                }
                self.skip = false;
                self.stats.record_emit();
                return true;
            }

            let kind = self.iter.key().kind;
            match kind {
                ValueKind::Delete | ValueKind::RangeDelete => {
                    self.skip = true;
                    self.stats.record_emit();
                    return true;
                }

                ValueKind::Set => {
                    if self.current_entry_masked() {
                        self.skip = true;
                        self.stats.record_emit();
                        return true;
                    }
                    self.fold_current_operand();
                    self.cur_kind = ValueKind::Set;
                    self.skip = true;
                    self.stats.record_emit();
                    return true;
                }

                ValueKind::Merge => {
                    if self.current_entry_masked() {
                        self.skip = true;
                        self.stats.record_emit();
                        return true;
                    }
                    self.fold_current_operand();
                }

                ValueKind::Invalid => {
                    self.latch(Status::corruption(
                        "unexpected entry kind while folding merge operands",
                    ));
                    self.valid = false;
                    return false;
                }
            }
        }
    }

    /// Merge the input's current value under the accumulator
    fn fold_current_operand(&mut self) {
        self.stats.record_merge_fold();
        self.value_buf = self
            .merge
            .merge(&self.key_buf, &self.value_buf, self.iter.value());
    }

    /// Clone the current range tombstone into the arena and fragment it
    fn add_range_tombstone(&mut self) {
        self.stats.record_range_tombstone();
        let arena = self.arena;
        let (start, end) = {
            let key = self.iter.key();
            (
                InternalKeyRef::new(
                    arena.alloc_slice(key.user_key),
                    key.seq,
                    ValueKind::RangeDelete,
                ),
                arena.alloc_slice(self.iter.value()),
            )
        };
        if let Err(e) = self.frag.add(start, end) {
            self.latch(e);
        }
    }

    /// Copy the input's current user key and trailer into the reused buffer
    fn save_key(&mut self) {
        let key = self.iter.key();
        self.cur_seq = key.seq;
        self.cur_kind = key.kind;
        let user_key = key.user_key;
        self.key_buf.clear();
        self.key_buf.extend_from_slice(user_key);
    }

    /// Copy the input's current value into the reused buffer
    fn save_value(&mut self) {
        let value = self.iter.value();
        self.value_buf.clear();
        self.value_buf.extend_from_slice(value);
    }

    fn latch(&mut self, e: Status) {
        warn!("compaction halted: {e}");
        if self.err.is_none() {
            self.err = Some(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::VecIterator;
    use crate::key::InternalKey;
    use crate::merge::StringAppendMerge;
    use crate::util::BytewiseComparator;

    fn put(key: &str, seq: u64, value: &str) -> (InternalKey, Vec<u8>) {
        (
            InternalKey::new(key, seq, ValueKind::Set),
            value.as_bytes().to_vec(),
        )
    }

    fn del(key: &str, seq: u64) -> (InternalKey, Vec<u8>) {
        (InternalKey::new(key, seq, ValueKind::Delete), Vec::new())
    }

    fn merge(key: &str, seq: u64, value: &str) -> (InternalKey, Vec<u8>) {
        (
            InternalKey::new(key, seq, ValueKind::Merge),
            value.as_bytes().to_vec(),
        )
    }

    fn range_del(start: &str, seq: u64, end: &str) -> (InternalKey, Vec<u8>) {
        (
            InternalKey::new(start, seq, ValueKind::RangeDelete),
            end.as_bytes().to_vec(),
        )
    }

    /// Run a compaction to exhaustion, returning owned point entries and
    /// drained tombstones.
    fn compact(
        entries: Vec<(InternalKey, Vec<u8>)>,
        snapshots: Vec<u64>,
        elide: bool,
    ) -> (Vec<(InternalKey, Vec<u8>)>, Vec<(InternalKey, Vec<u8>)>) {
        let arena = Arena::new();
        let mut iter = CompactionIter::new(
            &arena,
            Arc::new(BytewiseComparator),
            Arc::new(StringAppendMerge::new(",")),
            VecIterator::new(entries),
            snapshots,
            move |_key| elide,
        );
        let mut points = Vec::new();
        let mut positioned = iter.first();
        while positioned {
            points.push((iter.key().to_owned(), iter.value().to_vec()));
            positioned = iter.next();
        }
        assert!(iter.error().is_none(), "unexpected error: {:?}", iter.error());
        let tombstones = iter
            .tombstones(None)
            .into_iter()
            .map(|t| (t.start.to_owned(), t.end.to_vec()))
            .collect();
        iter.close().unwrap();
        (points, tombstones)
    }

    #[test]
    fn test_shadowed_versions_collapse() {
        let (points, _) = compact(
            vec![put("a", 2, "new"), put("a", 1, "old"), put("b", 3, "vb")],
            vec![],
            false,
        );
        assert_eq!(
            points,
            vec![put("a", 2, "new"), put("b", 3, "vb")]
        );
    }

    #[test]
    fn test_snapshot_keeps_one_version_per_stripe() {
        let (points, _) = compact(
            vec![put("a", 9, "v9"), put("a", 7, "v7"), put("a", 5, "v5")],
            vec![6],
            false,
        );
        // seq 9 and 7 share the upper stripe; seq 5 sits below the snapshot
        assert_eq!(points, vec![put("a", 9, "v9"), put("a", 5, "v5")]);
    }

    #[test]
    fn test_delete_emitted_without_elision() {
        let (points, _) = compact(vec![del("a", 5), put("a", 3, "v")], vec![], false);
        assert_eq!(points, vec![del("a", 5)]);
    }

    #[test]
    fn test_delete_elided_at_lowest_stripe() {
        let (points, _) = compact(vec![del("a", 5), put("a", 3, "v")], vec![], true);
        assert!(points.is_empty());
    }

    #[test]
    fn test_delete_not_elided_above_lowest_stripe() {
        let (points, _) = compact(vec![del("a", 5), put("a", 1, "v")], vec![3], true);
        // the deletion lives in the upper stripe, so it still shadows the
        // snapshot's view and must survive
        assert_eq!(points, vec![del("a", 5), put("a", 1, "v")]);
    }

    #[test]
    fn test_merge_operands_fold_newest_to_oldest() {
        let (points, _) = compact(
            vec![merge("a", 4, "v4"), merge("a", 3, "v3"), merge("a", 2, "v2")],
            vec![],
            false,
        );
        assert_eq!(points, vec![merge("a", 4, "v2,v3,v4")]);
    }

    #[test]
    fn test_merge_into_set_relabels_set() {
        let (points, _) = compact(
            vec![merge("a", 3, "m"), put("a", 2, "base")],
            vec![],
            false,
        );
        assert_eq!(points, vec![put("a", 3, "base,m")]);
    }

    #[test]
    fn test_merge_stops_at_delete() {
        let (points, _) = compact(
            vec![merge("a", 5, "m"), del("a", 4), put("a", 3, "buried")],
            vec![],
            false,
        );
        // the tombstone ends the fold; the accumulator stays a MERGE and
        // the delete itself is shadowed within the stripe
        assert_eq!(points, vec![merge("a", 5, "m")]);
    }

    #[test]
    fn test_merge_folds_per_stripe() {
        let (points, _) = compact(
            vec![merge("a", 5, "hi"), merge("a", 3, "lo")],
            vec![4],
            false,
        );
        assert_eq!(points, vec![merge("a", 5, "hi"), merge("a", 3, "lo")]);
    }

    #[test]
    fn test_point_masked_by_range_tombstone() {
        let (points, tombstones) = compact(
            vec![range_del("a", 5, "m"), put("c", 3, "v")],
            vec![],
            false,
        );
        assert!(points.is_empty());
        assert_eq!(
            tombstones,
            vec![(InternalKey::new("a", 5, ValueKind::RangeDelete), b"m".to_vec())]
        );
    }

    #[test]
    fn test_point_newer_than_range_tombstone_survives() {
        let (points, _) = compact(
            vec![range_del("a", 5, "m"), put("c", 7, "v")],
            vec![],
            false,
        );
        assert_eq!(points, vec![put("c", 7, "v")]);
    }

    #[test]
    fn test_range_tombstone_in_lower_stripe_does_not_mask() {
        // tombstone seq 2 sits below the snapshot; the point at seq 1 is in
        // the same lower stripe, so masking applies there but not to seq 3
        let (points, _) = compact(
            vec![range_del("a", 2, "m"), put("c", 3, "new"), put("c", 1, "old")],
            vec![2],
            false,
        );
        assert_eq!(points, vec![put("c", 3, "new")]);
    }

    #[test]
    fn test_invalid_entry_passes_through() {
        let invalid = (
            InternalKey::new("a", 7, ValueKind::Invalid),
            b"garbage".to_vec(),
        );
        let (points, _) = compact(
            vec![invalid.clone(), put("b", 3, "v")],
            vec![],
            false,
        );
        assert_eq!(points, vec![invalid, put("b", 3, "v")]);
    }

    #[test]
    fn test_tombstones_drained_incrementally() {
        let arena = Arena::new();
        let mut iter = CompactionIter::new(
            &arena,
            Arc::new(BytewiseComparator),
            Arc::new(StringAppendMerge::new(",")),
            VecIterator::new(vec![range_del("a", 4, "z"), put("q", 9, "v")]),
            vec![],
            |_| false,
        );
        assert!(iter.first());
        assert_eq!(iter.key().user_key, b"q");

        // drain the piece below "m"; the remainder stays pending
        let early = iter.tombstones(Some(b"m"));
        assert_eq!(early.len(), 1);
        assert_eq!(early[0].start.user_key, b"a");
        assert_eq!(early[0].end, b"m");

        assert!(!iter.next());
        let rest = iter.tombstones(None);
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].start.user_key, b"m");
        assert_eq!(rest[0].end, b"z");
        iter.close().unwrap();
    }

    #[test]
    fn test_statistics_record_reductions() {
        let arena = Arena::new();
        let stats = Arc::new(CompactionStats::new());
        let mut iter = CompactionIter::new(
            &arena,
            Arc::new(BytewiseComparator),
            Arc::new(StringAppendMerge::new(",")),
            VecIterator::new(vec![
                put("a", 5, "new"),
                put("a", 4, "old"),
                merge("b", 3, "x"),
                merge("b", 2, "y"),
                del("c", 1),
            ]),
            vec![],
            |_| true,
        )
        .with_statistics(stats.clone());

        let mut positioned = iter.first();
        while positioned {
            positioned = iter.next();
        }
        iter.close().unwrap();

        assert_eq!(stats.entries_emitted(), 2); // a@5 and b@3
        assert_eq!(stats.entries_shadowed(), 1); // a@4
        assert_eq!(stats.merge_operands_folded(), 1); // y into x
        assert_eq!(stats.tombstones_elided(), 1); // c@1
    }
}
