//! Range-deletion tombstone fragmentation
//!
//! A range deletion covers `[start, end)` at one sequence number. Because
//! tombstones from different runs overlap arbitrarily, answering "which
//! tombstones cover this key" requires splitting them on the user-key axis
//! into fragments that are pairwise disjoint or identical in range. The
//! `Fragmenter` performs that split incrementally as tombstones arrive in
//! start-key order, emitting finished fragment chunks through a
//! `FragmentSink`.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::key::{InternalKeyRef, ValueKind};
use crate::util::{Comparator, Result, Status};

/// A fragmented range-deletion tombstone: deletes user keys in
/// `[start.user_key, end)` written before `start.seq`.
///
/// The key bytes live in the compaction arena, so fragments stay usable
/// after the input iterator has moved on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tombstone<'a> {
    pub start: InternalKeyRef<'a>,
    pub end: &'a [u8],
}

impl<'a> Tombstone<'a> {
    pub fn new(start: InternalKeyRef<'a>, end: &'a [u8]) -> Self {
        Tombstone { start, end }
    }

    pub fn sequence(&self) -> u64 {
        self.start.seq
    }

    /// Whether `key` falls inside the tombstone's user-key range
    pub fn contains(&self, cmp: &dyn Comparator, key: &[u8]) -> bool {
        cmp.compare(self.start.user_key, key) != Ordering::Greater
            && cmp.compare(key, self.end) == Ordering::Less
    }
}

/// Receives finished fragment chunks from the fragmenter.
///
/// Each chunk holds fragments with an identical user-key range, ordered by
/// descending sequence number; successive chunks arrive in ascending range
/// order. The compaction iterator installs a sink that applies snapshot
/// stripe filtering before retaining fragments for the writer.
pub trait FragmentSink<'a> {
    fn emit(&mut self, chunk: Vec<Tombstone<'a>>);
}

/// Splits overlapping range tombstones into disjoint fragments.
///
/// Tombstones must be added in start-key order (the order the compaction
/// input stream yields them). All pending tombstones share one start key;
/// when a later start key or an explicit flush boundary arrives, the pending
/// set is cut at that boundary, the finished pieces are emitted, and the
/// remainders carry on with the boundary as their new start.
pub struct Fragmenter<'a, S: FragmentSink<'a>> {
    cmp: Arc<dyn Comparator>,
    sink: S,
    pending: Vec<Tombstone<'a>>,
    finished: bool,
}

impl<'a, S: FragmentSink<'a>> Fragmenter<'a, S> {
    pub fn new(cmp: Arc<dyn Comparator>, sink: S) -> Self {
        Fragmenter {
            cmp,
            sink,
            pending: Vec::new(),
            finished: false,
        }
    }

    /// Add a tombstone covering `[start.user_key, end)` at `start.seq`.
    ///
    /// Start keys must arrive in comparator order; an out-of-order start is
    /// input corruption.
    pub fn add(&mut self, start: InternalKeyRef<'a>, end: &'a [u8]) -> Result<()> {
        if self.finished {
            return Err(Status::invalid_argument(
                "tombstone added after fragmenter finish",
            ));
        }
        if let Some(last) = self.pending.last() {
            match self.cmp.compare(last.start.user_key, start.user_key) {
                Ordering::Greater => {
                    return Err(Status::corruption("range tombstones added out of order"));
                }
                Ordering::Equal => {}
                Ordering::Less => self.truncate_and_flush(start.user_key),
            }
        }
        self.pending.push(Tombstone::new(start, end));
        Ok(())
    }

    /// Whether a pending tombstone deletes `key` within the current stripe.
    ///
    /// True when some tombstone covers `key.user_key` with a sequence number
    /// at least `key.seq` and no greater than `snapshot`, the upper bound of
    /// the stripe being reduced.
    pub fn deleted(&self, key: InternalKeyRef<'_>, snapshot: u64) -> bool {
        self.pending.iter().any(|t| {
            t.contains(self.cmp.as_ref(), key.user_key)
                && t.start.seq >= key.seq
                && t.start.seq <= snapshot
        })
    }

    /// Emit every fragment whose start key is `< to`, splitting tombstones
    /// that span the boundary.
    pub fn flush_to(&mut self, to: &'a [u8]) {
        if self
            .pending
            .first()
            .is_some_and(|t| self.cmp.compare(t.start.user_key, to) == Ordering::Less)
        {
            self.truncate_and_flush(to);
        }
    }

    /// Emit all remaining fragments. Further adds are rejected.
    pub fn finish(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        self.flush_chunks(pending);
        self.finished = true;
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Cut the pending set at `to`: pieces below the boundary are emitted,
    /// pieces at or above it stay pending with `to` as their start.
    fn truncate_and_flush(&mut self, to: &'a [u8]) {
        let mut done = Vec::new();
        let mut rest = Vec::new();
        for t in self.pending.drain(..) {
            if self.cmp.compare(t.end, to) != Ordering::Greater {
                done.push(t);
            } else {
                if self.cmp.compare(t.start.user_key, to) == Ordering::Less {
                    done.push(Tombstone::new(t.start, to));
                }
                rest.push(Tombstone::new(
                    InternalKeyRef::new(to, t.start.seq, ValueKind::RangeDelete),
                    t.end,
                ));
            }
        }
        self.pending = rest;
        self.flush_chunks(done);
    }

    /// Split a set of same-start tombstones into fragments at each distinct
    /// end key and emit one chunk per fragment range.
    fn flush_chunks(&mut self, mut done: Vec<Tombstone<'a>>) {
        if done.is_empty() {
            return;
        }
        done.sort_by(|a, b| self.cmp.compare(a.end, b.end));

        let mut lo = done[0].start.user_key;
        let mut idx = 0;
        while idx < done.len() {
            let hi = done[idx].end;
            if self.cmp.compare(lo, hi) == Ordering::Less {
                // Every tombstone from idx onward ends at or beyond hi and
                // started at or before lo, so each contributes to [lo, hi).
                let mut chunk: Vec<Tombstone<'a>> = done[idx..]
                    .iter()
                    .map(|t| {
                        Tombstone::new(
                            InternalKeyRef::new(lo, t.start.seq, ValueKind::RangeDelete),
                            hi,
                        )
                    })
                    .collect();
                chunk.sort_by(|a, b| b.start.seq.cmp(&a.start.seq));
                self.sink.emit(chunk);
                lo = hi;
            }
            while idx < done.len() && self.cmp.compare(done[idx].end, hi) == Ordering::Equal {
                idx += 1;
            }
        }
    }
}
