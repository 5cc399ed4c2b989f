use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the reductions performed by one or more compactions
///
/// Uses relaxed atomics so a handle can be shared with an engine-wide
/// statistics sink while the single-threaded iterator records into it.
#[derive(Debug, Default)]
pub struct CompactionStats {
    /// Point entries handed to the writer
    pub entries_emitted: AtomicU64,
    /// Entries dropped because a newer version exists in the same stripe
    pub entries_shadowed: AtomicU64,
    /// Point deletions dropped at the lowest stripe
    pub tombstones_elided: AtomicU64,
    /// Point entries dropped under a covering range tombstone
    pub entries_masked: AtomicU64,
    /// MERGE operands folded into an accumulator
    pub merge_operands_folded: AtomicU64,
    /// Range tombstones fed to the fragmenter
    pub range_tombstones_added: AtomicU64,
    /// Unparseable entries passed through for repair tooling
    pub invalid_entries_passed: AtomicU64,
}

impl CompactionStats {
    pub fn new() -> Self {
        CompactionStats::default()
    }

    #[inline]
    pub fn record_emit(&self) {
        self.entries_emitted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_shadowed(&self) {
        self.entries_shadowed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_tombstone_elided(&self) {
        self.tombstones_elided.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_masked(&self) {
        self.entries_masked.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_merge_fold(&self) {
        self.merge_operands_folded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_range_tombstone(&self) {
        self.range_tombstones_added.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_invalid_passed(&self) {
        self.invalid_entries_passed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn entries_emitted(&self) -> u64 {
        self.entries_emitted.load(Ordering::Relaxed)
    }

    pub fn entries_shadowed(&self) -> u64 {
        self.entries_shadowed.load(Ordering::Relaxed)
    }

    pub fn tombstones_elided(&self) -> u64 {
        self.tombstones_elided.load(Ordering::Relaxed)
    }

    pub fn entries_masked(&self) -> u64 {
        self.entries_masked.load(Ordering::Relaxed)
    }

    pub fn merge_operands_folded(&self) -> u64 {
        self.merge_operands_folded.load(Ordering::Relaxed)
    }

    pub fn range_tombstones_added(&self) -> u64 {
        self.range_tombstones_added.load(Ordering::Relaxed)
    }

    pub fn invalid_entries_passed(&self) -> u64 {
        self.invalid_entries_passed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero
    pub fn reset(&self) {
        self.entries_emitted.store(0, Ordering::Relaxed);
        self.entries_shadowed.store(0, Ordering::Relaxed);
        self.tombstones_elided.store(0, Ordering::Relaxed);
        self.entries_masked.store(0, Ordering::Relaxed);
        self.merge_operands_folded.store(0, Ordering::Relaxed);
        self.range_tombstones_added.store(0, Ordering::Relaxed);
        self.invalid_entries_passed.store(0, Ordering::Relaxed);
    }
}
