use bumpalo::Bump;

/// Region allocator for bytes that must outlive the input iterator.
///
/// Range-deletion tombstones survive inside the fragmenter until the writer
/// drains them, long after the input slices they were parsed from have been
/// invalidated. Cloning each key onto the heap would churn the allocator once
/// per tombstone; instead the compaction task owns an `Arena` and the
/// iterator copies tombstone keys into it. The whole region is released at
/// once when the task drops the arena.
#[derive(Default)]
pub struct Arena {
    bump: Bump,
}

impl Arena {
    pub fn new() -> Self {
        Arena { bump: Bump::new() }
    }

    /// Copy `data` into the arena, returning a slice that lives as long as
    /// the arena itself.
    pub fn alloc_slice<'a>(&'a self, data: &[u8]) -> &'a [u8] {
        self.bump.alloc_slice_copy(data)
    }

    /// Bytes currently allocated, for accounting
    pub fn allocated_bytes(&self) -> usize {
        self.bump.allocated_bytes()
    }

    /// Release every allocation. Requires exclusive access, so this can only
    /// happen between compactions.
    pub fn reset(&mut self) {
        self.bump.reset();
    }
}
