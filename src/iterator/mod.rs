/// Input iterator contract for compaction
///
/// Compaction consumes a single forward iterator positioned over internal
/// entries in global sort order: ascending user key, then descending
/// sequence number, then descending kind. The heap merge that combines the
/// overlapping input runs into this stream lives in the engine, not here;
/// anything satisfying this trait can feed a compaction.
///
/// # Borrowed bytes
///
/// `key()` and `value()` return views into the iterator's current position.
/// They are invalidated by the next call on the iterator, so a caller that
/// retains bytes must copy them first. The compaction iterator copies into
/// its own buffers and never holds input bytes across an advance.
///
/// # Errors
///
/// `seek_to_first` and `next` surface I/O errors from the underlying run
/// readers. After an error the iterator is invalid; `close` releases any
/// held resources and reports a deferred error if one exists.
use crate::key::InternalKeyRef;
use crate::util::Result;

pub trait InternalIterator {
    /// Position at the first entry
    ///
    /// Returns Ok(true) if positioned, Ok(false) if the source is empty
    fn seek_to_first(&mut self) -> Result<bool>;

    /// Move to the next entry
    ///
    /// Returns Ok(true) if moved to a valid entry, Ok(false) at the end
    fn next(&mut self) -> Result<bool>;

    /// Check if the iterator is positioned at a valid entry
    fn valid(&self) -> bool;

    /// Current key
    ///
    /// Prerequisite: valid() == true
    fn key(&self) -> InternalKeyRef<'_>;

    /// Current value; for range deletions this is the exclusive end key
    ///
    /// Prerequisite: valid() == true
    fn value(&self) -> &[u8];

    /// Release the input source
    fn close(&mut self) -> Result<()>;
}

mod vec_iterator;

pub use vec_iterator::VecIterator;
