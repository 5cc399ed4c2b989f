pub mod compaction;
pub mod iterator;
pub mod key;
pub mod merge;
pub mod rangedel;
pub mod statistics;
pub mod util;

pub use compaction::{snapshot_index, CompactionIter};
pub use iterator::{InternalIterator, VecIterator};
pub use key::{InternalKey, InternalKeyRef, ValueKind, SEQ_NUM_MAX};
pub use merge::{CounterMerge, MergeOperator, StringAppendMerge};
pub use rangedel::{FragmentSink, Fragmenter, Tombstone};
pub use statistics::CompactionStats;
pub use util::{Arena, BytewiseComparator, Comparator, Result, Status};
