#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use stratadb::{
    Arena, BytewiseComparator, CompactionIter, CounterMerge, InternalKey, ValueKind, VecIterator,
};

// Fuzz target for the compaction iterator.
// Decodes arbitrary bytes into an entry stream over a small key alphabet and
// checks that compaction never panics, emits sorted output, and closes
// cleanly no matter how the kinds, snapshots and ranges interleave.
fuzz_target!(|data: &[u8]| {
    if data.len() < 6 {
        return;
    }

    let mut entries = Vec::new();
    let total = (data.len() / 3) as u64 + 1;
    for (n, chunk) in data.chunks_exact(3).enumerate() {
        let seq = total - n as u64;
        let key = vec![b'a' + chunk[0] % 8];
        match chunk[1] % 10 {
            0..=3 => entries.push((
                InternalKey::new(key, seq, ValueKind::Set),
                vec![chunk[2]],
            )),
            4..=5 => entries.push((InternalKey::new(key, seq, ValueKind::Delete), Vec::new())),
            6..=7 => entries.push((
                InternalKey::new(key, seq, ValueKind::Merge),
                format!("{}", chunk[2] % 100).into_bytes(),
            )),
            8 => {
                let start = chunk[0] % 8;
                let span = 1 + chunk[2] % 7;
                let end = vec![b'a' + (start + span).min(8)];
                entries.push((
                    InternalKey::new(vec![b'a' + start], seq, ValueKind::RangeDelete),
                    end,
                ));
            }
            _ => entries.push((
                InternalKey::new(key, seq, ValueKind::Invalid),
                vec![chunk[2]],
            )),
        }
    }

    let mut snapshots: Vec<u64> = [total / 4, total / 2, 3 * total / 4]
        .into_iter()
        .filter(|&s| s > 0)
        .collect();
    snapshots.dedup();
    let elide = data[0] & 1 == 0;

    let arena = Arena::new();
    let mut iter = CompactionIter::new(
        &arena,
        Arc::new(BytewiseComparator),
        Arc::new(CounterMerge),
        VecIterator::new(entries),
        snapshots,
        move |_key| elide,
    );

    let mut last: Option<InternalKey> = None;
    let mut positioned = iter.first();
    while positioned {
        let key = iter.key().to_owned();
        if let Some(prev) = &last {
            assert!(
                prev < &key,
                "output out of order: {prev:?} then {key:?}"
            );
        }
        last = Some(key);
        positioned = iter.next();
    }

    let tombstones = iter.tombstones(None);
    for pair in tombstones.windows(2) {
        assert!(pair[0].start.user_key <= pair[1].start.user_key);
    }

    iter.close().unwrap();
});
