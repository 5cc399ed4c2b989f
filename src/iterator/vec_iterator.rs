use crate::iterator::InternalIterator;
use crate::key::{InternalKey, InternalKeyRef};
use crate::util::Result;

/// In-memory input iterator backed by a vector of entries
///
/// Sorts its entries into global order on construction (bytewise user-key
/// order). Used by tests and benches as the merged input stream; an engine
/// would supply a heap merge over its runs instead.
pub struct VecIterator {
    entries: Vec<(InternalKey, Vec<u8>)>,
    position: Option<usize>,
}

impl VecIterator {
    pub fn new(mut entries: Vec<(InternalKey, Vec<u8>)>) -> Self {
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        VecIterator {
            entries,
            position: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl InternalIterator for VecIterator {
    fn seek_to_first(&mut self) -> Result<bool> {
        self.position = if self.entries.is_empty() {
            None
        } else {
            Some(0)
        };
        Ok(self.position.is_some())
    }

    fn next(&mut self) -> Result<bool> {
        self.position = match self.position {
            Some(i) if i + 1 < self.entries.len() => Some(i + 1),
            _ => None,
        };
        Ok(self.position.is_some())
    }

    fn valid(&self) -> bool {
        self.position.is_some()
    }

    fn key(&self) -> InternalKeyRef<'_> {
        let (key, _) = &self.entries[self.position.expect("iterator not positioned")];
        key.as_ref()
    }

    fn value(&self) -> &[u8] {
        let (_, value) = &self.entries[self.position.expect("iterator not positioned")];
        value
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::ValueKind;

    fn entry(key: &str, seq: u64, kind: ValueKind, value: &str) -> (InternalKey, Vec<u8>) {
        (
            InternalKey::new(key.as_bytes().to_vec(), seq, kind),
            value.as_bytes().to_vec(),
        )
    }

    #[test]
    fn test_empty() {
        let mut iter = VecIterator::new(vec![]);
        assert!(!iter.seek_to_first().unwrap());
        assert!(!iter.valid());
    }

    #[test]
    fn test_sorts_into_global_order() {
        let mut iter = VecIterator::new(vec![
            entry("b", 1, ValueKind::Set, "vb"),
            entry("a", 2, ValueKind::Set, "new"),
            entry("a", 9, ValueKind::Delete, ""),
        ]);

        assert!(iter.seek_to_first().unwrap());
        assert_eq!(iter.key().user_key, b"a");
        assert_eq!(iter.key().seq, 9);

        assert!(iter.next().unwrap());
        assert_eq!(iter.key().user_key, b"a");
        assert_eq!(iter.key().seq, 2);
        assert_eq!(iter.value(), b"new");

        assert!(iter.next().unwrap());
        assert_eq!(iter.key().user_key, b"b");

        assert!(!iter.next().unwrap());
        assert!(!iter.valid());
    }

    #[test]
    fn test_next_after_end_stays_invalid() {
        let mut iter = VecIterator::new(vec![entry("a", 1, ValueKind::Set, "v")]);
        iter.seek_to_first().unwrap();
        assert!(!iter.next().unwrap());
        assert!(!iter.next().unwrap());
        assert!(!iter.valid());
    }
}
