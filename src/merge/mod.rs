/// Trait for implementing custom merge operators
///
/// A merge operator defines how a MERGE operand combines with the value
/// below it. During compaction, the operands for a key are folded pairwise
/// from newest to oldest; that left-fold is the canonical reduction, so the
/// operator should be associative under it.
///
/// Merging never fails for well-formed operands: an operator that cannot
/// interpret its input must still produce a deterministic byte string (the
/// built-ins fall back to treating garbage as an empty contribution).
///
/// # Examples
///
/// ```ignore
/// struct BitOrMerge;
///
/// impl MergeOperator for BitOrMerge {
///     fn name(&self) -> &str {
///         "BitOrMerge"
///     }
///
///     fn merge(&self, _key: &[u8], newer: &[u8], older: &[u8]) -> Vec<u8> {
///         newer.iter().zip(older).map(|(a, b)| a | b).collect()
///     }
/// }
/// ```
pub trait MergeOperator: Send + Sync {
    /// Returns the name of this merge operator
    fn name(&self) -> &str;

    /// Combine `newer` with the `older` value or operand directly below it
    ///
    /// # Arguments
    /// * `key` - The user key being merged
    /// * `newer` - The accumulated value, written later than `older`
    /// * `older` - The value or operand written earlier
    fn merge(&self, key: &[u8], newer: &[u8], older: &[u8]) -> Vec<u8>;
}

/// Built-in merge operator for integer counters
///
/// Interprets both sides as decimal i64 and adds them. Unparseable bytes
/// count as zero.
pub struct CounterMerge;

impl CounterMerge {
    fn parse(bytes: &[u8]) -> i64 {
        std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0)
    }
}

impl MergeOperator for CounterMerge {
    fn name(&self) -> &str {
        "CounterMerge"
    }

    fn merge(&self, _key: &[u8], newer: &[u8], older: &[u8]) -> Vec<u8> {
        let sum = Self::parse(newer).wrapping_add(Self::parse(older));
        sum.to_string().into_bytes()
    }
}

/// Built-in merge operator that joins operands in write order
///
/// The older side lands before the newer side, so the fully folded value
/// reads chronologically.
pub struct StringAppendMerge {
    delimiter: String,
}

impl StringAppendMerge {
    pub fn new(delimiter: impl Into<String>) -> Self {
        StringAppendMerge {
            delimiter: delimiter.into(),
        }
    }
}

impl Default for StringAppendMerge {
    fn default() -> Self {
        StringAppendMerge::new("")
    }
}

impl MergeOperator for StringAppendMerge {
    fn name(&self) -> &str {
        "StringAppendMerge"
    }

    fn merge(&self, _key: &[u8], newer: &[u8], older: &[u8]) -> Vec<u8> {
        let mut result = Vec::with_capacity(older.len() + self.delimiter.len() + newer.len());
        result.extend_from_slice(older);
        result.extend_from_slice(self.delimiter.as_bytes());
        result.extend_from_slice(newer);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_merge_adds() {
        let merge = CounterMerge;
        assert_eq!(merge.merge(b"counter", b"5", b"10"), b"15".to_vec());
        assert_eq!(merge.merge(b"counter", b"-2", b"3"), b"1".to_vec());
    }

    #[test]
    fn test_counter_merge_garbage_is_zero() {
        let merge = CounterMerge;
        assert_eq!(merge.merge(b"counter", b"oops", b"10"), b"10".to_vec());
    }

    #[test]
    fn test_string_append_write_order() {
        let merge = StringAppendMerge::new(",");
        // older operand first, newer second
        assert_eq!(merge.merge(b"log", b"new", b"old"), b"old,new".to_vec());
    }

    #[test]
    fn test_string_append_fold_is_chronological() {
        let merge = StringAppendMerge::new(",");
        // Fold newest-to-oldest the way compaction does: acc=v3, then v2,
        // then v1. The result must read v1,v2,v3.
        let acc = merge.merge(b"log", b"v3", b"v2");
        let acc = merge.merge(b"log", &acc, b"v1");
        assert_eq!(acc, b"v1,v2,v3".to_vec());
    }

    #[test]
    fn test_string_append_no_delimiter() {
        let merge = StringAppendMerge::default();
        assert_eq!(merge.merge(b"log", b"World", b"Hello"), b"HelloWorld".to_vec());
    }
}
