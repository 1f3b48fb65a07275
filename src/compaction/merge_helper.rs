use std::sync::Arc;

use crate::common::format::{make_internal_key, ParsedInternalKey};
use crate::common::{KeyComparator, Result, ValueType};
use crate::iterator::InternalIterator;

/// Folds a run of merge operands into one value. `full_merge` resolves
/// against a base value (or its absence); `partial_merge` may combine two
/// adjacent operands when no base is reachable yet.
pub trait MergeOperator: Send + Sync {
    fn name(&self) -> &'static str;
    fn full_merge(
        &self,
        user_key: &[u8],
        existing_value: Option<&[u8]>,
        operands: &[Vec<u8>],
    ) -> Option<Vec<u8>>;
    fn partial_merge(
        &self,
        _user_key: &[u8],
        _left_operand: &[u8],
        _right_operand: &[u8],
    ) -> Option<Vec<u8>> {
        None
    }
}

pub struct MergeResult {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// True when the input cursor already stands on the first record that
    /// did not take part in the merge.
    pub at_next: bool,
    /// Records consumed from the input beyond the first, with their raw
    /// key+value bytes. Input accounting needs them since the caller never
    /// sees these records.
    pub consumed_records: u64,
    pub consumed_bytes: u64,
}

pub struct MergeHelper {
    operator: Arc<dyn MergeOperator>,
    comparator: Arc<dyn KeyComparator>,
}

impl MergeHelper {
    pub fn new(operator: Arc<dyn MergeOperator>, comparator: Arc<dyn KeyComparator>) -> Self {
        Self {
            operator,
            comparator,
        }
    }

    /// Consumes the merge run starting at the record `(key, value)` the
    /// input currently stands on. Walks older records of the same user key
    /// while they stay above `stop_before` (the previous snapshot boundary,
    /// exclusive), folding operands newest-first:
    ///
    /// - a Put inside the run terminates it and the result is a full merge
    ///   over that base value, emitted as a Put at the newest sequence;
    /// - a Delete or SingleDelete terminates it with a full merge over
    ///   nothing, also emitted as a Put;
    /// - running out of records of this key (or hitting the snapshot
    ///   boundary) leaves the operands partially combined as one Merge
    ///   record, preserving what older stripes still need.
    pub fn merge_until(
        &self,
        input: &mut dyn InternalIterator,
        key: &[u8],
        value: &[u8],
        stop_before: u64,
    ) -> Result<MergeResult> {
        let first = ParsedInternalKey::new(key);
        let user_key = first.user_key().to_vec();
        let newest_sequence = first.sequence;
        let mut operands: Vec<Vec<u8>> = vec![value.to_vec()];
        let mut base: Option<Vec<u8>> = None;
        let mut hit_base = false;
        let mut at_next = false;
        let mut consumed_records = 0u64;
        let mut consumed_bytes = 0u64;

        input.next();
        while input.valid() {
            let entry = ParsedInternalKey::new(input.key());
            if !entry.valid() || !self.comparator.same_key(entry.user_key(), &user_key) {
                at_next = true;
                break;
            }
            if entry.sequence <= stop_before {
                // An older snapshot still sees the records below; leave them.
                at_next = true;
                break;
            }
            let raw = (input.key().len() + input.value().len()) as u64;
            match entry.tp {
                ValueType::TypeMerge => {
                    operands.push(input.value().to_vec());
                    consumed_records += 1;
                    consumed_bytes += raw;
                    input.next();
                }
                ValueType::TypeValue => {
                    base = Some(input.value().to_vec());
                    hit_base = true;
                    consumed_records += 1;
                    consumed_bytes += raw;
                    input.next();
                    break;
                }
                ValueType::TypeDeletion | ValueType::TypeSingleDeletion => {
                    hit_base = true;
                    consumed_records += 1;
                    consumed_bytes += raw;
                    input.next();
                    break;
                }
                _ => {
                    at_next = true;
                    break;
                }
            }
        }
        if !input.valid() {
            at_next = true;
        }

        if hit_base {
            let merged = self
                .operator
                .full_merge(&user_key, base.as_deref(), &operands)
                .ok_or_else(|| {
                    crate::common::Error::Corruption(format!(
                        "merge operator {} failed to resolve {} operands",
                        self.operator.name(),
                        operands.len()
                    ))
                })?;
            return Ok(MergeResult {
                key: make_internal_key(&user_key, newest_sequence, ValueType::TypeValue),
                value: merged,
                at_next: true,
                consumed_records,
                consumed_bytes,
            });
        }

        // No base reachable: combine what we can pairwise, oldest first.
        while operands.len() > 1 {
            let right = operands[operands.len() - 2].clone();
            let left = operands[operands.len() - 1].clone();
            match self.operator.partial_merge(&user_key, &left, &right) {
                Some(combined) => {
                    operands.pop();
                    operands.pop();
                    operands.push(combined);
                }
                None => break,
            }
        }
        let value = if operands.len() == 1 {
            operands.pop().unwrap()
        } else {
            // Operands the operator cannot combine stay as the newest one;
            // the remainder were consumed from the stream, so resolving them
            // is forced through full_merge.
            self.operator
                .full_merge(&user_key, None, &operands)
                .ok_or_else(|| {
                    crate::common::Error::Corruption(format!(
                        "merge operator {} failed to combine {} operands",
                        self.operator.name(),
                        operands.len()
                    ))
                })?
        };
        Ok(MergeResult {
            key: make_internal_key(&user_key, newest_sequence, ValueType::TypeMerge),
            value,
            at_next,
            consumed_records,
            consumed_bytes,
        })
    }
}

#[cfg(test)]
pub mod testutil {
    use super::*;

    /// Concatenates operands with ','. Handy because results are readable.
    pub struct AppendMergeOperator {}

    impl MergeOperator for AppendMergeOperator {
        fn name(&self) -> &'static str {
            "AppendMergeOperator"
        }

        fn full_merge(
            &self,
            _user_key: &[u8],
            existing_value: Option<&[u8]>,
            operands: &[Vec<u8>],
        ) -> Option<Vec<u8>> {
            let mut out = vec![];
            if let Some(v) = existing_value {
                out.extend_from_slice(v);
            }
            // Operands arrive newest-first; apply oldest-first.
            for op in operands.iter().rev() {
                if !out.is_empty() {
                    out.push(b',');
                }
                out.extend_from_slice(op);
            }
            Some(out)
        }

        fn partial_merge(
            &self,
            _user_key: &[u8],
            left_operand: &[u8],
            right_operand: &[u8],
        ) -> Option<Vec<u8>> {
            let mut out = left_operand.to_vec();
            out.push(b',');
            out.extend_from_slice(right_operand);
            Some(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::AppendMergeOperator;
    use super::*;
    use crate::common::DefaultUserComparator;
    use crate::memtable::Memtable;

    fn helper() -> MergeHelper {
        MergeHelper::new(
            Arc::new(AppendMergeOperator {}),
            Arc::new(DefaultUserComparator::default()),
        )
    }

    #[test]
    fn test_merge_resolves_against_put() {
        let mem = Memtable::new(1, 4 << 20, 0);
        mem.add(b"k", b"base", 5, ValueType::TypeValue);
        mem.add(b"k", b"m1", 6, ValueType::TypeMerge);
        mem.add(b"k", b"m2", 7, ValueType::TypeMerge);

        let mut iter = mem.new_iterator();
        iter.seek_to_first();
        let key = iter.key().to_vec();
        let value = iter.value().to_vec();
        let result = helper().merge_until(iter.as_mut(), &key, &value, 0).unwrap();
        let parsed = ParsedInternalKey::new(&result.key);
        assert_eq!(parsed.tp, ValueType::TypeValue);
        assert_eq!(parsed.sequence, 7);
        assert_eq!(result.value, b"base,m1,m2".to_vec());
        assert!(result.at_next);
        assert!(!iter.valid());
    }

    #[test]
    fn test_merge_without_base_stays_merge() {
        let mem = Memtable::new(1, 4 << 20, 0);
        mem.add(b"k", b"m1", 6, ValueType::TypeMerge);
        mem.add(b"k", b"m2", 7, ValueType::TypeMerge);

        let mut iter = mem.new_iterator();
        iter.seek_to_first();
        let key = iter.key().to_vec();
        let value = iter.value().to_vec();
        let result = helper().merge_until(iter.as_mut(), &key, &value, 0).unwrap();
        let parsed = ParsedInternalKey::new(&result.key);
        assert_eq!(parsed.tp, ValueType::TypeMerge);
        assert_eq!(parsed.sequence, 7);
        assert_eq!(result.value, b"m1,m2".to_vec());
    }

    #[test]
    fn test_merge_over_delete_discards_history() {
        let mem = Memtable::new(1, 4 << 20, 0);
        mem.add(b"k", b"dead", 3, ValueType::TypeValue);
        mem.delete(b"k", 5);
        mem.add(b"k", b"m1", 8, ValueType::TypeMerge);

        let mut iter = mem.new_iterator();
        iter.seek_to_first();
        let key = iter.key().to_vec();
        let value = iter.value().to_vec();
        let result = helper().merge_until(iter.as_mut(), &key, &value, 0).unwrap();
        assert_eq!(
            ParsedInternalKey::new(&result.key).tp,
            ValueType::TypeValue
        );
        assert_eq!(result.value, b"m1".to_vec());
        // The put below the delete is not consumed by the merge; the
        // compaction iterator drops it through the usual visibility rules.
        assert!(iter.valid());
        assert_eq!(ParsedInternalKey::new(iter.key()).sequence, 3);
    }

    #[test]
    fn test_merge_stops_at_snapshot_boundary() {
        let mem = Memtable::new(1, 4 << 20, 0);
        mem.add(b"k", b"base", 4, ValueType::TypeValue);
        mem.add(b"k", b"m1", 9, ValueType::TypeMerge);

        let mut iter = mem.new_iterator();
        iter.seek_to_first();
        let key = iter.key().to_vec();
        let value = iter.value().to_vec();
        // A snapshot at 5 pins the base put; the merge may not absorb it.
        let result = helper().merge_until(iter.as_mut(), &key, &value, 5).unwrap();
        let parsed = ParsedInternalKey::new(&result.key);
        assert_eq!(parsed.tp, ValueType::TypeMerge);
        assert_eq!(result.value, b"m1".to_vec());
        assert!(iter.valid());
        assert_eq!(ParsedInternalKey::new(iter.key()).sequence, 4);
    }
}
