use std::sync::Arc;

use log::warn;

use crate::common::format::{make_internal_key, ParsedInternalKey};
use crate::common::{Error, KeyComparator, Result, ValueType, MAX_SEQUENCE_NUMBER};
use crate::compaction::filter::{CompactionFilter, CompactionFilterDecision};
use crate::compaction::merge_helper::MergeHelper;
use crate::compaction::range_del_aggregator::CompactionRangeDelAggregator;
use crate::iterator::InternalIterator;
use crate::util::extract_user_key;
use crate::version::snapshot::{SnapshotChecker, SnapshotCheckerResult};

/// Filters the merged input stream down to the records a flush may emit:
/// per snapshot stripe only the newest version of a user key survives,
/// merge runs fold, single-deletes annihilate their put, and point keys
/// hidden by a range tombstone in the same stripe disappear. Corrupt
/// internal keys stop the stream with a hard error.
pub struct CompactionIter {
    input: Box<dyn InternalIterator>,
    comparator: Arc<dyn KeyComparator>,
    snapshots: Vec<u64>,
    earliest_write_conflict_snapshot: u64,
    snapshot_checker: Option<Arc<dyn SnapshotChecker>>,
    merge_helper: Option<MergeHelper>,
    compaction_filter: Option<Box<dyn CompactionFilter>>,
    range_del_agg: CompactionRangeDelAggregator,
    bottommost_level: bool,

    key: Vec<u8>,
    value: Vec<u8>,
    sequence: u64,
    value_type: ValueType,
    valid: bool,
    at_next: bool,
    has_current_user_key: bool,
    current_user_key: Vec<u8>,
    current_user_key_snapshot: u64,
    earliest_snapshot: u64,
    status: Option<Error>,

    num_input_records: u64,
    input_raw_bytes: u64,
}

impl CompactionIter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        input: Box<dyn InternalIterator>,
        comparator: Arc<dyn KeyComparator>,
        snapshots: Vec<u64>,
        earliest_write_conflict_snapshot: u64,
        snapshot_checker: Option<Arc<dyn SnapshotChecker>>,
        range_del_agg: CompactionRangeDelAggregator,
        merge_helper: Option<MergeHelper>,
        compaction_filter: Option<Box<dyn CompactionFilter>>,
        bottommost_level: bool,
        full_history_ts_low: &[u8],
    ) -> Self {
        let earliest_snapshot = snapshots.first().cloned().unwrap_or(MAX_SEQUENCE_NUMBER);
        if !full_history_ts_low.is_empty() {
            // The bytewise comparator carries no timestamp suffix, so there
            // is no older-timestamp history to cut off.
            warn!(
                "full_history_ts_low set ({} bytes) but comparator {} has no timestamp",
                full_history_ts_low.len(),
                comparator.name()
            );
        }
        Self {
            input,
            comparator,
            snapshots,
            earliest_write_conflict_snapshot,
            snapshot_checker,
            merge_helper,
            compaction_filter,
            range_del_agg,
            bottommost_level,
            key: vec![],
            value: vec![],
            sequence: 0,
            value_type: ValueType::TypeValue,
            valid: false,
            at_next: false,
            has_current_user_key: false,
            current_user_key: vec![],
            current_user_key_snapshot: 0,
            earliest_snapshot,
            status: None,
            num_input_records: 0,
            input_raw_bytes: 0,
        }
    }

    pub fn seek_to_first(&mut self) {
        self.input.seek_to_first();
        self.next_from_input();
    }

    pub fn next(&mut self) {
        if !self.at_next {
            self.input.next();
        }
        self.next_from_input();
    }

    pub fn valid(&self) -> bool {
        self.valid
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn user_key(&self) -> &[u8] {
        extract_user_key(&self.key)
    }

    pub fn current_sequence(&self) -> u64 {
        self.sequence
    }

    pub fn current_value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn status(&self) -> Result<()> {
        match &self.status {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    pub fn range_del_agg_mut(&mut self) -> &mut CompactionRangeDelAggregator {
        &mut self.range_del_agg
    }

    /// Point records pulled from the merged input so far, including records
    /// dropped or folded away. The writer verifies this against the input
    /// memtables' entry counts.
    pub fn num_input_records(&self) -> u64 {
        self.num_input_records
    }

    pub fn input_raw_bytes(&self) -> u64 {
        self.input_raw_bytes
    }

    fn visible_at(&self, sequence: u64, snapshot: u64) -> bool {
        if sequence > snapshot {
            return false;
        }
        match &self.snapshot_checker {
            None => true,
            Some(checker) => !matches!(
                checker.check_in_snapshot(sequence, snapshot),
                SnapshotCheckerResult::NotInSnapshot
            ),
        }
    }

    /// Returns (prev_snapshot, earliest_snapshot_seeing_current): the
    /// boundaries of the visibility stripe `current` falls into.
    fn find_earliest_visible_snapshot(&self, current: u64) -> (u64, u64) {
        let pos = match self.snapshots.binary_search(&current) {
            Ok(pos) => pos,
            Err(pos) => pos,
        };
        let mut prev = if pos > 0 { self.snapshots[pos - 1] } else { 0 };
        for i in pos..self.snapshots.len() {
            let snapshot = self.snapshots[i];
            if self.visible_at(current, snapshot) {
                return (prev, snapshot);
            }
            prev = snapshot;
        }
        (prev, MAX_SEQUENCE_NUMBER)
    }

    fn next_from_input(&mut self) {
        self.at_next = false;
        self.valid = false;
        while !self.valid && self.status.is_none() && self.input.valid() {
            self.key.clear();
            self.key.extend_from_slice(self.input.key());
            self.value.clear();
            self.value.extend_from_slice(self.input.value());
            self.num_input_records += 1;
            self.input_raw_bytes += (self.key.len() + self.value.len()) as u64;

            let (sequence, tp, user_key_len) = {
                let ikey = ParsedInternalKey::new(&self.key);
                if !ikey.valid() {
                    self.status = Some(Error::Corruption(
                        "corrupted internal key in flush input".to_string(),
                    ));
                    return;
                }
                (ikey.sequence, ikey.tp, ikey.user_key().len())
            };
            self.sequence = sequence;
            self.value_type = tp;

            let user_key_changed = !self.has_current_user_key
                || !self
                    .comparator
                    .same_key(&self.key[..user_key_len], &self.current_user_key);
            if user_key_changed {
                self.current_user_key.clear();
                self.current_user_key
                    .extend_from_slice(&self.key[..user_key_len]);
                self.has_current_user_key = true;
                self.current_user_key_snapshot = 0;
            }

            let last_snapshot = self.current_user_key_snapshot;
            let (prev_snapshot, current_snapshot) = self.find_earliest_visible_snapshot(sequence);
            self.current_user_key_snapshot = current_snapshot;
            assert!(self.current_user_key_snapshot > 0);

            // A newer entry for this key in the same stripe was already
            // emitted; no reader can see this one.
            if !user_key_changed && last_snapshot == current_snapshot {
                self.input.next();
                continue;
            }

            // Range deletions never travel through the point stream.
            if tp == ValueType::TypeRangeDeletion {
                self.input.next();
                continue;
            }

            if self
                .range_del_agg
                .should_delete(&self.key[..user_key_len], sequence)
            {
                self.input.next();
                continue;
            }

            match tp {
                ValueType::TypeValue => {
                    if let Some(filter) = &self.compaction_filter {
                        let decision =
                            filter.filter(0, &self.key[..user_key_len], &self.value);
                        match decision {
                            CompactionFilterDecision::Keep => {}
                            CompactionFilterDecision::Remove => {
                                // Emit a deletion so versions of this key in
                                // other files stay hidden.
                                let user_key = self.key[..user_key_len].to_vec();
                                self.key =
                                    make_internal_key(&user_key, sequence, ValueType::TypeDeletion);
                                self.value.clear();
                                self.value_type = ValueType::TypeDeletion;
                            }
                            CompactionFilterDecision::ChangeValue(v) => {
                                self.value = v;
                            }
                        }
                    }
                    self.valid = true;
                }
                ValueType::TypeDeletion => {
                    if self.bottommost_level && sequence <= self.earliest_snapshot {
                        // Nothing below the bottom level can resurface.
                        self.input.next();
                        continue;
                    }
                    self.valid = true;
                }
                ValueType::TypeSingleDeletion => {
                    self.input.next();
                    self.at_next = true;
                    let next_is_covered_put = {
                        if self.input.valid() {
                            let next = ParsedInternalKey::new(self.input.key());
                            next.valid()
                                && self
                                    .comparator
                                    .same_key(next.user_key(), &self.key[..user_key_len])
                                && next.tp == ValueType::TypeValue
                                && next.sequence > prev_snapshot
                        } else {
                            false
                        }
                    };
                    if next_is_covered_put {
                        if sequence < self.earliest_write_conflict_snapshot {
                            // No conflict-checking snapshot needs this pair;
                            // the single delete and its put cancel out.
                            self.num_input_records += 1;
                            self.input_raw_bytes +=
                                (self.input.key().len() + self.input.value().len()) as u64;
                            self.input.next();
                            self.at_next = false;
                            continue;
                        }
                        // Conflict detection needs evidence of both the
                        // write and its deletion; reset the stripe marker so
                        // the put is not treated as hidden.
                        self.current_user_key_snapshot = 0;
                    }
                    self.valid = true;
                }
                ValueType::TypeMerge => {
                    if self.merge_helper.is_some() {
                        let result = {
                            let helper = self.merge_helper.as_ref().unwrap();
                            helper.merge_until(
                                self.input.as_mut(),
                                &self.key,
                                &self.value,
                                prev_snapshot,
                            )
                        };
                        match result {
                            Ok(merged) => {
                                self.num_input_records += merged.consumed_records;
                                self.input_raw_bytes += merged.consumed_bytes;
                                self.key = merged.key;
                                self.value = merged.value;
                                let parsed = ParsedInternalKey::new(&self.key);
                                self.sequence = parsed.sequence;
                                self.value_type = parsed.tp;
                                self.at_next = true;
                                self.valid = true;
                            }
                            Err(e) => {
                                self.status = Some(e);
                            }
                        }
                    } else {
                        // Without an operator the operand is a plain record.
                        self.valid = true;
                    }
                }
                _ => {
                    self.valid = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{DefaultUserComparator, InternalKeyComparator};
    use crate::compaction::merge_helper::testutil::AppendMergeOperator;
    use crate::compaction::merge_helper::MergeOperator;
    use crate::iterator::MergingIterator;
    use crate::memtable::Memtable;

    fn user_comparator() -> Arc<dyn KeyComparator> {
        Arc::new(DefaultUserComparator::default())
    }

    fn compaction_iter_for(
        mems: &[&Memtable],
        snapshots: Vec<u64>,
        merge_operator: Option<Arc<dyn MergeOperator>>,
        compaction_filter: Option<Box<dyn CompactionFilter>>,
    ) -> CompactionIter {
        let iters: Vec<Box<dyn InternalIterator>> =
            mems.iter().map(|m| m.new_iterator()).collect();
        let merged = Box::new(MergingIterator::new(
            iters,
            InternalKeyComparator::default(),
        ));
        let mut range_del_agg =
            CompactionRangeDelAggregator::new(user_comparator(), snapshots.clone());
        for m in mems {
            if let Some(iter) = m.new_range_tombstone_iterator() {
                range_del_agg.add_tombstones(iter);
            }
        }
        let merge_helper =
            merge_operator.map(|op| MergeHelper::new(op, user_comparator()));
        CompactionIter::new(
            merged,
            user_comparator(),
            snapshots,
            MAX_SEQUENCE_NUMBER,
            None,
            range_del_agg,
            merge_helper,
            compaction_filter,
            false,
            &[],
        )
    }

    fn drain(iter: &mut CompactionIter) -> Vec<(Vec<u8>, u64, ValueType, Vec<u8>)> {
        let mut out = vec![];
        iter.seek_to_first();
        while iter.valid() {
            out.push((
                iter.user_key().to_vec(),
                iter.current_sequence(),
                iter.current_value_type(),
                iter.value().to_vec(),
            ));
            iter.next();
        }
        out
    }

    #[test]
    fn test_newer_version_wins_without_snapshot() {
        let m0 = Memtable::new(1, 4 << 20, 0);
        m0.add(b"k", b"old", 5, ValueType::TypeValue);
        let m1 = Memtable::new(2, 4 << 20, 0);
        m1.add(b"k", b"new", 9, ValueType::TypeValue);

        let mut iter = compaction_iter_for(&[&m0, &m1], vec![], None, None);
        let out = drain(&mut iter);
        assert_eq!(out, vec![(b"k".to_vec(), 9, ValueType::TypeValue, b"new".to_vec())]);
        iter.status().unwrap();
    }

    #[test]
    fn test_snapshot_pins_old_version() {
        let mem = Memtable::new(1, 4 << 20, 0);
        mem.add(b"k", b"old", 5, ValueType::TypeValue);
        mem.add(b"k", b"new", 9, ValueType::TypeValue);

        let mut iter = compaction_iter_for(&[&mem], vec![6], None, None);
        let out = drain(&mut iter);
        assert_eq!(
            out,
            vec![
                (b"k".to_vec(), 9, ValueType::TypeValue, b"new".to_vec()),
                (b"k".to_vec(), 5, ValueType::TypeValue, b"old".to_vec()),
            ]
        );
    }

    #[test]
    fn test_range_tombstone_erases_point_keys() {
        let m0 = Memtable::new(1, 4 << 20, 0);
        m0.add(b"a", b"x", 3, ValueType::TypeValue);
        m0.add(b"z", b"y", 4, ValueType::TypeValue);
        let m1 = Memtable::new(2, 4 << 20, 0);
        m1.delete_range(b"a", b"zzz", 7);

        let mut iter = compaction_iter_for(&[&m0, &m1], vec![], None, None);
        let out = drain(&mut iter);
        assert!(out.is_empty());
        assert_eq!(iter.range_del_agg_mut().tombstones().len(), 1);
    }

    #[test]
    fn test_single_delete_annihilates_put() {
        let mem = Memtable::new(1, 4 << 20, 0);
        mem.add(b"k", b"v", 5, ValueType::TypeValue);
        mem.add(b"k", b"", 8, ValueType::TypeSingleDeletion);
        mem.add(b"other", b"o", 6, ValueType::TypeValue);

        let mut iter = compaction_iter_for(&[&mem], vec![], None, None);
        let out = drain(&mut iter);
        assert_eq!(
            out,
            vec![(b"other".to_vec(), 6, ValueType::TypeValue, b"o".to_vec())]
        );
    }

    #[test]
    fn test_single_delete_kept_for_conflict_detection() {
        let mem = Memtable::new(1, 4 << 20, 0);
        mem.add(b"k", b"v", 5, ValueType::TypeValue);
        mem.add(b"k", b"", 8, ValueType::TypeSingleDeletion);

        let iters: Vec<Box<dyn InternalIterator>> = vec![mem.new_iterator()];
        let merged = Box::new(MergingIterator::new(iters, InternalKeyComparator::default()));
        let range_del_agg = CompactionRangeDelAggregator::new(user_comparator(), vec![]);
        // A write-conflict snapshot below the single delete's sequence
        // forbids collapsing the pair.
        let mut iter = CompactionIter::new(
            merged,
            user_comparator(),
            vec![],
            5,
            None,
            range_del_agg,
            None,
            None,
            false,
            &[],
        );
        let out = drain(&mut iter);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].2, ValueType::TypeSingleDeletion);
        assert_eq!(out[1].2, ValueType::TypeValue);
    }

    #[test]
    fn test_merge_folding() {
        let mem = Memtable::new(1, 4 << 20, 0);
        mem.add(b"k", b"base", 5, ValueType::TypeValue);
        mem.add(b"k", b"m1", 6, ValueType::TypeMerge);
        mem.add(b"k", b"m2", 7, ValueType::TypeMerge);

        let mut iter = compaction_iter_for(
            &[&mem],
            vec![],
            Some(Arc::new(AppendMergeOperator {})),
            None,
        );
        let out = drain(&mut iter);
        assert_eq!(
            out,
            vec![(b"k".to_vec(), 7, ValueType::TypeValue, b"base,m1,m2".to_vec())]
        );
    }

    #[test]
    fn test_compaction_filter_removes_and_rewrites() {
        struct TestFilter {}
        impl CompactionFilter for TestFilter {
            fn name(&self) -> &'static str {
                "TestFilter"
            }
            fn filter(
                &self,
                _level: u32,
                user_key: &[u8],
                value: &[u8],
            ) -> CompactionFilterDecision {
                if user_key == b"drop" {
                    CompactionFilterDecision::Remove
                } else if user_key == b"rewrite" {
                    let mut v = value.to_vec();
                    v.extend_from_slice(b"!");
                    CompactionFilterDecision::ChangeValue(v)
                } else {
                    CompactionFilterDecision::Keep
                }
            }
        }

        let mem = Memtable::new(1, 4 << 20, 0);
        mem.add(b"drop", b"x", 1, ValueType::TypeValue);
        mem.add(b"keep", b"y", 2, ValueType::TypeValue);
        mem.add(b"rewrite", b"z", 3, ValueType::TypeValue);

        let mut iter =
            compaction_iter_for(&[&mem], vec![], None, Some(Box::new(TestFilter {})));
        let out = drain(&mut iter);
        assert_eq!(
            out,
            vec![
                (b"drop".to_vec(), 1, ValueType::TypeDeletion, b"".to_vec()),
                (b"keep".to_vec(), 2, ValueType::TypeValue, b"y".to_vec()),
                (b"rewrite".to_vec(), 3, ValueType::TypeValue, b"z!".to_vec()),
            ]
        );
    }

    #[test]
    fn test_corrupt_key_is_hard_error() {
        struct BadIterator {
            done: bool,
        }
        impl InternalIterator for BadIterator {
            fn valid(&self) -> bool {
                !self.done
            }
            fn seek(&mut self, _key: &[u8]) {}
            fn seek_to_first(&mut self) {}
            fn seek_to_last(&mut self) {}
            fn seek_for_prev(&mut self, _key: &[u8]) {}
            fn next(&mut self) {
                self.done = true;
            }
            fn prev(&mut self) {}
            fn key(&self) -> &[u8] {
                b"bad"
            }
            fn value(&self) -> &[u8] {
                b""
            }
        }

        let range_del_agg = CompactionRangeDelAggregator::new(user_comparator(), vec![]);
        let mut iter = CompactionIter::new(
            Box::new(BadIterator { done: false }),
            user_comparator(),
            vec![],
            0,
            None,
            range_del_agg,
            None,
            None,
            false,
            &[],
        );
        iter.seek_to_first();
        assert!(!iter.valid());
        assert!(iter.status().unwrap_err().is_corruption());
    }
}
