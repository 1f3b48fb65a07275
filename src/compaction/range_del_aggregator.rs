use std::cmp::Ordering;
use std::sync::Arc;

use crate::common::format::ParsedInternalKey;
use crate::common::{KeyComparator, ValueType};
use crate::iterator::InternalIterator;

/// A deletion over `[start_key, end_key)` at one sequence.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RangeTombstone {
    pub start_key: Vec<u8>,
    pub end_key: Vec<u8>,
    pub sequence: u64,
}

/// A maximal interval covered by the same set of tombstone sequences.
struct Fragment {
    start_key: Vec<u8>,
    end_key: Vec<u8>,
    /// Sequences deleting this interval, descending.
    sequences: Vec<u64>,
}

/// Collects the range-tombstone iterators of every input memtable and serves
/// two questions: does a tombstone hide this point key, and which fragmented
/// tombstones survive into the output, one per snapshot stripe.
pub struct CompactionRangeDelAggregator {
    comparator: Arc<dyn KeyComparator>,
    snapshots: Vec<u64>,
    raw: Vec<RangeTombstone>,
    fragments: Vec<Fragment>,
    fragmented: bool,
}

impl CompactionRangeDelAggregator {
    pub fn new(comparator: Arc<dyn KeyComparator>, snapshots: Vec<u64>) -> Self {
        Self {
            comparator,
            snapshots,
            raw: vec![],
            fragments: vec![],
            fragmented: true,
        }
    }

    /// Drains `iter`, whose keys are `(start_key, seq, RangeDeletion)` and
    /// whose values are the exclusive end keys.
    pub fn add_tombstones(&mut self, mut iter: Box<dyn InternalIterator>) {
        iter.seek_to_first();
        while iter.valid() {
            let parsed = ParsedInternalKey::new(iter.key());
            if parsed.valid() && parsed.tp == ValueType::TypeRangeDeletion {
                self.raw.push(RangeTombstone {
                    start_key: parsed.user_key().to_vec(),
                    end_key: iter.value().to_vec(),
                    sequence: parsed.sequence,
                });
                self.fragmented = false;
            }
            iter.next();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    fn stripe_of(&self, sequence: u64) -> usize {
        self.snapshots.partition_point(|s| *s < sequence)
    }

    /// Cuts the collected tombstones at every start and end key so each
    /// produced interval is covered by a fixed set of sequences.
    fn fragment(&mut self) {
        if self.fragmented {
            return;
        }
        let comparator = self.comparator.clone();
        let cmp = |a: &Vec<u8>, b: &Vec<u8>| comparator.compare_key(a, b);
        let mut bounds: Vec<Vec<u8>> = vec![];
        for t in &self.raw {
            bounds.push(t.start_key.clone());
            bounds.push(t.end_key.clone());
        }
        bounds.sort_by(|a, b| cmp(a, b));
        bounds.dedup_by(|a, b| cmp(a, b) == Ordering::Equal);

        self.fragments.clear();
        for window in bounds.windows(2) {
            let (lo, hi) = (&window[0], &window[1]);
            let mut sequences: Vec<u64> = self
                .raw
                .iter()
                .filter(|t| {
                    cmp(&t.start_key, lo) != Ordering::Greater
                        && cmp(&t.end_key, hi) != Ordering::Less
                })
                .map(|t| t.sequence)
                .collect();
            if sequences.is_empty() {
                continue;
            }
            sequences.sort_unstable_by(|a, b| b.cmp(a));
            sequences.dedup();
            self.fragments.push(Fragment {
                start_key: lo.clone(),
                end_key: hi.clone(),
                sequences,
            });
        }
        self.fragmented = true;
    }

    /// True when a tombstone in the same snapshot stripe covers
    /// `(user_key, sequence)` from above.
    pub fn should_delete(&mut self, user_key: &[u8], sequence: u64) -> bool {
        if self.raw.is_empty() {
            return false;
        }
        self.fragment();
        let idx = self.fragments.partition_point(|f| {
            self.comparator.compare_key(&f.end_key, user_key) != Ordering::Greater
        });
        let fragment = match self.fragments.get(idx) {
            Some(f) => f,
            None => return false,
        };
        if self.comparator.compare_key(&fragment.start_key, user_key) == Ordering::Greater {
            return false;
        }
        let stripe = self.stripe_of(sequence);
        fragment
            .sequences
            .iter()
            .any(|&s| s > sequence && self.stripe_of(s) == stripe)
    }

    /// The surviving view: every fragment, reduced to the newest sequence
    /// per snapshot stripe, ordered by start key then sequence descending.
    pub fn tombstones(&mut self) -> Vec<RangeTombstone> {
        self.fragment();
        let mut out = vec![];
        for f in &self.fragments {
            let mut last_stripe = usize::MAX;
            for &seq in &f.sequences {
                let stripe = self.stripe_of(seq);
                if stripe == last_stripe {
                    continue;
                }
                last_stripe = stripe;
                out.push(RangeTombstone {
                    start_key: f.start_key.clone(),
                    end_key: f.end_key.clone(),
                    sequence: seq,
                });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::format::make_internal_key;
    use crate::common::DefaultUserComparator;
    use crate::memtable::Memtable;

    fn agg(snapshots: Vec<u64>) -> CompactionRangeDelAggregator {
        CompactionRangeDelAggregator::new(Arc::new(DefaultUserComparator::default()), snapshots)
    }

    fn add_mem_tombstones(
        agg: &mut CompactionRangeDelAggregator,
        tombstones: &[(&[u8], &[u8], u64)],
    ) {
        let mem = Memtable::new(1, 4 << 20, 0);
        for (start, end, seq) in tombstones {
            mem.delete_range(start, end, *seq);
        }
        agg.add_tombstones(mem.new_range_tombstone_iterator().unwrap());
    }

    #[test]
    fn test_should_delete_basic() {
        let mut agg = agg(vec![]);
        add_mem_tombstones(&mut agg, &[(b"a", b"m", 7)]);
        assert!(agg.should_delete(b"a", 3));
        assert!(agg.should_delete(b"c", 6));
        // At or above the tombstone's sequence nothing is deleted.
        assert!(!agg.should_delete(b"c", 7));
        assert!(!agg.should_delete(b"c", 9));
        // End key is exclusive.
        assert!(!agg.should_delete(b"m", 3));
        assert!(!agg.should_delete(b"z", 3));
    }

    #[test]
    fn test_snapshot_stripe_blocks_deletion() {
        // Snapshot at 5 separates the put@3 from the tombstone@7.
        let mut agg = agg(vec![5]);
        add_mem_tombstones(&mut agg, &[(b"a", b"m", 7)]);
        assert!(!agg.should_delete(b"c", 3));
        assert!(agg.should_delete(b"c", 6));
    }

    #[test]
    fn test_fragmentation_of_overlapping_tombstones() {
        let mut agg = agg(vec![]);
        add_mem_tombstones(&mut agg, &[(b"a", b"m", 7), (b"f", b"z", 9)]);
        let tombstones = agg.tombstones();
        assert_eq!(
            tombstones,
            vec![
                RangeTombstone {
                    start_key: b"a".to_vec(),
                    end_key: b"f".to_vec(),
                    sequence: 7,
                },
                RangeTombstone {
                    start_key: b"f".to_vec(),
                    end_key: b"m".to_vec(),
                    sequence: 9,
                },
                RangeTombstone {
                    start_key: b"m".to_vec(),
                    end_key: b"z".to_vec(),
                    sequence: 9,
                },
            ]
        );
    }

    #[test]
    fn test_per_stripe_tombstones() {
        // Overlapping deletions on both sides of a snapshot keep one
        // representative per stripe.
        let mut agg = agg(vec![5]);
        add_mem_tombstones(&mut agg, &[(b"a", b"m", 3), (b"a", b"m", 8)]);
        let tombstones = agg.tombstones();
        assert_eq!(
            tombstones,
            vec![
                RangeTombstone {
                    start_key: b"a".to_vec(),
                    end_key: b"m".to_vec(),
                    sequence: 8,
                },
                RangeTombstone {
                    start_key: b"a".to_vec(),
                    end_key: b"m".to_vec(),
                    sequence: 3,
                },
            ]
        );
    }

    #[test]
    fn test_empty_aggregator() {
        let mut agg = agg(vec![]);
        assert!(agg.is_empty());
        assert!(!agg.should_delete(b"a", 1));
        assert!(agg.tombstones().is_empty());
    }
}
