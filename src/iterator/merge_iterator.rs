use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::common::{InternalKeyComparator, KeyComparator};
use crate::iterator::InternalIterator;

struct IteratorWrapper {
    inner: Box<dyn InternalIterator>,
    comparator: Arc<InternalKeyComparator>,
}

impl PartialEq<Self> for IteratorWrapper {
    fn eq(&self, other: &Self) -> bool {
        if self.inner.valid() && other.inner.valid() {
            return self
                .comparator
                .same_key(self.inner.key(), other.inner.key());
        }
        !self.inner.valid() && !other.inner.valid()
    }
}

impl Eq for IteratorWrapper {}

impl PartialOrd<Self> for IteratorWrapper {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IteratorWrapper {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap pops the smallest internal key.
        if self.inner.valid() && other.inner.valid() {
            self.comparator
                .compare_key(other.inner.key(), self.inner.key())
        } else if self.inner.valid() {
            Ordering::Less
        } else if other.inner.valid() {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }
}

/// Merges N child cursors into one stream in internal-key order. Ties on the
/// same user key resolve by sequence descending through the comparator.
pub struct MergingIterator {
    children: BinaryHeap<IteratorWrapper>,
    other: Vec<IteratorWrapper>,
}

impl MergingIterator {
    pub fn new(iters: Vec<Box<dyn InternalIterator>>, cmp: InternalKeyComparator) -> Self {
        let comparator = Arc::new(cmp);
        let other: Vec<IteratorWrapper> = iters
            .into_iter()
            .map(|iter| IteratorWrapper {
                inner: iter,
                comparator: comparator.clone(),
            })
            .collect();
        Self {
            children: BinaryHeap::with_capacity(other.len()),
            other,
        }
    }

    fn current_forward(&mut self) {
        while let Some(x) = self.children.peek() {
            if !x.inner.valid() {
                let iter = self.children.pop().unwrap();
                self.other.push(iter);
            } else {
                break;
            }
        }
    }

    fn collect_iterators(&mut self) -> Vec<IteratorWrapper> {
        let mut iters = Vec::with_capacity(self.other.len() + self.children.len());
        std::mem::swap(&mut iters, &mut self.other);
        while let Some(iter) = self.children.pop() {
            iters.push(iter);
        }
        iters
    }
}

impl InternalIterator for MergingIterator {
    fn valid(&self) -> bool {
        self.children
            .peek()
            .map_or(false, |iter| iter.inner.valid())
    }

    fn seek(&mut self, key: &[u8]) {
        let iters = self.collect_iterators();
        for mut iter in iters {
            iter.inner.seek(key);
            if iter.inner.valid() {
                self.children.push(iter);
            } else {
                self.other.push(iter);
            }
        }
    }

    fn seek_to_first(&mut self) {
        let iters = self.collect_iterators();
        for mut iter in iters {
            iter.inner.seek_to_first();
            if iter.inner.valid() {
                self.children.push(iter);
            } else {
                self.other.push(iter);
            }
        }
    }

    fn seek_to_last(&mut self) {
        let iters = self.collect_iterators();
        for mut iter in iters {
            iter.inner.seek_to_last();
            if iter.inner.valid() {
                self.children.push(iter);
            } else {
                self.other.push(iter);
            }
        }
    }

    fn seek_for_prev(&mut self, key: &[u8]) {
        let iters = self.collect_iterators();
        for mut iter in iters {
            iter.inner.seek_for_prev(key);
            if iter.inner.valid() {
                self.children.push(iter);
            } else {
                self.other.push(iter);
            }
        }
    }

    fn next(&mut self) {
        {
            let mut x = self.children.peek_mut().unwrap();
            x.inner.next();
        }
        self.current_forward();
    }

    fn prev(&mut self) {
        let mut x = self.children.peek_mut().unwrap();
        x.inner.prev();
    }

    fn key(&self) -> &[u8] {
        self.children.peek().unwrap().inner.key()
    }

    fn value(&self) -> &[u8] {
        self.children.peek().unwrap().inner.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::format::{make_internal_key, ParsedInternalKey, ValueType};
    use crate::memtable::Memtable;

    #[test]
    fn test_merge_two_memtables() {
        let m0 = Memtable::new(1, 4 << 20, 0);
        m0.add(b"a", b"1", 10, ValueType::TypeValue);
        m0.add(b"c", b"3", 12, ValueType::TypeValue);
        let m1 = Memtable::new(2, 4 << 20, 0);
        m1.add(b"b", b"2", 11, ValueType::TypeValue);
        m1.add(b"d", b"4", 13, ValueType::TypeValue);

        let mut iter = MergingIterator::new(
            vec![m0.new_iterator(), m1.new_iterator()],
            InternalKeyComparator::default(),
        );
        iter.seek_to_first();
        let mut out = vec![];
        while iter.valid() {
            out.push(ParsedInternalKey::new(iter.key()).user_key().to_vec());
            iter.next();
        }
        assert_eq!(out, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]);
    }

    #[test]
    fn test_merge_newest_version_first() {
        let m0 = Memtable::new(1, 4 << 20, 0);
        m0.add(b"k", b"old", 5, ValueType::TypeValue);
        let m1 = Memtable::new(2, 4 << 20, 0);
        m1.add(b"k", b"new", 9, ValueType::TypeValue);

        let mut iter = MergingIterator::new(
            vec![m0.new_iterator(), m1.new_iterator()],
            InternalKeyComparator::default(),
        );
        iter.seek_to_first();
        assert!(iter.valid());
        assert_eq!(ParsedInternalKey::new(iter.key()).sequence, 9);
        iter.next();
        assert!(iter.valid());
        assert_eq!(ParsedInternalKey::new(iter.key()).sequence, 5);
        iter.next();
        assert!(!iter.valid());
    }

    #[test]
    fn test_merge_seek() {
        let m0 = Memtable::new(1, 4 << 20, 0);
        m0.add(b"a", b"1", 1, ValueType::TypeValue);
        m0.add(b"d", b"4", 2, ValueType::TypeValue);
        let m1 = Memtable::new(2, 4 << 20, 0);
        m1.add(b"b", b"2", 3, ValueType::TypeValue);

        let mut iter = MergingIterator::new(
            vec![m0.new_iterator(), m1.new_iterator()],
            InternalKeyComparator::default(),
        );
        iter.seek(&make_internal_key(b"b", crate::common::MAX_SEQUENCE_NUMBER, ValueType::TypeBlobIndex));
        assert!(iter.valid());
        assert_eq!(ParsedInternalKey::new(iter.key()).user_key(), b"b");
    }
}
