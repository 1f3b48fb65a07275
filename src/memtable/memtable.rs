use std::cmp::Ordering as CmpOrdering;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use crossbeam_skiplist::SkipMap;

use crate::common::format::make_internal_key;
use crate::common::{ValueType, MAX_SEQUENCE_NUMBER};
use crate::compaction::FlushJobInfo;
use crate::iterator::InternalIterator;
use crate::util::{decode_fixed_uint64, extract_user_key};

// Rough per-entry bookkeeping cost of the skiplist rep, counted on top of
// key and value bytes for approximate_memory_usage().
const ENTRY_OVERHEAD: usize = 32;

/// Encoded internal key ordered like `InternalKeyComparator` over the
/// bytewise user comparator: user key ascending, then (sequence, type)
/// descending.
#[derive(Clone, Eq, PartialEq)]
struct MemKey(Bytes);

impl MemKey {
    fn from_encoded(key: &[u8]) -> Self {
        MemKey(Bytes::copy_from_slice(key))
    }
}

impl Ord for MemKey {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        let l = extract_user_key(&self.0);
        let r = extract_user_key(&other.0);
        match l.cmp(r) {
            CmpOrdering::Equal => {
                let lnum = decode_fixed_uint64(&self.0[self.0.len() - 8..]);
                let rnum = decode_fixed_uint64(&other.0[other.0.len() - 8..]);
                rnum.cmp(&lnum)
            }
            ord => ord,
        }
    }
}

impl PartialOrd for MemKey {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

/// An in-memory write buffer for one column family. Writes go to the mutable
/// memtable until it is sealed; a sealed memtable only changes through the
/// flush bookkeeping flags.
pub struct Memtable {
    id: AtomicU64,
    table: Arc<SkipMap<MemKey, Bytes>>,
    range_del_table: Arc<SkipMap<MemKey, Bytes>>,
    write_buffer_size: usize,

    mem_size: AtomicUsize,
    num_entries: AtomicU64,
    num_deletes: AtomicU64,
    num_range_deletes: AtomicU64,
    data_size: AtomicU64,

    // Sequence identity. first_seqno is the smallest sequence actually
    // inserted; earliest_seqno is a lower bound assigned when the memtable
    // was created.
    first_seqno: AtomicU64,
    earliest_seqno: AtomicU64,
    oldest_key_time: AtomicU64,
    mem_next_logfile_number: AtomicU64,

    immutable: AtomicBool,
    flush_in_progress: AtomicBool,
    flush_completed: AtomicBool,

    flush_job_info: Mutex<Option<FlushJobInfo>>,
}

impl Memtable {
    pub fn new(id: u64, write_buffer_size: usize, earliest_seqno: u64) -> Self {
        Self {
            id: AtomicU64::new(id),
            table: Arc::new(SkipMap::new()),
            range_del_table: Arc::new(SkipMap::new()),
            write_buffer_size,
            mem_size: AtomicUsize::new(0),
            num_entries: AtomicU64::new(0),
            num_deletes: AtomicU64::new(0),
            num_range_deletes: AtomicU64::new(0),
            data_size: AtomicU64::new(0),
            first_seqno: AtomicU64::new(MAX_SEQUENCE_NUMBER),
            earliest_seqno: AtomicU64::new(earliest_seqno),
            oldest_key_time: AtomicU64::new(u64::MAX),
            mem_next_logfile_number: AtomicU64::new(0),
            immutable: AtomicBool::new(false),
            flush_in_progress: AtomicBool::new(false),
            flush_completed: AtomicBool::new(false),
            flush_job_info: Mutex::new(None),
        }
    }

    pub fn add(&self, key: &[u8], value: &[u8], sequence: u64, tp: ValueType) {
        let ikey = make_internal_key(key, sequence, tp);
        let sz = ikey.len() + value.len() + ENTRY_OVERHEAD;
        match tp {
            ValueType::TypeRangeDeletion => {
                self.range_del_table
                    .insert(MemKey(Bytes::from(ikey)), Bytes::copy_from_slice(value));
                self.num_range_deletes.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.table
                    .insert(MemKey(Bytes::from(ikey)), Bytes::copy_from_slice(value));
                self.num_entries.fetch_add(1, Ordering::Relaxed);
                if matches!(
                    tp,
                    ValueType::TypeDeletion | ValueType::TypeSingleDeletion
                ) {
                    self.num_deletes.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        self.data_size
            .fetch_add((key.len() + value.len()) as u64, Ordering::Relaxed);
        self.mem_size.fetch_add(sz, Ordering::Relaxed);
        self.first_seqno.fetch_min(sequence, Ordering::SeqCst);
    }

    pub fn delete(&self, key: &[u8], sequence: u64) {
        self.add(key, &[], sequence, ValueType::TypeDeletion);
    }

    /// Records a range tombstone over `[start, end)`.
    pub fn delete_range(&self, start: &[u8], end: &[u8], sequence: u64) {
        self.add(start, end, sequence, ValueType::TypeRangeDeletion);
    }

    pub fn new_iterator(&self) -> Box<dyn InternalIterator> {
        Box::new(MemtableIterator::new(self.table.clone()))
    }

    /// The range-tombstone view of this memtable, or None when it holds no
    /// range deletions.
    pub fn new_range_tombstone_iterator(&self) -> Option<Box<dyn InternalIterator>> {
        if self.range_del_table.is_empty() {
            return None;
        }
        Some(Box::new(MemtableIterator::new(self.range_del_table.clone())))
    }

    pub fn get_id(&self) -> u64 {
        self.id.load(Ordering::Acquire)
    }

    pub fn set_id(&self, id: u64) {
        self.id.store(id, Ordering::Release);
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty() && self.range_del_table.is_empty()
    }

    pub fn num_entries(&self) -> u64 {
        self.num_entries.load(Ordering::Relaxed)
    }

    pub fn num_deletes(&self) -> u64 {
        self.num_deletes.load(Ordering::Relaxed)
    }

    pub fn num_range_deletes(&self) -> u64 {
        self.num_range_deletes.load(Ordering::Relaxed)
    }

    pub fn get_data_size(&self) -> u64 {
        self.data_size.load(Ordering::Relaxed)
    }

    pub fn approximate_memory_usage(&self) -> usize {
        self.mem_size.load(Ordering::Relaxed)
    }

    /// A memtable at or above its write buffer size wants to go to disk
    /// rather than back into the immutable list.
    pub fn should_flush_now(&self) -> bool {
        self.approximate_memory_usage() >= self.write_buffer_size
    }

    pub fn write_buffer_size(&self) -> usize {
        self.write_buffer_size
    }

    pub fn get_first_sequence_number(&self) -> u64 {
        self.first_seqno.load(Ordering::Acquire)
    }

    pub fn set_first_sequence_number(&self, seq: u64) {
        self.first_seqno.store(seq, Ordering::Release);
    }

    pub fn get_earliest_sequence_number(&self) -> u64 {
        self.earliest_seqno.load(Ordering::Acquire)
    }

    pub fn set_earliest_sequence_number(&self, seq: u64) {
        self.earliest_seqno.store(seq, Ordering::Release);
    }

    /// Seconds-since-epoch bound on the age of the oldest key, u64::MAX when
    /// unknown.
    pub fn approximate_oldest_key_time(&self) -> u64 {
        self.oldest_key_time.load(Ordering::Acquire)
    }

    pub fn set_oldest_key_time(&self, secs: u64) {
        self.oldest_key_time.store(secs, Ordering::Release);
    }

    pub fn set_next_log_number(&self, num: u64) {
        self.mem_next_logfile_number.store(num, Ordering::Release);
    }

    pub fn get_next_log_number(&self) -> u64 {
        self.mem_next_logfile_number.load(Ordering::Acquire)
    }

    pub fn mark_immutable(&self) {
        self.immutable.store(true, Ordering::Release);
    }

    pub fn is_immutable(&self) -> bool {
        self.immutable.load(Ordering::Acquire)
    }

    pub fn set_flush_in_progress(&self, v: bool) {
        self.flush_in_progress.store(v, Ordering::Release);
    }

    pub fn is_flush_in_progress(&self) -> bool {
        self.flush_in_progress.load(Ordering::Acquire)
    }

    pub fn set_flush_completed(&self, v: bool) {
        self.flush_completed.store(v, Ordering::Release);
    }

    pub fn is_flush_completed(&self) -> bool {
        self.flush_completed.load(Ordering::Acquire)
    }

    pub fn set_flush_job_info(&self, info: FlushJobInfo) {
        *self.flush_job_info.lock().unwrap() = Some(info);
    }

    pub fn take_flush_job_info(&self) -> Option<FlushJobInfo> {
        self.flush_job_info.lock().unwrap().take()
    }
}

/// Cursor over one skiplist of a memtable. Positions are re-found by key on
/// every step, which keeps the iterator detached from the map's lifetime.
struct MemtableIterator {
    list: Arc<SkipMap<MemKey, Bytes>>,
    current: Option<(MemKey, Bytes)>,
}

impl MemtableIterator {
    fn new(list: Arc<SkipMap<MemKey, Bytes>>) -> Self {
        Self {
            list,
            current: None,
        }
    }
}

impl InternalIterator for MemtableIterator {
    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn seek(&mut self, key: &[u8]) {
        let probe = MemKey::from_encoded(key);
        self.current = self
            .list
            .lower_bound(Bound::Included(&probe))
            .map(|e| (e.key().clone(), e.value().clone()));
    }

    fn seek_to_first(&mut self) {
        self.current = self.list.front().map(|e| (e.key().clone(), e.value().clone()));
    }

    fn seek_to_last(&mut self) {
        self.current = self.list.back().map(|e| (e.key().clone(), e.value().clone()));
    }

    fn seek_for_prev(&mut self, key: &[u8]) {
        let probe = MemKey::from_encoded(key);
        self.current = self
            .list
            .upper_bound(Bound::Included(&probe))
            .map(|e| (e.key().clone(), e.value().clone()));
    }

    fn next(&mut self) {
        if let Some((key, _)) = self.current.take() {
            self.current = self
                .list
                .lower_bound(Bound::Excluded(&key))
                .map(|e| (e.key().clone(), e.value().clone()));
        }
    }

    fn prev(&mut self) {
        if let Some((key, _)) = self.current.take() {
            self.current = self
                .list
                .upper_bound(Bound::Excluded(&key))
                .map(|e| (e.key().clone(), e.value().clone()));
        }
    }

    fn key(&self) -> &[u8] {
        &self.current.as_ref().unwrap().0 .0
    }

    fn value(&self) -> &[u8] {
        self.current.as_ref().unwrap().1.as_ref()
    }
}
