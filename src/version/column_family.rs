use std::sync::Arc;

use crate::compaction::FlushReason;
use crate::memtable::Memtable;
use crate::options::ColumnFamilyOptions;
use crate::version::{MemtableList, Version};

/// One column family's mutable state. Lives inside the version set and is
/// guarded by the same db mutex.
pub struct ColumnFamily {
    id: u32,
    name: String,
    mem: Arc<Memtable>,
    pub imm: MemtableList,
    current: Arc<Version>,
    options: Arc<ColumnFamilyOptions>,
    dropped: bool,
    flush_reason: FlushReason,
    log_number: u64,
}

impl ColumnFamily {
    pub fn new(
        id: u32,
        name: String,
        mem: Memtable,
        current: Arc<Version>,
        options: ColumnFamilyOptions,
    ) -> Self {
        Self {
            id,
            name,
            mem: Arc::new(mem),
            imm: MemtableList::default(),
            current,
            options: Arc::new(options),
            dropped: false,
            flush_reason: FlushReason::Others,
            log_number: 0,
        }
    }

    pub fn get_id(&self) -> u32 {
        self.id
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_options(&self) -> Arc<ColumnFamilyOptions> {
        self.options.clone()
    }

    pub fn get_memtable(&self) -> Arc<Memtable> {
        self.mem.clone()
    }

    pub fn current(&self) -> Arc<Version> {
        self.current.clone()
    }

    pub fn set_current(&mut self, version: Arc<Version>) {
        self.current = version;
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped
    }

    pub fn drop_column_family(&mut self) {
        self.dropped = true;
    }

    pub fn get_flush_reason(&self) -> FlushReason {
        self.flush_reason
    }

    pub fn set_flush_reason(&mut self, reason: FlushReason) {
        self.flush_reason = reason;
    }

    pub fn get_log_number(&self) -> u64 {
        self.log_number
    }

    pub fn set_log_number(&mut self, log_number: u64) {
        self.log_number = log_number;
    }

    /// Seals the active memtable into the immutable list and mounts the
    /// fresh one in its place.
    pub fn switch_memtable(&mut self, new_mem: Arc<Memtable>) {
        let old = std::mem::replace(&mut self.mem, new_mem);
        self.imm.add(old);
    }
}
