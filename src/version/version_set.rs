use std::collections::HashMap;
use std::sync::{atomic, Arc};

use crate::common::{Error, KeyComparator, Result, MAX_SEQUENCE_NUMBER};
use crate::memtable::Memtable;
use crate::options::ColumnFamilyDescriptor;
use crate::version::column_family::ColumnFamily;
use crate::version::{Version, VersionEdit};

const DEFAULT_NUM_LEVELS: usize = 7;

/// Monotone number allocators shared by everything that mints file, memtable
/// and sequence numbers.
#[derive(Default)]
pub struct KernelNumberContext {
    next_file_number: atomic::AtomicU64,
    next_mem_number: atomic::AtomicU64,
    last_sequence: atomic::AtomicU64,
}

impl KernelNumberContext {
    pub fn current_next_file_number(&self) -> u64 {
        self.next_file_number.load(atomic::Ordering::Acquire)
    }

    pub fn new_file_number(&self) -> u64 {
        self.next_file_number.fetch_add(1, atomic::Ordering::SeqCst)
    }

    pub fn new_memtable_number(&self) -> u64 {
        self.next_mem_number.fetch_add(1, atomic::Ordering::SeqCst)
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence.load(atomic::Ordering::Acquire)
    }

    pub fn set_last_sequence(&self, v: u64) {
        self.last_sequence.store(v, atomic::Ordering::Release);
    }

    pub fn mark_file_number_used(&self, v: u64) {
        let mut old = self.next_file_number.load(atomic::Ordering::Acquire);
        while old <= v {
            match self.next_file_number.compare_exchange(
                old,
                v + 1,
                atomic::Ordering::SeqCst,
                atomic::Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(x) => old = x,
            }
        }
    }
}

/// The state behind the db mutex: every column family's memtables, immutable
/// list and current version. One flush job locks this around `pick` and the
/// install phase, never across I/O.
pub struct VersionSet {
    kernel: Arc<KernelNumberContext>,
    column_family_set: HashMap<u32, ColumnFamily>,
}

impl VersionSet {
    pub fn new(cf_descriptors: &[ColumnFamilyDescriptor]) -> Self {
        let kernel = Arc::new(KernelNumberContext::default());
        kernel.mark_file_number_used(1);
        let mut column_family_set = HashMap::default();
        for (idx, desc) in cf_descriptors.iter().enumerate() {
            let cf_id = idx as u32;
            let mem = Memtable::new(
                kernel.new_memtable_number(),
                desc.options.write_buffer_size,
                MAX_SEQUENCE_NUMBER,
            );
            let version = Arc::new(Version::new(
                cf_id,
                desc.name.clone(),
                desc.options.comparator.name().to_string(),
                vec![],
                0,
                DEFAULT_NUM_LEVELS,
            ));
            column_family_set.insert(
                cf_id,
                ColumnFamily::new(cf_id, desc.name.clone(), mem, version, desc.options.clone()),
            );
        }
        VersionSet {
            kernel,
            column_family_set,
        }
    }

    pub fn get_kernel(&self) -> Arc<KernelNumberContext> {
        self.kernel.clone()
    }

    pub fn new_file_number(&self) -> u64 {
        self.kernel.new_file_number()
    }

    pub fn get_column_family(&self, cf_id: u32) -> Option<&ColumnFamily> {
        self.column_family_set.get(&cf_id)
    }

    pub fn mut_column_family(&mut self, cf_id: u32) -> Option<&mut ColumnFamily> {
        self.column_family_set.get_mut(&cf_id)
    }

    pub fn get_column_family_versions(&self) -> Vec<Arc<Version>> {
        self.column_family_set
            .values()
            .map(|cf| cf.current())
            .collect()
    }

    /// Seals the active memtable of `cf` and mounts a fresh one whose
    /// earliest sequence is `earliest_seq`.
    pub fn switch_memtable(&mut self, cf: u32, earliest_seq: u64) -> Arc<Memtable> {
        let kernel = self.kernel.clone();
        let cf = self.column_family_set.get_mut(&cf).unwrap();
        let mem = Arc::new(Memtable::new(
            kernel.new_memtable_number(),
            cf.get_options().write_buffer_size,
            earliest_seq,
        ));
        cf.switch_memtable(mem.clone());
        mem
    }

    /// Applies one flush edit worth of state: new version current, flushed
    /// memtables out of the immutable list.
    pub fn install_version(
        &mut self,
        cf_id: u32,
        mems: Vec<u64>,
        version: Version,
        to_free: &mut Vec<Arc<Memtable>>,
    ) -> Result<Arc<Version>> {
        match self.column_family_set.get_mut(&cf_id) {
            Some(cf) => {
                let version = Arc::new(version);
                cf.imm.remove_flushed(&mems, to_free);
                cf.set_current(version.clone());
                cf.set_log_number(version.get_log_number());
                Ok(version)
            }
            None => Err(Error::ColumnFamilyDropped),
        }
    }

    /// Backs out a manifest write that never hit disk.
    pub fn rollback_installs(&mut self, cf_id: u32, edits: &[VersionEdit]) {
        if let Some(cf) = self.column_family_set.get_mut(&cf_id) {
            cf.imm.rollback_installs(edits);
        }
    }

    pub fn drop_column_family(&mut self, cf_id: u32) {
        if let Some(cf) = self.column_family_set.get_mut(&cf_id) {
            cf.drop_column_family();
        }
    }
}
