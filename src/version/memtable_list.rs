use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::memtable::Memtable;
use crate::version::VersionEdit;

/// Tracks the oldest WAL still holding an unresolved two-phase-commit
/// prepare. 0 means no prepare is outstanding.
#[derive(Default)]
pub struct LogsWithPrepTracker {
    min_log_with_prep: AtomicU64,
}

impl LogsWithPrepTracker {
    pub fn find_min_log_containing_outstanding_prep(&self) -> u64 {
        self.min_log_with_prep.load(Ordering::Acquire)
    }

    pub fn set_min_log_with_prep(&self, log: u64) {
        self.min_log_with_prep.store(log, Ordering::Release);
    }
}

/// A finished flush waiting for its manifest commit. The immutable list only
/// installs the oldest ready prefix, so results can sit here while an older
/// flush is still running.
struct FlushResult {
    mem_ids: Vec<u64>,
    edit: VersionEdit,
    installing: bool,
}

/// The ordered queue of sealed memtables awaiting flush, oldest first.
/// Everything here is guarded by the db mutex.
#[derive(Default)]
pub struct MemtableList {
    mems: Vec<Arc<Memtable>>,
    mempurge_output_ids: HashSet<u64>,
    pending_results: Vec<FlushResult>,
}

impl MemtableList {
    pub fn add(&mut self, mem: Arc<Memtable>) {
        mem.mark_immutable();
        self.mems.push(mem);
    }

    pub fn len(&self) -> usize {
        self.mems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mems.is_empty()
    }

    pub fn mems(&self) -> &[Arc<Memtable>] {
        &self.mems
    }

    /// Selects every sealed memtable up to `max_memtable_id` that no other
    /// job already claimed, in creation order, and claims them.
    pub fn pick_memtables_to_flush(&mut self, max_memtable_id: u64) -> Vec<Arc<Memtable>> {
        let mut picked = vec![];
        for m in &self.mems {
            if m.get_id() > max_memtable_id {
                break;
            }
            if m.is_flush_in_progress() || m.is_flush_completed() {
                continue;
            }
            m.set_flush_in_progress(true);
            picked.push(m.clone());
        }
        picked
    }

    /// Un-claims the memtables of a failed flush so a retry can pick them
    /// again. The output file number dies with the job.
    pub fn rollback_memtable_flush(&mut self, mems: &[Arc<Memtable>], _file_number: u64) {
        for m in mems {
            assert!(m.is_flush_in_progress());
            m.set_flush_in_progress(false);
            m.set_flush_completed(false);
        }
        self.pending_results
            .retain(|r| !mems.iter().any(|m| r.mem_ids.contains(&m.get_id())));
    }

    /// Records a finished flush and returns the edits of the oldest prefix of
    /// memtables whose results are all ready, claiming them for installation.
    /// An empty result means another job will (or already did) commit them.
    ///
    /// With `write_edit` false (mempurge) nothing reaches the manifest: the
    /// inputs are retired on the spot and the caller already inserted the
    /// purged output memtable.
    pub fn try_install_memtable_flush_results(
        &mut self,
        mems: &[Arc<Memtable>],
        edit: VersionEdit,
        write_edit: bool,
        to_free: &mut Vec<Arc<Memtable>>,
    ) -> Vec<VersionEdit> {
        if !write_edit {
            self.retire(mems, to_free);
            return vec![];
        }
        for m in mems {
            m.set_flush_completed(true);
        }
        self.pending_results.push(FlushResult {
            mem_ids: mems.iter().map(|m| m.get_id()).collect(),
            edit,
            installing: false,
        });
        self.collect_ready_installs()
    }

    fn collect_ready_installs(&mut self) -> Vec<VersionEdit> {
        let mut ready_ids: Vec<u64> = vec![];
        for m in &self.mems {
            if !m.is_flush_completed() {
                break;
            }
            ready_ids.push(m.get_id());
        }
        let mut edits = vec![];
        let mut idx = 0;
        while idx < ready_ids.len() {
            let id = ready_ids[idx];
            let result = self
                .pending_results
                .iter_mut()
                .find(|r| r.mem_ids.first() == Some(&id));
            match result {
                Some(r) if r.installing => {
                    // Another job claimed this batch; anything we collect
                    // after it still lands behind it in the manifest queue.
                    idx += r.mem_ids.len();
                }
                Some(r) if r.mem_ids.iter().all(|i| ready_ids.contains(i)) => {
                    r.installing = true;
                    edits.push(r.edit.clone());
                    idx += r.mem_ids.len();
                }
                _ => break,
            }
        }
        edits
    }

    /// Manifest write failed: surrender the claim so the results stay
    /// eligible for the next install attempt.
    pub fn rollback_installs(&mut self, edits: &[VersionEdit]) {
        for e in edits {
            for r in self.pending_results.iter_mut() {
                if r.mem_ids == e.mems_deleted {
                    r.installing = false;
                }
            }
        }
    }

    /// Drops installed memtables from the queue. Called by the manifest job
    /// once the edits hit disk and the new version is current.
    pub fn remove_flushed(&mut self, mem_ids: &[u64], to_free: &mut Vec<Arc<Memtable>>) {
        self.mems.retain(|m| {
            if mem_ids.contains(&m.get_id()) {
                to_free.push(m.clone());
                false
            } else {
                true
            }
        });
        self.pending_results
            .retain(|r| !r.mem_ids.iter().all(|id| mem_ids.contains(id)) || !r.installing);
        for id in mem_ids {
            self.mempurge_output_ids.remove(id);
        }
    }

    // By pointer, not id: a mempurge output shares its id with the oldest
    // input while both are still listed.
    fn retire(&mut self, mems: &[Arc<Memtable>], to_free: &mut Vec<Arc<Memtable>>) {
        self.mems.retain(|m| {
            if mems.iter().any(|picked| Arc::ptr_eq(picked, m)) {
                to_free.push(m.clone());
                false
            } else {
                true
            }
        });
    }

    pub fn add_mempurge_output_id(&mut self, id: u64) {
        self.mempurge_output_ids.insert(id);
    }

    pub fn remove_mempurge_output_id(&mut self, id: u64) {
        self.mempurge_output_ids.remove(&id);
    }

    pub fn is_mempurge_output(&self, id: u64) -> bool {
        self.mempurge_output_ids.contains(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ValueType;

    fn make_mem(id: u64) -> Arc<Memtable> {
        let mem = Memtable::new(id, 4 << 20, 0);
        mem.add(b"k", b"v", id, ValueType::TypeValue);
        Arc::new(mem)
    }

    fn make_edit(mem_ids: &[u64]) -> VersionEdit {
        let mut edit = VersionEdit::default();
        edit.mems_deleted = mem_ids.to_vec();
        edit
    }

    #[test]
    fn test_pick_and_rollback() {
        let mut imm = MemtableList::default();
        for id in 1..=3 {
            imm.add(make_mem(id));
        }
        let picked = imm.pick_memtables_to_flush(2);
        assert_eq!(
            picked.iter().map(|m| m.get_id()).collect::<Vec<_>>(),
            vec![1, 2]
        );
        // Claimed memtables are not picked twice.
        assert!(imm.pick_memtables_to_flush(2).is_empty());

        imm.rollback_memtable_flush(&picked, 7);
        let again = imm.pick_memtables_to_flush(2);
        assert_eq!(again.len(), 2);
        assert_eq!(imm.len(), 3);
    }

    #[test]
    fn test_install_waits_for_oldest() {
        let mut imm = MemtableList::default();
        for id in 1..=4 {
            imm.add(make_mem(id));
        }
        let older = imm.pick_memtables_to_flush(2);
        let newer: Vec<_> = imm.pick_memtables_to_flush(4);
        assert_eq!(newer.iter().map(|m| m.get_id()).collect::<Vec<_>>(), vec![3, 4]);

        let mut to_free = vec![];
        // The newer flush finishes first; nothing is ready because the
        // oldest memtables are still flushing.
        let edits =
            imm.try_install_memtable_flush_results(&newer, make_edit(&[3, 4]), true, &mut to_free);
        assert!(edits.is_empty());

        // Once the older flush lands, both results install in order.
        let edits =
            imm.try_install_memtable_flush_results(&older, make_edit(&[1, 2]), true, &mut to_free);
        assert_eq!(edits.len(), 2);
        assert_eq!(edits[0].mems_deleted, vec![1, 2]);
        assert_eq!(edits[1].mems_deleted, vec![3, 4]);

        imm.remove_flushed(&[1, 2, 3, 4], &mut to_free);
        assert!(imm.is_empty());
        assert_eq!(to_free.len(), 4);
    }

    #[test]
    fn test_mempurge_retires_inputs_without_edit() {
        let mut imm = MemtableList::default();
        for id in 5..=7 {
            imm.add(make_mem(id));
        }
        let inputs = imm.pick_memtables_to_flush(6);
        assert_eq!(inputs.len(), 2);

        // The purge output enters the list first, then the inputs retire
        // with no manifest edit.
        let new_mem = Arc::new(Memtable::new(0, 4 << 20, 0));
        new_mem.set_id(5);
        imm.add(new_mem);
        imm.add_mempurge_output_id(5);
        let mut to_free = vec![];
        let edits =
            imm.try_install_memtable_flush_results(&inputs, make_edit(&[5, 6]), false, &mut to_free);
        assert!(edits.is_empty());

        assert_eq!(imm.len(), 2);
        let ids: Vec<u64> = imm.mems().iter().map(|m| m.get_id()).collect();
        assert_eq!(ids, vec![7, 5]);
        assert!(imm.is_mempurge_output(5));
        assert_eq!(to_free.len(), 2);
    }
}
