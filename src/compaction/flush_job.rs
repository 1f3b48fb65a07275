use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::{info, warn};

use crate::common::statistics::{io_stats_delta, io_stats_snapshot, Histogram, Ticker};
use crate::common::{
    make_table_file_name, Error, FsDirectory, Result, ValueType, MAX_SEQUENCE_NUMBER,
};
use crate::compaction::builder::build_table;
use crate::compaction::compaction_iter::CompactionIter;
use crate::compaction::filter::{
    CompactionFilter, CompactionFilterContext, TableFileCreationReason,
};
use crate::compaction::merge_helper::MergeHelper;
use crate::compaction::range_del_aggregator::CompactionRangeDelAggregator;
use crate::compaction::{
    flush_reason_string, CompactionEngine, FlushJobInfo, FlushReason, FlushRequest, JobContext,
};
use crate::iterator::{InternalIterator, MergingIterator};
use crate::memtable::Memtable;
use crate::options::{
    ColumnFamilyOptions, CompactionStyle, CompressionType, ImmutableDBOptions, MemPurgePolicy,
};
use crate::table::TableBuilderOptions;
use crate::version::snapshot::SnapshotChecker;
use crate::version::{FileMetaData, LogsWithPrepTracker, Version, VersionEdit, VersionSet};

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Flushes one batch of sealed memtables of a single column family into an
/// L0 table, or back into one memtable when the mempurge path wins.
///
/// Life of a job: `pick` once under the db mutex, `run` once, and either the
/// results install or the memtables roll back for a retry. `cancel` releases
/// the version reference without running.
pub struct FlushJob<E: CompactionEngine> {
    engine: E,
    version_set: Arc<Mutex<VersionSet>>,
    db_options: Arc<ImmutableDBOptions>,
    cf_options: Arc<ColumnFamilyOptions>,
    cf_id: u32,
    cf_name: String,
    max_memtable_id: u64,
    existing_snapshots: Vec<u64>,
    earliest_write_conflict_snapshot: u64,
    snapshot_checker: Option<Arc<dyn SnapshotChecker>>,
    job_context: JobContext,
    output_file_directory: Option<Arc<dyn FsDirectory>>,
    output_compression: CompressionType,
    shutting_down: Arc<AtomicBool>,
    sync_output_directory: bool,
    write_manifest: bool,
    measure_io_stats: bool,
    db_id: String,
    db_session_id: String,
    full_history_ts_low: Vec<u8>,

    mems: Vec<Arc<Memtable>>,
    edit: VersionEdit,
    meta: FileMetaData,
    base: Option<Arc<Version>>,
    pick_memtable_called: bool,
    contains_mempurge_outcome: bool,
    flush_reason: FlushReason,
    io_status: Result<()>,
}

impl<E: CompactionEngine> FlushJob<E> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: E,
        version_set: Arc<Mutex<VersionSet>>,
        db_options: Arc<ImmutableDBOptions>,
        cf_options: Arc<ColumnFamilyOptions>,
        cf_id: u32,
        max_memtable_id: u64,
        existing_snapshots: Vec<u64>,
        earliest_write_conflict_snapshot: u64,
        snapshot_checker: Option<Arc<dyn SnapshotChecker>>,
        job_context: JobContext,
        output_file_directory: Option<Arc<dyn FsDirectory>>,
        output_compression: CompressionType,
        shutting_down: Arc<AtomicBool>,
        db_id: String,
        db_session_id: String,
        full_history_ts_low: Vec<u8>,
        sync_output_directory: bool,
        write_manifest: bool,
        measure_io_stats: bool,
    ) -> Self {
        Self {
            engine,
            version_set,
            db_options,
            cf_options,
            cf_id,
            cf_name: String::new(),
            max_memtable_id,
            existing_snapshots,
            earliest_write_conflict_snapshot,
            snapshot_checker,
            job_context,
            output_file_directory,
            output_compression,
            shutting_down,
            sync_output_directory,
            write_manifest,
            measure_io_stats,
            db_id,
            db_session_id,
            full_history_ts_low,
            mems: vec![],
            edit: VersionEdit::default(),
            meta: FileMetaData::new(0, 0, vec![], vec![]),
            base: None,
            pick_memtable_called: false,
            contains_mempurge_outcome: false,
            flush_reason: FlushReason::Others,
            io_status: Ok(()),
        }
    }

    /// Selects the input memtables. Must run under the db mutex and exactly
    /// once; calling it twice is a programming error.
    pub fn pick_memtable(&mut self) {
        assert!(!self.pick_memtable_called);
        self.pick_memtable_called = true;
        let mut vs = self.version_set.lock().unwrap();
        let kernel = vs.get_kernel();
        let cf = match vs.mut_column_family(self.cf_id) {
            Some(cf) => cf,
            None => return,
        };
        self.cf_name = cf.get_name().to_string();
        self.flush_reason = cf.get_flush_reason();
        self.mems = cf.imm.pick_memtables_to_flush(self.max_memtable_id);
        if self.mems.is_empty() {
            return;
        }

        // The last memtable's next-log bound tells recovery which WALs are
        // no longer needed once this flush lands.
        self.edit.set_prev_log_number(0);
        self.edit
            .set_log_number(self.mems.last().unwrap().get_next_log_number());
        self.edit.column_family = self.cf_id;
        self.edit.mems_deleted = self.mems.iter().map(|m| m.get_id()).collect();

        self.meta = FileMetaData::new(kernel.new_file_number(), 0, vec![], vec![]);

        if self.db_options.experimental_allow_mempurge {
            self.contains_mempurge_outcome = self
                .mems
                .iter()
                .any(|m| cf.imm.is_mempurge_output(m.get_id()));
        }

        self.base = Some(cf.current());
    }

    /// Releases the version reference of a job that will never run. Under
    /// the db mutex.
    pub fn cancel(&mut self) {
        let _vs = self.version_set.lock().unwrap();
        assert!(self.base.is_some());
        self.base.take();
    }

    pub fn io_status(&self) -> Result<()> {
        self.io_status.clone()
    }

    /// The event snapshot subscribers receive after the flush. Valid once
    /// `pick_memtable` assigned the output file number.
    pub fn flush_job_info(&self) -> FlushJobInfo {
        FlushJobInfo {
            cf_id: self.cf_id,
            cf_name: self.cf_name.clone(),
            file_path: make_table_file_name(&self.db_options.db_path, self.meta.id()),
            file_number: self.meta.id(),
            job_id: self.job_context.job_id,
            smallest_seqno: self.meta.fd.smallest_seqno,
            largest_seqno: self.meta.fd.largest_seqno,
            flush_reason: self.flush_reason,
        }
    }

    pub async fn run(
        &mut self,
        prep_tracker: Option<&LogsWithPrepTracker>,
    ) -> Result<Option<FileMetaData>> {
        assert!(self.pick_memtable_called);
        if self.mems.is_empty() {
            info!("[{}] Nothing in memtable to flush", self.cf_name);
            return Ok(None);
        }

        let prev_io_stats = io_stats_snapshot();

        let mut mempurge_ok = false;
        if self.db_options.experimental_allow_mempurge
            && self.flush_reason == FlushReason::WriteBufferFull
            && self.mem_purge_decider()
        {
            match self.mem_purge().await {
                Ok(()) => mempurge_ok = true,
                Err(e) if e.is_aborted() => {
                    info!("[{}] Mempurge process aborted: {}", self.cf_name, e);
                }
                Err(e) => {
                    warn!("[{}] Mempurge process failed: {}", self.cf_name, e);
                }
            }
        }

        let mut s: Result<()> = if mempurge_ok {
            self.base.take();
            Ok(())
        } else {
            self.write_level0_table().await
        };

        if let Some(tracker) = prep_tracker {
            let min_prep = tracker.find_min_log_containing_outstanding_prep();
            if min_prep > 0 && min_prep < self.edit.get_log_number() {
                self.edit.set_min_log_number_to_keep(min_prep);
            }
        }

        let mut edits_to_apply: Vec<VersionEdit> = vec![];
        {
            let mut vs = self.version_set.lock().unwrap();
            let dropped = vs
                .get_column_family(self.cf_id)
                .map_or(true, |cf| cf.is_dropped());
            if s.is_ok() && dropped {
                s = Err(Error::ColumnFamilyDropped);
            }
            if (s.is_ok() || matches!(s, Err(Error::ColumnFamilyDropped)))
                && self.shutting_down.load(Ordering::Acquire)
            {
                s = Err(Error::ShutdownInProgress);
            }

            match &s {
                Err(_) => {
                    if let Some(cf) = vs.mut_column_family(self.cf_id) {
                        cf.imm.rollback_memtable_flush(&self.mems, self.meta.id());
                    }
                }
                Ok(()) => {
                    if self.write_manifest {
                        let cf = vs.mut_column_family(self.cf_id).unwrap();
                        edits_to_apply = cf.imm.try_install_memtable_flush_results(
                            &self.mems,
                            self.edit.clone(),
                            !mempurge_ok,
                            &mut self.job_context.memtables_to_free,
                        );
                    }
                }
            }
        }

        if s.is_ok() && !edits_to_apply.is_empty() {
            // The mutex is released while the manifest writes; the scheduler
            // serializes installs across jobs.
            if let Err(e) = self.engine.apply(edits_to_apply.clone()).await {
                self.io_status = Err(e.clone());
                let mut vs = self.version_set.lock().unwrap();
                vs.rollback_installs(self.cf_id, &edits_to_apply);
                s = Err(e);
            }
        }

        // The version reference from pick is released no matter how the job
        // ended.
        self.base.take();

        let io_delta = io_stats_delta(&prev_io_stats);
        self.db_options
            .stats
            .record_tick(Ticker::FlushWriteBytes, io_delta.bytes_written);
        self.log_flush_finished(&s, mempurge_ok, &io_delta);

        match s {
            Ok(()) if !mempurge_ok => Ok(Some(self.meta.clone())),
            Ok(()) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn mem_purge_decider(&self) -> bool {
        match self.db_options.experimental_mempurge_policy {
            MemPurgePolicy::Always => true,
            MemPurgePolicy::Alternate => !self.contains_mempurge_outcome,
            MemPurgePolicy::Disabled => false,
        }
    }

    fn create_compaction_filter(&self) -> Result<Option<Box<dyn CompactionFilter>>> {
        let factory = match &self.cf_options.compaction_filter_factory {
            Some(f) => f,
            None => return Ok(None),
        };
        if !factory.should_filter_table_file_creation(TableFileCreationReason::Flush) {
            return Ok(None);
        }
        let ctx = CompactionFilterContext {
            is_full_compaction: false,
            is_manual_compaction: false,
            column_family_id: self.cf_id,
            reason: TableFileCreationReason::Flush,
        };
        let filter = factory.create_compaction_filter(&ctx);
        if !filter.ignore_snapshots() {
            return Err(Error::NotSupported(
                "CompactionFilter::ignore_snapshots() = false is not supported anymore".to_string(),
            ));
        }
        Ok(Some(filter))
    }

    /// Assembles the merged cursor and the snapshot-aware iterator over the
    /// picked memtables. Shared by the disk and mempurge paths.
    fn make_flush_iterator(
        &self,
        compaction_filter: Option<Box<dyn CompactionFilter>>,
    ) -> CompactionIter {
        let mut memtables: Vec<Box<dyn InternalIterator>> = vec![];
        let mut range_del_agg = CompactionRangeDelAggregator::new(
            self.cf_options.comparator.get_user_comparator().clone(),
            self.existing_snapshots.clone(),
        );
        for m in &self.mems {
            memtables.push(m.new_iterator());
            if let Some(range_del_iter) = m.new_range_tombstone_iterator() {
                range_del_agg.add_tombstones(range_del_iter);
            }
        }
        let merged = Box::new(MergingIterator::new(
            memtables,
            self.cf_options.comparator.clone(),
        ));
        let merge_helper = self.cf_options.merge_operator.clone().map(|op| {
            MergeHelper::new(op, self.cf_options.comparator.get_user_comparator().clone())
        });
        CompactionIter::new(
            merged,
            self.cf_options.comparator.get_user_comparator().clone(),
            self.existing_snapshots.clone(),
            self.earliest_write_conflict_snapshot,
            self.snapshot_checker.clone(),
            range_del_agg,
            merge_helper,
            compaction_filter,
            false,
            &self.full_history_ts_low,
        )
    }

    /// The in-memory alternative: re-pack the filtered inputs into one new
    /// memtable and skip the disk entirely. Aborts on overflow; any abort or
    /// error falls back to the normal flush.
    async fn mem_purge(&mut self) -> Result<()> {
        let clock = self.db_options.clock.clone();
        let start_micros = clock.now_micros();
        let start_cpu_micros = clock.cpu_nanos() / 1000;
        assert!(!self.mems.is_empty());

        let mut new_mem_capacity = 0.0;
        let result = self.mem_purge_impl(&mut new_mem_capacity).await;

        let micros = clock.now_micros() - start_micros;
        let cpu_micros = clock.cpu_nanos() / 1000 - start_cpu_micros;
        info!(
            "[{}] [JOB {}] Mempurge lasted {} microseconds, and {} cpu microseconds. Status is {}ok. Perc capacity: {}",
            self.cf_name,
            self.job_context.job_id,
            micros,
            cpu_micros,
            if result.is_ok() { "" } else { "not " },
            new_mem_capacity
        );
        result
    }

    async fn mem_purge_impl(&mut self, new_mem_capacity: &mut f64) -> Result<()> {
        let max_size = self.cf_options.write_buffer_size;

        let mut first_seqno = MAX_SEQUENCE_NUMBER;
        let mut earliest_seqno = MAX_SEQUENCE_NUMBER;
        for mem in &self.mems {
            first_seqno = std::cmp::min(first_seqno, mem.get_first_sequence_number());
            earliest_seqno = std::cmp::min(earliest_seqno, mem.get_earliest_sequence_number());
        }

        let compaction_filter = self.create_compaction_filter()?;
        let mut c_iter = self.make_flush_iterator(compaction_filter);
        c_iter.seek_to_first();
        if !c_iter.valid() && c_iter.range_del_agg_mut().is_empty() {
            c_iter.status()?;
            // Nothing live at all; the inputs simply retire.
            return Ok(());
        }

        let new_mem = Arc::new(Memtable::new(0, max_size, earliest_seqno));
        new_mem.set_first_sequence_number(first_seqno);
        let mut new_first_seqno = MAX_SEQUENCE_NUMBER;

        while c_iter.valid() {
            new_first_seqno = std::cmp::min(new_first_seqno, c_iter.current_sequence());
            new_mem.add(
                c_iter.user_key(),
                c_iter.value(),
                c_iter.current_sequence(),
                c_iter.current_value_type(),
            );
            if new_mem.approximate_memory_usage() > max_size {
                *new_mem_capacity = 1.0;
                return Err(Error::Aborted(
                    "Mempurge filled more than one memtable.".to_string(),
                ));
            }
            c_iter.next();
        }
        c_iter.status()?;

        // Replay the surviving range tombstones into the new memtable. Their
        // order against the point keys does not matter; the memtable sorts.
        for tombstone in c_iter.range_del_agg_mut().tombstones() {
            new_first_seqno = std::cmp::min(new_first_seqno, tombstone.sequence);
            new_mem.add(
                &tombstone.start_key,
                &tombstone.end_key,
                tombstone.sequence,
                ValueType::TypeRangeDeletion,
            );
            if new_mem.approximate_memory_usage() > max_size {
                *new_mem_capacity = 1.0;
                return Err(Error::Aborted(
                    "Mempurge filled more than one memtable.".to_string(),
                ));
            }
        }

        if new_first_seqno == MAX_SEQUENCE_NUMBER {
            // Everything was filtered out; the freshly allocated memtable
            // goes straight to the free list.
            self.job_context.memtables_to_free.push(new_mem);
            return Ok(());
        }

        new_mem.set_first_sequence_number(new_first_seqno);
        if new_mem.approximate_memory_usage() < max_size && !new_mem.should_flush_now() {
            let mut vs = self.version_set.lock().unwrap();
            let cf = vs
                .mut_column_family(self.cf_id)
                .ok_or(Error::ColumnFamilyDropped)?;
            let mut new_mem_id = self.mems[0].get_id();
            for m in &self.mems {
                new_mem_id = std::cmp::min(new_mem_id, m.get_id());
                cf.imm.remove_mempurge_output_id(m.get_id());
            }
            new_mem.set_id(new_mem_id);
            cf.imm.add_mempurge_output_id(new_mem_id);
            *new_mem_capacity = new_mem.approximate_memory_usage() as f64 / max_size as f64;
            // Entering the list without scheduling another flush; the
            // scheduler only sees that memory pressure dropped.
            cf.imm.add(new_mem);
            Ok(())
        } else {
            *new_mem_capacity = 1.0;
            self.job_context.memtables_to_free.push(new_mem);
            Err(Error::Aborted(
                "Mempurge filled more than one memtable.".to_string(),
            ))
        }
    }

    async fn write_level0_table(&mut self) -> Result<()> {
        let clock = self.db_options.clock.clone();
        let start_micros = clock.now_micros();
        let start_cpu_micros = clock.cpu_nanos() / 1000;

        let mut total_num_entries = 0;
        let mut total_num_deletes = 0;
        let mut total_data_size = 0;
        let mut total_memory_usage = 0;
        for m in &self.mems {
            info!(
                "[{}] [JOB {}] Flushing memtable with next log file: {}",
                self.cf_name,
                self.job_context.job_id,
                m.get_next_log_number()
            );
            total_num_entries += m.num_entries();
            total_num_deletes += m.num_deletes();
            total_data_size += m.get_data_size();
            total_memory_usage += m.approximate_memory_usage();
        }
        info!(
            "[{}] [JOB {}] event: flush_started, num_memtables: {}, num_entries: {}, num_deletes: {}, total_data_size: {}, memory_usage: {}, flush_reason: {}",
            self.cf_name,
            self.job_context.job_id,
            self.mems.len(),
            total_num_entries,
            total_num_deletes,
            total_data_size,
            total_memory_usage,
            flush_reason_string(self.flush_reason)
        );

        let current_time = match clock.current_time() {
            Ok(t) => t,
            Err(e) => {
                // Safe to proceed; the file just loses its creation stamp.
                warn!(
                    "Failed to get current time to populate creation_time property. Status: {}",
                    e
                );
                0
            }
        };
        let oldest_key_time = self
            .mems
            .first()
            .map(|m| m.approximate_oldest_key_time())
            .unwrap_or(u64::MAX);
        let oldest_ancester_time = std::cmp::min(current_time, oldest_key_time);
        self.meta.oldest_ancester_time = oldest_ancester_time;
        self.meta.file_creation_time = current_time;
        let creation_time = if self.cf_options.compaction_style == CompactionStyle::Fifo {
            current_time
        } else {
            oldest_ancester_time
        };

        info!(
            "[{}] [JOB {}] Level-0 flush table #{}: started",
            self.cf_name,
            self.job_context.job_id,
            self.meta.id()
        );

        let compaction_filter = self.create_compaction_filter()?;
        let mut c_iter = self.make_flush_iterator(compaction_filter);

        let tboptions = TableBuilderOptions {
            column_family_id: self.cf_id,
            column_family_name: self.cf_name.clone(),
            compression_type: self.output_compression,
            internal_comparator: self.cf_options.comparator.clone(),
            target_file_size: 0,
            skip_filter: false,
            creation_time,
            oldest_key_time,
            file_creation_time: current_time,
            db_id: self.db_id.clone(),
            db_session_id: self.db_session_id.clone(),
            file_number: self.meta.id(),
        };
        let mut io_s: Result<()> = Ok(());
        let build_result = build_table(
            self.db_options.as_ref(),
            tboptions,
            self.cf_options.factory.clone(),
            &self.cf_options.comparator,
            &mut c_iter,
            &mut self.meta,
            &mut io_s,
        )
        .await;
        if io_s.is_err() {
            self.io_status = io_s;
        }

        let mut blob_file_additions = vec![];
        let mut s: Result<()> = match build_result {
            Ok(outputs) => {
                self.db_options.stats.record_tick(
                    Ticker::MemtablePayloadBytesAtFlush,
                    outputs.memtable_payload_bytes,
                );
                self.db_options.stats.record_tick(
                    Ticker::MemtableGarbageBytesAtFlush,
                    outputs.memtable_garbage_bytes,
                );
                blob_file_additions = outputs.blob_file_additions;
                if outputs.num_input_entries != total_num_entries {
                    let msg = format!(
                        "Expected {} entries in memtables, but read {}",
                        total_num_entries, outputs.num_input_entries
                    );
                    warn!(
                        "[{}] [JOB {}] Level-0 flush {}",
                        self.cf_name, self.job_context.job_id, msg
                    );
                    if self.db_options.flush_verify_memtable_count {
                        Err(Error::Corruption(msg))
                    } else {
                        Ok(())
                    }
                } else {
                    Ok(())
                }
            }
            Err(e) => Err(e),
        };

        info!(
            "[{}] [JOB {}] Level-0 flush table #{}: {} bytes {}",
            self.cf_name,
            self.job_context.job_id,
            self.meta.id(),
            self.meta.fd.file_size,
            match &s {
                Ok(()) => "OK".to_string(),
                Err(e) => format!("{}", e),
            }
        );

        if s.is_ok() && self.sync_output_directory {
            if let Some(dir) = &self.output_file_directory {
                if let Err(e) = dir.fsync().await {
                    self.io_status = Err(e.clone());
                    s = Err(e);
                }
            }
        }

        {
            let mut vs = self.version_set.lock().unwrap();
            self.base.take();

            // A zero-size output means everything was deleted; the file does
            // not exist and must not enter the edit.
            let has_output = self.meta.fd.file_size > 0;
            if s.is_ok() && has_output {
                self.edit.add_file_meta(&self.meta);
                self.edit.set_blob_file_additions(blob_file_additions);
            }
            let info = self.flush_job_info();
            self.mems[0].set_flush_job_info(info);

            if self.db_options.experimental_allow_mempurge && s.is_ok() {
                if let Some(cf) = vs.mut_column_family(self.cf_id) {
                    for m in &self.mems {
                        cf.imm.remove_mempurge_output_id(m.get_id());
                    }
                }
            }
        }

        let micros = clock.now_micros() - start_micros;
        let cpu_micros = clock.cpu_nanos() / 1000 - start_cpu_micros;
        self.db_options
            .stats
            .record_time(Histogram::FlushTimeMicros, micros);
        info!(
            "[{}] [JOB {}] Flush lasted {} microseconds, and {} cpu microseconds.",
            self.cf_name, self.job_context.job_id, micros, cpu_micros
        );

        s
    }

    fn log_flush_finished(
        &self,
        s: &Result<()>,
        mempurge_ok: bool,
        io_delta: &crate::common::statistics::IoStatsSnapshot,
    ) {
        let (lsm_state, imm_count) = {
            let vs = self.version_set.lock().unwrap();
            match vs.get_column_family(self.cf_id) {
                Some(cf) => {
                    let current = cf.current();
                    let info = current.get_storage_info();
                    let state: Vec<usize> = (0..info.num_levels())
                        .map(|l| info.num_level_files(l))
                        .collect();
                    (state, cf.imm.len())
                }
                None => (vec![], 0),
            }
        };
        let mut record = format!(
            "[{}] [JOB {}] event: flush_finished, output_compression: {}, mempurge: {}, lsm_state: {:?}, immutable_memtables: {}, status: {}",
            self.cf_name,
            self.job_context.job_id,
            self.output_compression.as_str(),
            mempurge_ok,
            lsm_state,
            imm_count,
            match s {
                Ok(()) => "OK".to_string(),
                Err(e) => format!("{}", e),
            }
        );
        if self.measure_io_stats {
            record.push_str(&format!(
                ", file_write_nanos: {}, file_fsync_nanos: {}, bytes_written: {}",
                io_delta.write_nanos, io_delta.fsync_nanos, io_delta.bytes_written
            ));
        }
        info!("{}", record);
    }
}

/// Drives one or more flush requests to completion on the calling worker.
/// This is the narrow waist between the write path that seals memtables and
/// the compaction layer that consumes L0 files.
#[allow(clippy::too_many_arguments)]
pub async fn run_flush_memtable_job<E: CompactionEngine>(
    engine: E,
    requests: Vec<FlushRequest>,
    version_set: Arc<Mutex<VersionSet>>,
    shutting_down: Arc<AtomicBool>,
    db_options: Arc<ImmutableDBOptions>,
    cf_options: HashMap<u32, Arc<ColumnFamilyOptions>>,
    existing_snapshots: Vec<u64>,
    earliest_write_conflict_snapshot: u64,
    output_file_directory: Option<Arc<dyn FsDirectory>>,
) -> Result<Vec<Option<FileMetaData>>> {
    let prep_tracker = LogsWithPrepTracker::default();
    let mut results = vec![];
    for request in requests {
        let opts = match cf_options.get(&request.cf) {
            Some(opts) => opts.clone(),
            None => continue,
        };
        {
            let mut vs = version_set.lock().unwrap();
            match vs.mut_column_family(request.cf) {
                Some(cf) => cf.set_flush_reason(request.reason),
                None => continue,
            }
        }
        let job_id = NEXT_JOB_ID.fetch_add(1, Ordering::SeqCst);
        let compression = opts.compression;
        let mut job = FlushJob::new(
            engine.clone(),
            version_set.clone(),
            db_options.clone(),
            opts,
            request.cf,
            request.max_memtable_id,
            existing_snapshots.clone(),
            earliest_write_conflict_snapshot,
            None,
            JobContext::new(job_id),
            output_file_directory.clone(),
            compression,
            shutting_down.clone(),
            String::new(),
            String::new(),
            vec![],
            output_file_directory.is_some(),
            true,
            false,
        );
        job.pick_memtable();
        results.push(job.run(Some(&prep_tracker)).await?);
    }
    Ok(results)
}
