mod builder;
mod compaction_iter;
pub mod filter;
mod flush_job;
pub mod merge_helper;
mod range_del_aggregator;

use std::sync::Arc;

use async_trait::async_trait;

pub use builder::{build_table, BuildTableResult};
pub use compaction_iter::CompactionIter;
pub use flush_job::{run_flush_memtable_job, FlushJob};
pub use range_del_aggregator::{CompactionRangeDelAggregator, RangeTombstone};

use crate::common::Result;
use crate::memtable::Memtable;
use crate::version::VersionEdit;

/// Sink for version edits. The manifest scheduler is the production
/// implementation; it serializes installation across concurrent jobs.
#[async_trait]
pub trait CompactionEngine: Clone + Sync + Send {
    async fn apply(&mut self, edits: Vec<VersionEdit>) -> Result<()>;
}

/// Why a flush was scheduled. Surfaced in event-log records.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum FlushReason {
    Others,
    GetLiveFiles,
    ShutDown,
    ExternalFileIngestion,
    ManualCompaction,
    WriteBufferManager,
    WriteBufferFull,
    Test,
    DeleteFiles,
    AutoCompaction,
    ManualFlush,
    ErrorRecovery,
    WalFull,
}

pub fn flush_reason_string(reason: FlushReason) -> &'static str {
    match reason {
        FlushReason::Others => "Other Reasons",
        FlushReason::GetLiveFiles => "Get Live Files",
        FlushReason::ShutDown => "Shut down",
        FlushReason::ExternalFileIngestion => "External File Ingestion",
        FlushReason::ManualCompaction => "Manual Compaction",
        FlushReason::WriteBufferManager => "Write Buffer Manager",
        FlushReason::WriteBufferFull => "Write Buffer Full",
        FlushReason::Test => "Test",
        FlushReason::DeleteFiles => "Delete Files",
        FlushReason::AutoCompaction => "Auto Compaction",
        FlushReason::ManualFlush => "Manual Flush",
        FlushReason::ErrorRecovery => "Error Recovery",
        FlushReason::WalFull => "WAL Full",
    }
}

/// Ask from the scheduler to flush everything up to `max_memtable_id` in one
/// column family.
#[derive(Clone)]
pub struct FlushRequest {
    pub cf: u32,
    pub max_memtable_id: u64,
    pub reason: FlushReason,
}

impl FlushRequest {
    pub fn new(cf: u32, max_memtable_id: u64, reason: FlushReason) -> Self {
        Self {
            cf,
            max_memtable_id,
            reason,
        }
    }
}

/// Per-job scratch owned by the worker driving the job. Retired memtables
/// land in `memtables_to_free` for deferred destruction outside the mutex.
#[derive(Default)]
pub struct JobContext {
    pub job_id: u64,
    pub memtables_to_free: Vec<Arc<Memtable>>,
}

impl JobContext {
    pub fn new(job_id: u64) -> Self {
        Self {
            job_id,
            memtables_to_free: vec![],
        }
    }
}

/// Snapshot of a finished flush handed to post-flush subscribers.
#[derive(Clone, Debug)]
pub struct FlushJobInfo {
    pub cf_id: u32,
    pub cf_name: String,
    pub file_path: std::path::PathBuf,
    pub file_number: u64,
    pub job_id: u64,
    pub smallest_seqno: u64,
    pub largest_seqno: u64,
    pub flush_reason: FlushReason,
}
