use std::sync::Arc;

use crate::common::statistics::Statistics;
use crate::common::{
    Clock, FileSystem, InternalKeyComparator, SyncPosixFileSystem, SystemClock,
};
use crate::compaction::filter::CompactionFilterFactory;
use crate::compaction::merge_helper::MergeOperator;
use crate::table::{PlainTableFactory, TableFactory};

#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum CompressionType {
    NoCompression = 0x0,
    SnappyCompression = 0x1,
    ZlibCompression = 0x2,
    LZ4Compression = 0x4,
    ZSTD = 0x7,
}

impl CompressionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionType::NoCompression => "NoCompression",
            CompressionType::SnappyCompression => "Snappy",
            CompressionType::ZlibCompression => "Zlib",
            CompressionType::LZ4Compression => "LZ4",
            CompressionType::ZSTD => "ZSTD",
        }
    }
}

#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum CompactionStyle {
    Level,
    Fifo,
}

/// How eagerly a flush may try to re-compact its inputs back into memory
/// instead of writing an L0 file.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum MemPurgePolicy {
    Disabled,
    /// Purge unless one of the inputs is itself a previous mempurge output,
    /// which would allow unbounded re-packing of the same records.
    Alternate,
    Always,
}

#[derive(Clone)]
pub struct DBOptions {
    pub max_manifest_file_size: usize,
    pub create_if_missing: bool,
    pub fs: Arc<dyn FileSystem>,
    pub clock: Arc<dyn Clock>,
    pub stats: Arc<Statistics>,
    pub db_path: String,
    pub db_name: String,
    pub max_background_jobs: usize,
    pub experimental_allow_mempurge: bool,
    pub experimental_mempurge_policy: MemPurgePolicy,
    pub flush_verify_memtable_count: bool,
    pub avoid_flush_during_shutdown: bool,
}

impl Default for DBOptions {
    fn default() -> Self {
        Self {
            max_manifest_file_size: 128 * 1024 * 1024,
            create_if_missing: false,
            fs: Arc::new(SyncPosixFileSystem {}),
            clock: Arc::new(SystemClock::default()),
            stats: Arc::new(Statistics::default()),
            db_path: "db".to_string(),
            db_name: "db".to_string(),
            max_background_jobs: 2,
            experimental_allow_mempurge: false,
            experimental_mempurge_policy: MemPurgePolicy::Disabled,
            flush_verify_memtable_count: false,
            avoid_flush_during_shutdown: false,
        }
    }
}

pub struct ImmutableDBOptions {
    pub max_manifest_file_size: usize,
    pub db_path: String,
    pub fs: Arc<dyn FileSystem>,
    pub clock: Arc<dyn Clock>,
    pub stats: Arc<Statistics>,
    pub max_background_jobs: usize,
    pub experimental_allow_mempurge: bool,
    pub experimental_mempurge_policy: MemPurgePolicy,
    pub flush_verify_memtable_count: bool,
}

impl From<DBOptions> for ImmutableDBOptions {
    fn from(opt: DBOptions) -> Self {
        Self {
            max_manifest_file_size: opt.max_manifest_file_size,
            db_path: opt.db_path.clone(),
            fs: opt.fs.clone(),
            clock: opt.clock.clone(),
            stats: opt.stats.clone(),
            max_background_jobs: opt.max_background_jobs,
            experimental_allow_mempurge: opt.experimental_allow_mempurge,
            experimental_mempurge_policy: opt.experimental_mempurge_policy,
            flush_verify_memtable_count: opt.flush_verify_memtable_count,
        }
    }
}

#[derive(Clone)]
pub struct ColumnFamilyOptions {
    pub write_buffer_size: usize,
    pub max_write_buffer_number: usize,
    pub factory: Arc<dyn TableFactory>,
    pub comparator: InternalKeyComparator,
    pub merge_operator: Option<Arc<dyn MergeOperator>>,
    pub compaction_filter_factory: Option<Arc<dyn CompactionFilterFactory>>,
    pub compression: CompressionType,
    pub compaction_style: CompactionStyle,
}

impl Default for ColumnFamilyOptions {
    fn default() -> Self {
        ColumnFamilyOptions {
            write_buffer_size: 4 << 20,
            max_write_buffer_number: 1,
            factory: Arc::new(PlainTableFactory::default()),
            comparator: InternalKeyComparator::default(),
            merge_operator: None,
            compaction_filter_factory: None,
            compression: CompressionType::NoCompression,
            compaction_style: CompactionStyle::Level,
        }
    }
}

#[derive(Clone)]
pub struct ColumnFamilyDescriptor {
    pub name: String,
    pub options: ColumnFamilyOptions,
}
