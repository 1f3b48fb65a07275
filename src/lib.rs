mod common;
mod compaction;
mod iterator;
mod log;
mod manifest;
mod memtable;
mod options;
mod table;
mod util;
mod version;

pub use common::{
    make_current_file, make_descriptor_file_name, make_table_file_name, parse_file_name, Clock,
    DBFileType, DefaultUserComparator, Error, FileSystem, FsDirectory, InMemFileSystem,
    InternalKeyComparator, KeyComparator, ManualClock, Result, SyncPosixFileSystem, SystemClock,
    ValueType, WritableFile, WritableFileWriter, MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK,
};

pub use common::format::{make_internal_key, pack_sequence_and_type, ParsedInternalKey};
pub use common::statistics::{Histogram, Statistics, Ticker};

pub use compaction::filter::{
    CompactionFilter, CompactionFilterContext, CompactionFilterDecision, CompactionFilterFactory,
    TableFileCreationReason,
};
pub use compaction::merge_helper::MergeOperator;
pub use compaction::{
    build_table, flush_reason_string, run_flush_memtable_job, BuildTableResult, CompactionEngine,
    CompactionIter, CompactionRangeDelAggregator, FlushJob, FlushJobInfo, FlushReason,
    FlushRequest, JobContext, RangeTombstone,
};

pub use crate::log::{LogWriter, RecordType};
pub use iterator::{InternalIterator, MergingIterator};
pub use manifest::{Manifest, ManifestScheduler, ManifestTask, ManifestWriter};
pub use memtable::Memtable;
pub use options::{
    ColumnFamilyDescriptor, ColumnFamilyOptions, CompactionStyle, CompressionType, DBOptions,
    ImmutableDBOptions, MemPurgePolicy,
};
pub use table::{
    PlainTableFactory, TableBuilder, TableBuilderOptions, TableFactory, TableReader,
    TableReaderOptions,
};
pub use version::snapshot::{
    DisableSnapshotChecker, Snapshot, SnapshotChecker, SnapshotCheckerResult, SnapshotList,
};
pub use version::{
    BlobFileAddition, ColumnFamily, FileDescriptor, FileMetaData, KernelNumberContext,
    LogsWithPrepTracker, MemtableList, Version, VersionEdit, VersionSet, VersionStorageInfo,
};
