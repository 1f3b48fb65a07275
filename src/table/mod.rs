mod plain_table;

use async_trait::async_trait;

pub use plain_table::{PlainTableFactory, PlainTableReader};

use crate::common::{InternalKeyComparator, Result, WritableFileWriter};
use crate::iterator::InternalIterator;
use crate::options::CompressionType;

pub struct TableBuilderOptions {
    pub column_family_id: u32,
    pub column_family_name: String,
    pub compression_type: CompressionType,
    pub internal_comparator: InternalKeyComparator,
    pub target_file_size: usize,
    pub skip_filter: bool,
    pub creation_time: u64,
    pub oldest_key_time: u64,
    pub file_creation_time: u64,
    pub db_id: String,
    pub db_session_id: String,
    pub file_number: u64,
}

impl Default for TableBuilderOptions {
    fn default() -> Self {
        Self {
            column_family_id: 0,
            column_family_name: "default".to_string(),
            compression_type: CompressionType::NoCompression,
            internal_comparator: InternalKeyComparator::default(),
            target_file_size: 0,
            skip_filter: false,
            creation_time: 0,
            oldest_key_time: 0,
            file_creation_time: 0,
            db_id: String::new(),
            db_session_id: String::new(),
            file_number: 0,
        }
    }
}

#[derive(Clone)]
pub struct TableReaderOptions {
    pub file_size: usize,
    pub level: u32,
    pub largest_seqno: u64,
    pub internal_comparator: InternalKeyComparator,
}

impl Default for TableReaderOptions {
    fn default() -> Self {
        Self {
            file_size: 0,
            level: 0,
            largest_seqno: 0,
            internal_comparator: InternalKeyComparator::default(),
        }
    }
}

/// Sink producing one sorted table file. Keys must arrive in internal-key
/// order; range deletions may be interleaved and are stored apart.
#[async_trait]
pub trait TableBuilder: Send {
    fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()>;
    fn should_flush(&self) -> bool {
        false
    }
    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }
    async fn finish(&mut self) -> Result<()>;
    fn file_size(&self) -> u64;
    fn num_entries(&self) -> u64;
    fn num_range_deletions(&self) -> u64 {
        0
    }
    fn file_checksum(&self) -> String {
        String::new()
    }
    fn checksum_func_name(&self) -> &'static str {
        "none"
    }
}

pub trait TableReader: Send + Sync {
    fn new_iterator(&self) -> Box<dyn InternalIterator>;
    fn new_range_tombstone_iterator(&self) -> Option<Box<dyn InternalIterator>>;
    fn num_entries(&self) -> u64;
}

pub trait TableFactory: Send + Sync {
    fn name(&self) -> &'static str;
    fn new_builder(
        &self,
        opts: &TableBuilderOptions,
        file: Box<WritableFileWriter>,
    ) -> Result<Box<dyn TableBuilder>>;
    /// `data` is the full file content; the flush engine never reads tables
    /// itself, so readers are only opened by callers that already did the IO.
    fn open_reader(&self, opts: &TableReaderOptions, data: Vec<u8>) -> Result<Box<dyn TableReader>>;
}
