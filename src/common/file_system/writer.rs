use std::time::Instant;

use crate::common::statistics::{io_stats_add_bytes_written, io_stats_add_write_nanos};
use crate::common::Result;
use crate::common::WritableFile;

/// Buffered front of a `WritableFile`. Tracks the logical file size and
/// feeds the process-wide IO counters.
pub struct WritableFileWriter {
    file_name: String,
    writable_file: Box<dyn WritableFile>,
    file_size: usize,
}

impl WritableFileWriter {
    pub fn new(writable_file: Box<dyn WritableFile>, file_name: String) -> Self {
        WritableFileWriter {
            file_name,
            writable_file,
            file_size: 0,
        }
    }

    pub async fn append(&mut self, data: &[u8]) -> Result<()> {
        let start = Instant::now();
        self.writable_file.append(data).await?;
        io_stats_add_write_nanos(start.elapsed().as_nanos() as u64);
        io_stats_add_bytes_written(data.len() as u64);
        self.file_size += data.len();
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    pub async fn sync(&mut self) -> Result<()> {
        self.writable_file.sync().await
    }

    pub async fn fsync(&mut self) -> Result<()> {
        self.writable_file.fsync().await
    }

    pub fn file_size(&self) -> usize {
        self.file_size
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}
