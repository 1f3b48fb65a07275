use super::{RecordType, BLOCK_SIZE, HEADER_SIZE};
use crate::common::{Result, WritableFileWriter};
use crate::util;
use crc32c::{crc32c, crc32c_append};

fn fragment_type(first: bool, last: bool) -> RecordType {
    match (first, last) {
        (true, true) => RecordType::FullType,
        (true, false) => RecordType::FirstType,
        (false, false) => RecordType::MiddleType,
        (false, true) => RecordType::LastType,
    }
}

/// Writes checksummed records into fixed-size blocks, the manifest's record
/// framing. A record never straddles a block header-less: whatever tail of a
/// block cannot hold a fragment header is zero-filled and the record
/// continues in the next block.
///
/// Each record is assembled in a scratch buffer (fragments plus any block
/// padding) and handed to the file in a single append.
pub struct LogWriter {
    writer: Box<WritableFileWriter>,
    log_number: u64,
    block_offset: usize,
    scratch: Vec<u8>,
}

impl LogWriter {
    pub fn new(writer: Box<WritableFileWriter>, log_number: u64) -> Self {
        LogWriter {
            writer,
            log_number,
            block_offset: 0,
            scratch: vec![],
        }
    }

    pub fn get_log_number(&self) -> u64 {
        self.log_number
    }

    pub fn get_file_size(&self) -> usize {
        self.writer.file_size()
    }

    pub async fn fsync(&mut self) -> Result<()> {
        self.writer.sync().await
    }

    pub async fn add_record(&mut self, data: &[u8]) -> Result<()> {
        self.scratch.clear();
        let mut remaining = data;
        let mut first = true;
        loop {
            let space = BLOCK_SIZE - self.block_offset;
            if space < HEADER_SIZE {
                // Too little room for even a header; pad the block out.
                self.scratch.resize(self.scratch.len() + space, 0);
                self.block_offset = 0;
            }
            let take = std::cmp::min(remaining.len(), BLOCK_SIZE - self.block_offset - HEADER_SIZE);
            let (payload, rest) = remaining.split_at(take);
            let last = rest.is_empty();
            self.encode_fragment(payload, fragment_type(first, last));
            self.block_offset += HEADER_SIZE + take;
            remaining = rest;
            first = false;
            if last {
                break;
            }
        }
        self.writer.append(&self.scratch).await?;
        self.writer.flush().await
    }

    /// Fragment layout: masked crc32c over type and payload (4 LE), payload
    /// length (2 LE), type, payload.
    fn encode_fragment(&mut self, payload: &[u8], tp: RecordType) {
        let crc = crc32c_append(crc32c(&[tp as u8]), payload);
        self.scratch
            .extend_from_slice(&util::crc_mask(crc).to_le_bytes());
        self.scratch
            .extend_from_slice(&(payload.len() as u16).to_le_bytes());
        self.scratch.push(tp as u8);
        self.scratch.extend_from_slice(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{FileSystem, InMemFileSystem};
    use std::path::PathBuf;
    use tokio::runtime::Runtime;

    #[test]
    fn test_log_writer_blocks() {
        let fs = InMemFileSystem::default();
        let file = fs
            .open_writable_file_writer(PathBuf::from("MANIFEST-000001"))
            .unwrap();
        let mut writer = LogWriter::new(file, 1);
        let r = Runtime::new().unwrap();
        r.block_on(writer.add_record(b"hello")).unwrap();
        assert_eq!(writer.get_file_size(), HEADER_SIZE + 5);

        // A record spanning blocks splits into one fragment per block, each
        // with its own header.
        let big = vec![7u8; BLOCK_SIZE * 2];
        r.block_on(writer.add_record(&big)).unwrap();
        r.block_on(writer.fsync()).unwrap();
        let expect_min = HEADER_SIZE + 5 + big.len() + 3 * HEADER_SIZE;
        assert!(writer.get_file_size() >= expect_min);

        // An empty record is a legal full fragment.
        let before = writer.get_file_size();
        r.block_on(writer.add_record(b"")).unwrap();
        assert_eq!(writer.get_file_size(), before + HEADER_SIZE);
    }

    #[test]
    fn test_fragment_types() {
        assert_eq!(fragment_type(true, true), RecordType::FullType);
        assert_eq!(fragment_type(true, false), RecordType::FirstType);
        assert_eq!(fragment_type(false, false), RecordType::MiddleType);
        assert_eq!(fragment_type(false, true), RecordType::LastType);
    }
}
