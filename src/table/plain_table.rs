use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use crc32c::crc32c;

use crate::common::format::extract_value_type;
use crate::common::{
    Error, InternalKeyComparator, KeyComparator, Result, ValueType, WritableFileWriter,
};
use crate::iterator::InternalIterator;
use crate::table::{
    TableBuilder, TableBuilderOptions, TableFactory, TableReader, TableReaderOptions,
};
use crate::util::{crc_mask, crc_unmask, decode_fixed_uint32, decode_fixed_uint64, get_var_uint32, put_var_uint32};

const PLAIN_TABLE_MAGIC: u64 = 0x6c62_7470_6e69_616c; // "plaintbl", mangled
const FOOTER_SIZE: usize = 4 * 8 + 4 + 8;

/// Flat table layout: a point section and a range-deletion section of
/// length-prefixed entries, then a fixed footer.
///
/// ```text
/// [point entries][range entries]
/// [point_len u64][range_len u64][num_entries u64][num_range u64]
/// [masked crc32c u32][magic u64]
/// ```
pub struct PlainTableBuilder {
    file: Box<WritableFileWriter>,
    buf: Vec<u8>,
    range_buf: Vec<u8>,
    num_entries: u64,
    num_range_deletions: u64,
    file_size: u64,
    checksum: u32,
}

impl PlainTableBuilder {
    fn new(file: Box<WritableFileWriter>) -> Self {
        Self {
            file,
            buf: vec![],
            range_buf: vec![],
            num_entries: 0,
            num_range_deletions: 0,
            file_size: 0,
            checksum: 0,
        }
    }
}

#[async_trait]
impl TableBuilder for PlainTableBuilder {
    fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.len() < 8 {
            return Err(Error::Corruption(format!(
                "key too short for an internal key: {}",
                key.len()
            )));
        }
        let buf = if extract_value_type(key) == ValueType::TypeRangeDeletion {
            self.num_range_deletions += 1;
            &mut self.range_buf
        } else {
            self.num_entries += 1;
            &mut self.buf
        };
        put_var_uint32(buf, key.len() as u32);
        buf.extend_from_slice(key);
        put_var_uint32(buf, value.len() as u32);
        buf.extend_from_slice(value);
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        let mut footer = Vec::with_capacity(FOOTER_SIZE);
        footer.extend_from_slice(&(self.buf.len() as u64).to_le_bytes());
        footer.extend_from_slice(&(self.range_buf.len() as u64).to_le_bytes());
        footer.extend_from_slice(&self.num_entries.to_le_bytes());
        footer.extend_from_slice(&self.num_range_deletions.to_le_bytes());

        let mut crc = crc32c(&self.buf);
        crc = crc32c::crc32c_append(crc, &self.range_buf);
        crc = crc32c::crc32c_append(crc, &footer);
        self.checksum = crc;
        footer.extend_from_slice(&crc_mask(crc).to_le_bytes());
        footer.extend_from_slice(&PLAIN_TABLE_MAGIC.to_le_bytes());

        self.file.append(&self.buf).await?;
        self.file.append(&self.range_buf).await?;
        self.file.append(&footer).await?;
        self.file.sync().await?;
        self.file_size = self.file.file_size() as u64;
        Ok(())
    }

    fn file_size(&self) -> u64 {
        self.file_size
    }

    fn num_entries(&self) -> u64 {
        self.num_entries
    }

    fn num_range_deletions(&self) -> u64 {
        self.num_range_deletions
    }

    fn file_checksum(&self) -> String {
        format!("{:08x}", self.checksum)
    }

    fn checksum_func_name(&self) -> &'static str {
        "crc32c"
    }
}

fn decode_section(data: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut entries = vec![];
    let mut offset = 0;
    while offset < data.len() {
        let klen = get_var_uint32(&data[offset..], &mut offset)
            .ok_or(Error::VarDecode("plain table key len"))? as usize;
        if offset + klen > data.len() {
            return Err(Error::Corruption("plain table key overruns file".to_string()));
        }
        let key = data[offset..offset + klen].to_vec();
        offset += klen;
        let vlen = get_var_uint32(&data[offset..], &mut offset)
            .ok_or(Error::VarDecode("plain table value len"))? as usize;
        if offset + vlen > data.len() {
            return Err(Error::Corruption(
                "plain table value overruns file".to_string(),
            ));
        }
        let value = data[offset..offset + vlen].to_vec();
        offset += vlen;
        entries.push((key, value));
    }
    Ok(entries)
}

pub struct PlainTableReader {
    entries: Arc<Vec<(Vec<u8>, Vec<u8>)>>,
    range_deletions: Arc<Vec<(Vec<u8>, Vec<u8>)>>,
    comparator: InternalKeyComparator,
}

impl PlainTableReader {
    pub fn open(opts: &TableReaderOptions, data: Vec<u8>) -> Result<Self> {
        if data.len() < FOOTER_SIZE {
            return Err(Error::Corruption("plain table too small".to_string()));
        }
        let footer = &data[data.len() - FOOTER_SIZE..];
        let point_len = decode_fixed_uint64(&footer[0..8]) as usize;
        let range_len = decode_fixed_uint64(&footer[8..16]) as usize;
        let masked_crc = decode_fixed_uint32(&footer[32..36]);
        let magic = decode_fixed_uint64(&footer[36..44]);
        if magic != PLAIN_TABLE_MAGIC {
            return Err(Error::Corruption("plain table magic mismatch".to_string()));
        }
        if point_len + range_len + FOOTER_SIZE != data.len() {
            return Err(Error::Corruption("plain table size mismatch".to_string()));
        }
        let crc = crc32c(&data[..data.len() - 12]);
        if crc_unmask(masked_crc) != crc {
            return Err(Error::Corruption("plain table checksum mismatch".to_string()));
        }
        let entries = decode_section(&data[..point_len])?;
        let range_deletions = decode_section(&data[point_len..point_len + range_len])?;
        Ok(Self {
            entries: Arc::new(entries),
            range_deletions: Arc::new(range_deletions),
            comparator: opts.internal_comparator.clone(),
        })
    }
}

impl TableReader for PlainTableReader {
    fn new_iterator(&self) -> Box<dyn InternalIterator> {
        Box::new(PlainTableIterator {
            entries: self.entries.clone(),
            comparator: self.comparator.clone(),
            cursor: None,
        })
    }

    fn new_range_tombstone_iterator(&self) -> Option<Box<dyn InternalIterator>> {
        if self.range_deletions.is_empty() {
            return None;
        }
        Some(Box::new(PlainTableIterator {
            entries: self.range_deletions.clone(),
            comparator: self.comparator.clone(),
            cursor: None,
        }))
    }

    fn num_entries(&self) -> u64 {
        self.entries.len() as u64
    }
}

struct PlainTableIterator {
    entries: Arc<Vec<(Vec<u8>, Vec<u8>)>>,
    comparator: InternalKeyComparator,
    cursor: Option<usize>,
}

impl InternalIterator for PlainTableIterator {
    fn valid(&self) -> bool {
        self.cursor.map_or(false, |c| c < self.entries.len())
    }

    fn seek(&mut self, key: &[u8]) {
        let pos = self
            .entries
            .partition_point(|(k, _)| self.comparator.compare_key(k, key) == Ordering::Less);
        self.cursor = Some(pos);
    }

    fn seek_to_first(&mut self) {
        self.cursor = Some(0);
    }

    fn seek_to_last(&mut self) {
        self.cursor = Some(self.entries.len().saturating_sub(1));
    }

    fn seek_for_prev(&mut self, key: &[u8]) {
        let pos = self
            .entries
            .partition_point(|(k, _)| self.comparator.compare_key(k, key) != Ordering::Greater);
        self.cursor = pos.checked_sub(1);
    }

    fn next(&mut self) {
        if let Some(c) = self.cursor {
            self.cursor = Some(c + 1);
        }
    }

    fn prev(&mut self) {
        self.cursor = self.cursor.and_then(|c| c.checked_sub(1));
    }

    fn key(&self) -> &[u8] {
        &self.entries[self.cursor.unwrap()].0
    }

    fn value(&self) -> &[u8] {
        &self.entries[self.cursor.unwrap()].1
    }
}

#[derive(Default, Clone)]
pub struct PlainTableFactory {}

impl TableFactory for PlainTableFactory {
    fn name(&self) -> &'static str {
        "PlainTable"
    }

    fn new_builder(
        &self,
        _opts: &TableBuilderOptions,
        file: Box<WritableFileWriter>,
    ) -> Result<Box<dyn TableBuilder>> {
        Ok(Box::new(PlainTableBuilder::new(file)))
    }

    fn open_reader(
        &self,
        opts: &TableReaderOptions,
        data: Vec<u8>,
    ) -> Result<Box<dyn TableReader>> {
        Ok(Box::new(PlainTableReader::open(opts, data)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::format::make_internal_key;
    use crate::common::InMemFileSystem;
    use crate::common::FileSystem;
    use std::path::PathBuf;
    use tokio::runtime::Runtime;

    #[test]
    fn test_plain_table_round_trip() {
        let fs = InMemFileSystem::default();
        let file = fs
            .open_writable_file_writer(PathBuf::from("1.sst"))
            .unwrap();
        let r = Runtime::new().unwrap();
        let mut builder = PlainTableFactory::default()
            .new_builder(&TableBuilderOptions::default(), file)
            .unwrap();
        builder
            .add(&make_internal_key(b"a", 10, ValueType::TypeValue), b"1")
            .unwrap();
        builder
            .add(&make_internal_key(b"b", 11, ValueType::TypeValue), b"2")
            .unwrap();
        builder
            .add(
                &make_internal_key(b"a", 7, ValueType::TypeRangeDeletion),
                b"c",
            )
            .unwrap();
        r.block_on(builder.finish()).unwrap();
        assert_eq!(builder.num_entries(), 2);
        assert_eq!(builder.num_range_deletions(), 1);
        assert!(builder.file_size() > 0);

        let data = fs.read_file_content(PathBuf::from("1.sst")).unwrap();
        assert_eq!(data.len() as u64, builder.file_size());
        let reader = PlainTableFactory::default()
            .open_reader(&TableReaderOptions::default(), data)
            .unwrap();
        assert_eq!(reader.num_entries(), 2);

        let mut iter = reader.new_iterator();
        iter.seek_to_first();
        assert!(iter.valid());
        assert_eq!(iter.key(), &make_internal_key(b"a", 10, ValueType::TypeValue)[..]);
        assert_eq!(iter.value(), b"1");
        iter.next();
        assert_eq!(iter.value(), b"2");
        iter.next();
        assert!(!iter.valid());

        let mut range_iter = reader.new_range_tombstone_iterator().unwrap();
        range_iter.seek_to_first();
        assert!(range_iter.valid());
        assert_eq!(range_iter.value(), b"c");
    }

    #[test]
    fn test_plain_table_rejects_corruption() {
        let fs = InMemFileSystem::default();
        let file = fs
            .open_writable_file_writer(PathBuf::from("2.sst"))
            .unwrap();
        let r = Runtime::new().unwrap();
        let mut builder = PlainTableFactory::default()
            .new_builder(&TableBuilderOptions::default(), file)
            .unwrap();
        builder
            .add(&make_internal_key(b"a", 1, ValueType::TypeValue), b"1")
            .unwrap();
        r.block_on(builder.finish()).unwrap();

        let mut data = fs.read_file_content(PathBuf::from("2.sst")).unwrap();
        data[0] ^= 0xff;
        let err = PlainTableFactory::default()
            .open_reader(&TableReaderOptions::default(), data)
            .err()
            .unwrap();
        assert!(err.is_corruption());
    }
}
