use super::FileMetaData;
use crate::common::{Error, Result};
use crate::util::{
    get_length_prefixed_slice, get_var_uint32, get_var_uint64, put_length_prefixed_slice,
    put_var_uint32, put_var_uint64, put_varint32varint32, put_varint32varint32varint64,
    put_varint32varint64, put_varint64varint64,
};

/// Blob payload attached by a flush whose values spilled into a blob file.
/// The engine only forwards these records; the blob layout is owned
/// elsewhere.
#[derive(Clone, Default, Debug, Eq, PartialEq)]
pub struct BlobFileAddition {
    pub blob_file_number: u64,
    pub total_blob_count: u64,
    pub total_blob_bytes: u64,
}

#[derive(Clone, Default, Debug, Eq, PartialEq)]
pub struct VersionEdit {
    pub add_files: Vec<FileMetaData>,
    pub deleted_files: Vec<FileMetaData>,
    pub blob_file_additions: Vec<BlobFileAddition>,

    /// Ids of the memtables this edit retires. Not persisted; the manifest
    /// job uses them to shrink the immutable list on install.
    pub mems_deleted: Vec<u64>,

    pub max_level: u32,
    pub comparator_name: String,
    pub log_number: u64,
    pub prev_log_number: u64,
    pub next_file_number: u64,
    pub min_log_number_to_keep: u64,
    pub last_sequence: u64,

    pub has_comparator: bool,
    pub has_log_number: bool,
    pub has_prev_log_number: bool,
    pub has_next_file_number: bool,
    pub has_last_sequence: bool,
    pub has_min_log_number_to_keep: bool,

    pub column_family: u32,
}

// Tag numbers for serialized VersionEdit. These numbers are written to
// disk and should not be changed.
#[repr(u32)]
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum Tag {
    Comparator = 1,
    LogNumber = 2,
    NextFileNumber = 3,
    LastSequence = 4,
    DeletedFile = 6,
    PrevLogNumber = 9,
    MinLogNumberToKeep = 10,

    NewFile2 = 100,
    ColumnFamily = 200,

    BlobFileAddition = 400,

    Unknown = 65535,
}

impl From<u32> for Tag {
    fn from(x: u32) -> Self {
        match x {
            1 => Tag::Comparator,
            2 => Tag::LogNumber,
            3 => Tag::NextFileNumber,
            4 => Tag::LastSequence,
            6 => Tag::DeletedFile,
            9 => Tag::PrevLogNumber,
            10 => Tag::MinLogNumberToKeep,
            100 => Tag::NewFile2,
            200 => Tag::ColumnFamily,
            400 => Tag::BlobFileAddition,
            _ => Tag::Unknown,
        }
    }
}

impl VersionEdit {
    pub fn encode_to(&self, buf: &mut Vec<u8>) -> bool {
        if self.has_comparator {
            put_var_uint32(buf, Tag::Comparator as u32);
            put_length_prefixed_slice(buf, self.comparator_name.as_bytes());
        }
        if self.has_log_number {
            put_varint32varint64(buf, Tag::LogNumber as u32, self.log_number);
        }
        if self.has_prev_log_number {
            put_varint32varint64(buf, Tag::PrevLogNumber as u32, self.prev_log_number);
        }
        if self.has_next_file_number {
            put_varint32varint64(buf, Tag::NextFileNumber as u32, self.next_file_number);
        }
        if self.has_last_sequence {
            put_varint32varint64(buf, Tag::LastSequence as u32, self.last_sequence);
        }
        if self.has_min_log_number_to_keep {
            put_varint32varint64(
                buf,
                Tag::MinLogNumberToKeep as u32,
                self.min_log_number_to_keep,
            );
        }
        for f in &self.deleted_files {
            put_varint32varint32varint64(buf, Tag::DeletedFile as u32, f.level, f.id());
        }
        for f in &self.add_files {
            put_var_uint32(buf, Tag::NewFile2 as u32);
            put_varint32varint64(buf, f.level, f.fd.get_number());
            put_var_uint64(buf, f.fd.file_size);
            put_length_prefixed_slice(buf, f.smallest.as_ref());
            put_length_prefixed_slice(buf, f.largest.as_ref());
            put_varint64varint64(buf, f.fd.smallest_seqno, f.fd.largest_seqno);
        }
        for b in &self.blob_file_additions {
            put_varint32varint64(buf, Tag::BlobFileAddition as u32, b.blob_file_number);
            put_var_uint64(buf, b.total_blob_count);
            put_var_uint64(buf, b.total_blob_bytes);
        }
        if self.column_family != 0 {
            put_varint32varint32(buf, Tag::ColumnFamily as u32, self.column_family);
        }
        true
    }

    pub fn decode_from(&mut self, src: &[u8]) -> Result<()> {
        let mut offset = 0;
        let mut err_msg: &'static str = "";
        while offset < src.len() {
            let tag_val = match get_var_uint32(&src[offset..], &mut offset) {
                Some(v) => v,
                None => break,
            };
            let tag = tag_val.into();
            match tag {
                Tag::Comparator => match get_length_prefixed_slice(&src[offset..], &mut offset) {
                    Some(data) => {
                        self.comparator_name = String::from_utf8(data.to_vec())
                            .map_err(|_| Error::VarDecode("decode comparator error"))?;
                        self.has_comparator = true;
                    }
                    None => {
                        err_msg = "comparator name";
                        break;
                    }
                },
                Tag::LogNumber => {
                    self.log_number = get_var_uint64(&src[offset..], &mut offset)
                        .ok_or(Error::VarDecode("log number"))?;
                    self.has_log_number = true;
                }
                Tag::NextFileNumber => {
                    self.next_file_number = get_var_uint64(&src[offset..], &mut offset)
                        .ok_or(Error::VarDecode("next file number"))?;
                    self.has_next_file_number = true;
                }
                Tag::LastSequence => {
                    self.last_sequence = get_var_uint64(&src[offset..], &mut offset)
                        .ok_or(Error::VarDecode("last sequence"))?;
                    self.has_last_sequence = true;
                }
                Tag::DeletedFile => {
                    let level = get_var_uint32(&src[offset..], &mut offset)
                        .ok_or(Error::VarDecode("deleted file"))?;
                    if level > self.max_level {
                        self.max_level = level;
                    }
                    let val = get_var_uint64(&src[offset..], &mut offset)
                        .ok_or(Error::VarDecode("deleted file"))?;
                    self.deleted_files
                        .push(FileMetaData::new(val, level, vec![], vec![]));
                }
                Tag::PrevLogNumber => {
                    self.prev_log_number = get_var_uint64(&src[offset..], &mut offset)
                        .ok_or(Error::VarDecode("prev log number"))?;
                    self.has_prev_log_number = true;
                }
                Tag::MinLogNumberToKeep => {
                    self.min_log_number_to_keep = get_var_uint64(&src[offset..], &mut offset)
                        .ok_or(Error::VarDecode("min log number to keep"))?;
                    self.has_min_log_number_to_keep = true;
                }
                Tag::NewFile2 => {
                    let level = get_var_uint32(&src[offset..], &mut offset)
                        .ok_or(Error::VarDecode("new file"))?;
                    if level > self.max_level {
                        self.max_level = level;
                    }
                    let file_number = get_var_uint64(&src[offset..], &mut offset)
                        .ok_or(Error::VarDecode("new file"))?;
                    let file_size = get_var_uint64(&src[offset..], &mut offset)
                        .ok_or(Error::VarDecode("new file"))?;
                    let smallest = get_length_prefixed_slice(&src[offset..], &mut offset)
                        .ok_or(Error::VarDecode("new file"))?
                        .to_vec();
                    let largest = get_length_prefixed_slice(&src[offset..], &mut offset)
                        .ok_or(Error::VarDecode("new file"))?
                        .to_vec();
                    let mut f = FileMetaData::new(file_number, level, smallest, largest);
                    f.fd.file_size = file_size;
                    f.fd.smallest_seqno = get_var_uint64(&src[offset..], &mut offset)
                        .ok_or(Error::VarDecode("new file"))?;
                    f.fd.largest_seqno = get_var_uint64(&src[offset..], &mut offset)
                        .ok_or(Error::VarDecode("new file"))?;
                    self.add_files.push(f);
                }
                Tag::BlobFileAddition => {
                    let blob_file_number = get_var_uint64(&src[offset..], &mut offset)
                        .ok_or(Error::VarDecode("blob file addition"))?;
                    let total_blob_count = get_var_uint64(&src[offset..], &mut offset)
                        .ok_or(Error::VarDecode("blob file addition"))?;
                    let total_blob_bytes = get_var_uint64(&src[offset..], &mut offset)
                        .ok_or(Error::VarDecode("blob file addition"))?;
                    self.blob_file_additions.push(BlobFileAddition {
                        blob_file_number,
                        total_blob_count,
                        total_blob_bytes,
                    });
                }
                Tag::ColumnFamily => {
                    self.column_family = get_var_uint32(&src[offset..], &mut offset)
                        .ok_or(Error::VarDecode("column family"))?;
                }
                Tag::Unknown => {
                    err_msg = "unknown tag, manifest may be corrupted";
                    break;
                }
            }
        }
        if !err_msg.is_empty() {
            return Err(Error::VarDecode(err_msg));
        }
        Ok(())
    }

    pub fn set_log_number(&mut self, log_number: u64) {
        self.log_number = log_number;
        self.has_log_number = true;
    }

    pub fn set_prev_log_number(&mut self, log_number: u64) {
        self.prev_log_number = log_number;
        self.has_prev_log_number = true;
    }

    pub fn set_comparator_name(&mut self, name: &str) {
        self.has_comparator = true;
        self.comparator_name = name.to_string();
    }

    pub fn set_next_file(&mut self, file_number: u64) {
        self.next_file_number = file_number;
        self.has_next_file_number = true;
    }

    pub fn set_last_sequence(&mut self, seq: u64) {
        self.last_sequence = seq;
        self.has_last_sequence = true;
    }

    pub fn set_min_log_number_to_keep(&mut self, num: u64) {
        self.min_log_number_to_keep = num;
        self.has_min_log_number_to_keep = true;
    }

    pub fn get_log_number(&self) -> u64 {
        self.log_number
    }

    pub fn add_file_meta(&mut self, meta: &FileMetaData) {
        self.add_files.push(meta.clone());
    }

    pub fn add_file(
        &mut self,
        level: u32,
        file_number: u64,
        file_size: u64,
        smallest: &[u8],
        largest: &[u8],
        smallest_seqno: u64,
        largest_seqno: u64,
    ) {
        let mut f = FileMetaData::new(file_number, level, smallest.to_vec(), largest.to_vec());
        f.fd.file_size = file_size;
        f.fd.smallest_seqno = smallest_seqno;
        f.fd.largest_seqno = largest_seqno;
        self.add_files.push(f);
    }

    pub fn delete_file(&mut self, level: u32, file_number: u64) {
        let f = FileMetaData::new(file_number, level, vec![], vec![]);
        self.deleted_files.push(f);
    }

    pub fn set_blob_file_additions(&mut self, blobs: Vec<BlobFileAddition>) {
        self.blob_file_additions = blobs;
    }
}

#[cfg(test)]
mod tests {
    use super::{BlobFileAddition, FileMetaData, VersionEdit};

    #[test]
    fn test_manifest_decode_encode() {
        let mut edit = VersionEdit::default();
        edit.column_family = 1;
        edit.set_log_number(15);

        for i in 0..5u64 {
            let mut smallest = b"abcd".to_vec();
            let mut largest = b"abcd".to_vec();
            smallest.extend_from_slice(&(i * 2).to_le_bytes());
            largest.extend_from_slice(&(i * 2 + 1).to_le_bytes());
            let mut f = FileMetaData::new(i + 1, 0, smallest, largest);
            f.fd.smallest_seqno = i * 100;
            f.fd.largest_seqno = i * 100 + 50;
            edit.add_files.push(f);
        }
        let f = FileMetaData::new(0, 0, vec![], vec![]);
        edit.deleted_files.push(f);
        edit.blob_file_additions.push(BlobFileAddition {
            blob_file_number: 9,
            total_blob_count: 4,
            total_blob_bytes: 1024,
        });
        let mut record = vec![];
        edit.encode_to(&mut record);
        let mut new_edit = VersionEdit::default();
        new_edit.decode_from(&record).unwrap();
        assert_eq!(edit, new_edit);
    }
}
