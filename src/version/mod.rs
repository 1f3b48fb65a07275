mod column_family;
mod edit;
mod memtable_list;
pub mod snapshot;
mod version;
mod version_set;

use bytes::Bytes;

pub use column_family::ColumnFamily;
pub use edit::{BlobFileAddition, VersionEdit};
pub use memtable_list::{LogsWithPrepTracker, MemtableList};
pub use version::{Version, VersionStorageInfo};
pub use version_set::{KernelNumberContext, VersionSet};

use crate::common::{InternalKeyComparator, KeyComparator, MAX_SEQUENCE_NUMBER};

const FILE_NUMBER_MASK: u64 = 0x3FFFFFFFFFFFFFFF;

pub fn pack_file_number_and_path_id(number: u64, path_id: u64) -> u64 {
    number | (path_id * (FILE_NUMBER_MASK + 1))
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FileDescriptor {
    pub file_size: u64,
    pub packed_number_and_path_id: u64,
    pub smallest_seqno: u64,
    pub largest_seqno: u64,
}

impl FileDescriptor {
    pub fn new(id: u64, path_id: u32) -> Self {
        Self {
            file_size: 0,
            packed_number_and_path_id: pack_file_number_and_path_id(id, path_id as u64),
            smallest_seqno: MAX_SEQUENCE_NUMBER,
            largest_seqno: 0,
        }
    }

    pub fn get_number(&self) -> u64 {
        self.packed_number_and_path_id & FILE_NUMBER_MASK
    }

    pub fn get_path_id(&self) -> u32 {
        (self.packed_number_and_path_id / (FILE_NUMBER_MASK + 1)) as u32
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileMetaData {
    pub fd: FileDescriptor,
    pub level: u32,
    pub smallest: Bytes,
    pub largest: Bytes,
    pub marked_for_compaction: bool,
    pub num_entries: u64,
    /// Earliest second any ancestor of this data could have been written.
    pub oldest_ancester_time: u64,
    pub file_creation_time: u64,
    pub oldest_blob_file_number: Option<u64>,
    pub file_checksum: String,
    pub file_checksum_func_name: String,
}

impl FileMetaData {
    pub fn new(id: u64, level: u32, smallest: Vec<u8>, largest: Vec<u8>) -> Self {
        FileMetaData {
            fd: FileDescriptor::new(id, 0),
            level,
            smallest: Bytes::from(smallest),
            largest: Bytes::from(largest),
            marked_for_compaction: false,
            num_entries: 0,
            oldest_ancester_time: 0,
            file_creation_time: 0,
            oldest_blob_file_number: None,
            file_checksum: String::new(),
            file_checksum_func_name: String::new(),
        }
    }

    /// Point keys arrive in ascending internal-key order, so the first key
    /// ever seen is the smallest and the last one the largest.
    pub fn update_boundary(&mut self, key: &[u8], seqno: u64) {
        if self.smallest.is_empty() {
            self.smallest = key.to_vec().into();
        }
        self.largest = Bytes::from(key.to_vec());
        self.fd.smallest_seqno = std::cmp::min(self.fd.smallest_seqno, seqno);
        self.fd.largest_seqno = std::cmp::max(self.fd.largest_seqno, seqno);
    }

    /// Range tombstones arrive in no particular order relative to the point
    /// stream; both ends must be compared against the current boundaries.
    pub fn update_boundaries_for_range(
        &mut self,
        smallest_candidate: &[u8],
        largest_candidate: &[u8],
        seqno: u64,
        comparator: &InternalKeyComparator,
    ) {
        if self.smallest.is_empty()
            || comparator.less_than(smallest_candidate, self.smallest.as_ref())
        {
            self.smallest = smallest_candidate.to_vec().into();
        }
        if self.largest.is_empty()
            || comparator.less_than(self.largest.as_ref(), largest_candidate)
        {
            self.largest = largest_candidate.to_vec().into();
        }
        self.fd.smallest_seqno = std::cmp::min(self.fd.smallest_seqno, seqno);
        self.fd.largest_seqno = std::cmp::max(self.fd.largest_seqno, seqno);
    }

    pub fn id(&self) -> u64 {
        self.fd.get_number()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::format::{make_internal_key, ValueType};

    #[test]
    fn test_file_descriptor_packing() {
        let fd = FileDescriptor::new(7, 0);
        assert_eq!(fd.get_number(), 7);
        assert_eq!(fd.get_path_id(), 0);
    }

    #[test]
    fn test_update_boundaries_for_range() {
        let comparator = InternalKeyComparator::default();
        let mut meta = FileMetaData::new(1, 0, vec![], vec![]);
        meta.update_boundary(&make_internal_key(b"c", 3, ValueType::TypeValue), 3);
        meta.update_boundaries_for_range(
            &make_internal_key(b"a", 7, ValueType::TypeRangeDeletion),
            &make_internal_key(b"z", MAX_SEQUENCE_NUMBER, ValueType::TypeRangeDeletion),
            7,
            &comparator,
        );
        assert_eq!(&meta.smallest[..meta.smallest.len() - 8], b"a");
        assert_eq!(&meta.largest[..meta.largest.len() - 8], b"z");
        assert_eq!(meta.fd.smallest_seqno, 3);
        assert_eq!(meta.fd.largest_seqno, 7);
    }
}
