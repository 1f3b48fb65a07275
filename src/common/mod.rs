mod clock;
mod error;
mod file;
mod file_system;
pub mod format;
pub mod statistics;

use std::cmp::Ordering;
use std::sync::Arc;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use file::{
    make_current_file, make_descriptor_file_name, make_table_file_name,
    make_temp_plain_file_name, parse_file_name, DBFileType,
};
pub use file_system::{
    FileSystem, FsDirectory, InMemFileSystem, PosixDirectory, PosixWritableFile,
    SyncPosixFileSystem, WritableFile, WritableFileWriter,
};
pub use format::{ValueType, MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK};

use crate::util::{decode_fixed_uint64, extract_user_key};

pub trait KeyComparator: Send + Sync {
    fn name(&self) -> &str;
    fn compare_key(&self, lhs: &[u8], rhs: &[u8]) -> Ordering;
    fn less_than(&self, lhs: &[u8], rhs: &[u8]) -> bool {
        self.compare_key(lhs, rhs) == Ordering::Less
    }
    fn same_key(&self, lhs: &[u8], rhs: &[u8]) -> bool {
        self.compare_key(lhs, rhs) == Ordering::Equal
    }
}

#[derive(Default, Clone)]
pub struct DefaultUserComparator {}

impl KeyComparator for DefaultUserComparator {
    fn name(&self) -> &str {
        "leveldb.BytewiseComparator"
    }

    fn compare_key(&self, lhs: &[u8], rhs: &[u8]) -> Ordering {
        lhs.cmp(rhs)
    }

    fn same_key(&self, lhs: &[u8], rhs: &[u8]) -> bool {
        lhs.eq(rhs)
    }
}

/// Orders encoded internal keys: user key ascending by the wrapped
/// comparator, then sequence descending, then type descending. The newest
/// version of a key sorts first.
#[derive(Clone)]
pub struct InternalKeyComparator {
    user_comparator: Arc<dyn KeyComparator>,
    name: String,
}

impl Default for InternalKeyComparator {
    fn default() -> Self {
        InternalKeyComparator::new(Arc::new(DefaultUserComparator::default()))
    }
}

impl InternalKeyComparator {
    pub fn new(user_comparator: Arc<dyn KeyComparator>) -> InternalKeyComparator {
        let mut name = "rocksdb.InternalKeyComparator:".to_string();
        name.push_str(user_comparator.name());
        InternalKeyComparator {
            user_comparator,
            name,
        }
    }

    pub fn get_user_comparator(&self) -> &Arc<dyn KeyComparator> {
        &self.user_comparator
    }
}

impl KeyComparator for InternalKeyComparator {
    fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    fn compare_key(&self, lhs: &[u8], rhs: &[u8]) -> Ordering {
        let ret = self
            .user_comparator
            .compare_key(extract_user_key(lhs), extract_user_key(rhs));
        if ret != Ordering::Equal {
            return ret;
        }
        let anum = decode_fixed_uint64(&lhs[lhs.len() - 8..]);
        let bnum = decode_fixed_uint64(&rhs[rhs.len() - 8..]);
        // Higher (sequence, type) sorts first.
        bnum.cmp(&anum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::format::{make_internal_key, ValueType};

    #[test]
    fn test_internal_key_order() {
        let c = InternalKeyComparator::default();
        let a10 = make_internal_key(b"a", 10, ValueType::TypeValue);
        let a5 = make_internal_key(b"a", 5, ValueType::TypeValue);
        let b1 = make_internal_key(b"b", 1, ValueType::TypeValue);
        assert_eq!(c.compare_key(&a10, &a5), Ordering::Less);
        assert_eq!(c.compare_key(&a5, &b1), Ordering::Less);
        assert_eq!(c.compare_key(&a10, &a10), Ordering::Equal);
        assert!(c.same_key(&a10, &a10));

        // A deletion at the same sequence sorts after a value.
        let av = make_internal_key(b"a", 7, ValueType::TypeValue);
        let ad = make_internal_key(b"a", 7, ValueType::TypeDeletion);
        assert_eq!(c.compare_key(&av, &ad), Ordering::Less);
    }
}
