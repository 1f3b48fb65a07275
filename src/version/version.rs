use std::sync::Arc;

use super::FileMetaData;

/// Per-level file lists of one version. Level 0 files may overlap; the flush
/// engine only ever prepends there.
pub struct VersionStorageInfo {
    levels: Vec<Vec<Arc<FileMetaData>>>,
}

impl VersionStorageInfo {
    pub fn new(files: Vec<Arc<FileMetaData>>, num_levels: usize) -> Self {
        let mut levels = vec![vec![]; std::cmp::max(num_levels, 1)];
        for f in files {
            let level = f.level as usize;
            assert!(level < levels.len());
            levels[level].push(f);
        }
        Self { levels }
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn num_level_files(&self, level: usize) -> usize {
        self.levels.get(level).map_or(0, |l| l.len())
    }

    pub fn level_files(&self, level: usize) -> &[Arc<FileMetaData>] {
        &self.levels[level]
    }

    pub fn scan<F: FnMut(&FileMetaData)>(&self, mut f: F, level: usize) {
        if let Some(files) = self.levels.get(level) {
            for file in files {
                f(file);
            }
        }
    }

    fn apply(&self, to_add: Vec<Arc<FileMetaData>>, to_delete: Vec<u64>) -> Self {
        let mut levels = self.levels.clone();
        for level in levels.iter_mut() {
            level.retain(|f| !to_delete.contains(&f.id()));
        }
        for f in to_add {
            let level = f.level as usize;
            assert!(level < levels.len());
            levels[level].push(f);
        }
        Self { levels }
    }
}

pub struct Version {
    cf_id: u32,
    cf_name: String,
    comparator_name: String,
    log_number: u64,
    storage: VersionStorageInfo,
}

impl Version {
    pub fn new(
        cf_id: u32,
        cf_name: String,
        comparator_name: String,
        files: Vec<Arc<FileMetaData>>,
        log_number: u64,
        num_levels: usize,
    ) -> Self {
        Version {
            storage: VersionStorageInfo::new(files, num_levels),
            cf_id,
            cf_name,
            comparator_name,
            log_number,
        }
    }

    /// Produces the successor version. The log number only moves forward.
    pub fn apply(
        &self,
        to_add: Vec<Arc<FileMetaData>>,
        to_delete: Vec<u64>,
        log_number: u64,
    ) -> Self {
        Version {
            storage: self.storage.apply(to_add, to_delete),
            cf_id: self.cf_id,
            cf_name: self.cf_name.clone(),
            comparator_name: self.comparator_name.clone(),
            log_number: std::cmp::max(self.log_number, log_number),
        }
    }

    pub fn get_cf_id(&self) -> u32 {
        self.cf_id
    }

    pub fn get_cf_name(&self) -> &str {
        &self.cf_name
    }

    pub fn get_comparator_name(&self) -> &str {
        &self.comparator_name
    }

    pub fn get_log_number(&self) -> u64 {
        self.log_number
    }

    pub fn get_storage_info(&self) -> &VersionStorageInfo {
        &self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_apply() {
        let v = Version::new(0, "default".to_string(), "bytewise".to_string(), vec![], 5, 7);
        let mut f = FileMetaData::new(11, 0, vec![], vec![]);
        f.fd.file_size = 100;
        let v2 = v.apply(vec![Arc::new(f)], vec![], 9);
        assert_eq!(v2.get_storage_info().num_level_files(0), 1);
        assert_eq!(v2.get_log_number(), 9);
        // Log number never regresses.
        let v3 = v2.apply(vec![], vec![11], 2);
        assert_eq!(v3.get_storage_info().num_level_files(0), 0);
        assert_eq!(v3.get_log_number(), 9);
    }
}
