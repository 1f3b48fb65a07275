mod posix_file;
mod writer;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::common::{Error, Result};
pub use posix_file::{PosixDirectory, PosixWritableFile, SyncPosixFileSystem};
pub use writer::WritableFileWriter;

#[async_trait]
pub trait WritableFile: Send {
    async fn append(&mut self, data: &[u8]) -> Result<()>;
    fn truncate(&mut self, offset: u64) -> Result<()>;
    fn allocate(&mut self, offset: u64, len: u64) -> Result<()>;
    async fn sync(&mut self) -> Result<()>;
    async fn fsync(&mut self) -> Result<()>;
    fn get_file_size(&self) -> usize {
        0
    }
}

/// Handle to an open directory, only good for fsyncing the directory entry
/// after files inside it were created.
#[async_trait]
pub trait FsDirectory: Send + Sync {
    async fn fsync(&self) -> Result<()>;
}

pub trait FileSystem: Send + Sync {
    fn open_writable_file_writer(&self, path: PathBuf) -> Result<Box<WritableFileWriter>>;
    fn open_directory(&self, path: PathBuf) -> Result<Arc<dyn FsDirectory>>;
    fn read_file_content(&self, path: PathBuf) -> Result<Vec<u8>>;
    fn remove(&self, path: PathBuf) -> Result<()>;
    fn rename(&self, origin: PathBuf, target: PathBuf) -> Result<()>;
    fn file_exist(&self, path: &PathBuf) -> Result<bool>;
}

#[derive(Default)]
struct InMemFileSystemRep {
    files: HashMap<String, Vec<u8>>,
}

/// File system kept entirely in memory. Test use, mirrors the posix layout.
#[derive(Default, Clone)]
pub struct InMemFileSystem {
    inner: Arc<Mutex<InMemFileSystemRep>>,
}

struct InMemFile {
    buf: Vec<u8>,
    fs: Arc<Mutex<InMemFileSystemRep>>,
    filename: String,
}

#[async_trait]
impl WritableFile for InMemFile {
    async fn append(&mut self, data: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(data);
        Ok(())
    }

    fn truncate(&mut self, offset: u64) -> Result<()> {
        self.buf.resize(offset as usize, 0);
        Ok(())
    }

    fn allocate(&mut self, _offset: u64, _len: u64) -> Result<()> {
        Ok(())
    }

    async fn sync(&mut self) -> Result<()> {
        self.fsync().await
    }

    async fn fsync(&mut self) -> Result<()> {
        let mut fs = self.fs.lock().unwrap();
        fs.files.insert(self.filename.clone(), self.buf.clone());
        Ok(())
    }

    fn get_file_size(&self) -> usize {
        self.buf.len()
    }
}

struct InMemDirectory;

#[async_trait]
impl FsDirectory for InMemDirectory {
    async fn fsync(&self) -> Result<()> {
        Ok(())
    }
}

impl FileSystem for InMemFileSystem {
    fn open_writable_file_writer(&self, path: PathBuf) -> Result<Box<WritableFileWriter>> {
        let filename = path.to_str().unwrap().to_string();
        let f = InMemFile {
            fs: self.inner.clone(),
            buf: vec![],
            filename: filename.clone(),
        };
        Ok(Box::new(WritableFileWriter::new(Box::new(f), filename)))
    }

    fn open_directory(&self, _path: PathBuf) -> Result<Arc<dyn FsDirectory>> {
        Ok(Arc::new(InMemDirectory))
    }

    fn read_file_content(&self, path: PathBuf) -> Result<Vec<u8>> {
        let filename = path.to_str().unwrap().to_string();
        let fs = self.inner.lock().unwrap();
        fs.files
            .get(&filename)
            .cloned()
            .ok_or_else(|| Error::InvalidFile(format!("file {} not exists", filename)))
    }

    fn remove(&self, path: PathBuf) -> Result<()> {
        let filename = path.to_str().unwrap().to_string();
        let mut fs = self.inner.lock().unwrap();
        fs.files.remove(&filename);
        Ok(())
    }

    fn rename(&self, origin: PathBuf, target: PathBuf) -> Result<()> {
        let origin = origin.to_str().unwrap().to_string();
        let target = target.to_str().unwrap().to_string();
        let mut fs = self.inner.lock().unwrap();
        match fs.files.remove(&origin) {
            Some(data) => {
                fs.files.insert(target, data);
                Ok(())
            }
            None => Err(Error::InvalidFile(format!("file {} not exists", origin))),
        }
    }

    fn file_exist(&self, path: &PathBuf) -> Result<bool> {
        let filename = path.to_str().unwrap().to_string();
        let fs = self.inner.lock().unwrap();
        Ok(fs.files.contains_key(&filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::runtime::Runtime;

    #[test]
    fn test_in_mem_file_system_round_trip() {
        let fs = InMemFileSystem::default();
        let r = Runtime::new().unwrap();
        let mut writer = fs
            .open_writable_file_writer(PathBuf::from("db/1.sst"))
            .unwrap();
        r.block_on(writer.append(b"hello")).unwrap();
        assert_eq!(writer.file_size(), 5);
        // Nothing is visible before a sync.
        assert!(!fs.file_exist(&PathBuf::from("db/1.sst")).unwrap());
        r.block_on(writer.sync()).unwrap();
        assert_eq!(
            fs.read_file_content(PathBuf::from("db/1.sst")).unwrap(),
            b"hello".to_vec()
        );
        fs.rename(PathBuf::from("db/1.sst"), PathBuf::from("db/2.sst"))
            .unwrap();
        assert!(!fs.file_exist(&PathBuf::from("db/1.sst")).unwrap());
        fs.remove(PathBuf::from("db/2.sst")).unwrap();
        assert!(!fs.file_exist(&PathBuf::from("db/2.sst")).unwrap());
    }

    #[test]
    fn test_posix_file_system_write_and_dir_fsync() {
        let dir = tempfile::Builder::new()
            .prefix("test_posix_fs")
            .tempdir()
            .unwrap();
        let fs = SyncPosixFileSystem {};
        let path = dir.path().join("000001.sst");
        let r = Runtime::new().unwrap();
        let mut writer = fs.open_writable_file_writer(path.clone()).unwrap();
        r.block_on(writer.append(b"abc")).unwrap();
        r.block_on(writer.append(b"def")).unwrap();
        r.block_on(writer.sync()).unwrap();
        assert_eq!(fs.read_file_content(path.clone()).unwrap(), b"abcdef");

        let dir_handle = fs.open_directory(dir.path().to_path_buf()).unwrap();
        r.block_on(dir_handle.fsync()).unwrap();

        fs.remove(path.clone()).unwrap();
        assert!(!fs.file_exist(&path).unwrap());
    }
}
