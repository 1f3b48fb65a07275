// Copyright (c) 2017-present, PingCAP, Inc. Licensed under Apache-2.0.

use std::io::Result as IoResult;
use std::os::unix::io::RawFd;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use nix::fcntl::{self, OFlag};
use nix::sys::stat::Mode;
use nix::sys::uio::pwrite;
use nix::unistd::{close, fsync, ftruncate};
use nix::NixPath;

use crate::common::file_system::writer::WritableFileWriter;
use crate::common::statistics::io_stats_add_fsync_nanos;
use crate::common::{Error, FileSystem, FsDirectory, Result, WritableFile};

/// A `RawFile` is a RAII file that provides basic I/O functionality.
///
/// This implementation is a thin wrapper around `RawFd`, and primarily
/// targets UNIX-based systems.
struct RawFile(RawFd);

fn from_nix_error(e: nix::Error, custom: &'static str) -> std::io::Error {
    let kind = std::io::Error::from(e).kind();
    std::io::Error::new(kind, custom)
}

impl RawFile {
    fn create<P: ?Sized + NixPath>(path: &P) -> IoResult<Self> {
        let flags = OFlag::O_RDWR | OFlag::O_CREAT | OFlag::O_TRUNC;
        // Permission 644
        let mode = Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IROTH;
        let fd = fcntl::open(path, flags, mode).map_err(|e| from_nix_error(e, "open"))?;
        Ok(RawFile(fd))
    }

    fn open_dir<P: ?Sized + NixPath>(path: &P) -> IoResult<Self> {
        let flags = OFlag::O_RDONLY | OFlag::O_DIRECTORY;
        let mode = Mode::S_IRUSR | Mode::S_IXUSR;
        let fd = fcntl::open(path, flags, mode).map_err(|e| from_nix_error(e, "open dir"))?;
        Ok(RawFile(fd))
    }

    fn sync(&self) -> IoResult<()> {
        fsync(self.0).map_err(|e| from_nix_error(e, "fsync"))
    }

    fn write(&self, offset: usize, content: &[u8]) -> IoResult<usize> {
        let mut written = 0;
        while written < content.len() {
            let r = pwrite(self.0, &content[written..], (offset + written) as i64)
                .map_err(|e| from_nix_error(e, "pwrite"))?;
            if r == 0 {
                break;
            }
            written += r;
        }
        Ok(written)
    }

    fn truncate(&self, offset: usize) -> IoResult<()> {
        ftruncate(self.0, offset as i64).map_err(|e| from_nix_error(e, "ftruncate"))
    }

    fn allocate(&self, offset: usize, size: usize) -> IoResult<()> {
        fcntl::fallocate(
            self.0,
            fcntl::FallocateFlags::empty(),
            offset as i64,
            size as i64,
        )
        .map(|_| ())
        .map_err(|e| from_nix_error(e, "fallocate"))
    }
}

impl Drop for RawFile {
    fn drop(&mut self) {
        let _ = close(self.0);
    }
}

pub struct PosixWritableFile {
    inner: RawFile,
    offset: usize,
}

impl PosixWritableFile {
    pub fn create(path: &PathBuf) -> Result<Self> {
        let inner = RawFile::create(path)?;
        Ok(Self { inner, offset: 0 })
    }
}

#[async_trait]
impl WritableFile for PosixWritableFile {
    async fn append(&mut self, data: &[u8]) -> Result<()> {
        let written = self.inner.write(self.offset, data)?;
        self.offset += written;
        Ok(())
    }

    fn truncate(&mut self, offset: u64) -> Result<()> {
        self.inner.truncate(offset as usize)?;
        self.offset = offset as usize;
        Ok(())
    }

    fn allocate(&mut self, offset: u64, len: u64) -> Result<()> {
        self.inner.allocate(offset as usize, len as usize)?;
        Ok(())
    }

    async fn sync(&mut self) -> Result<()> {
        self.fsync().await
    }

    async fn fsync(&mut self) -> Result<()> {
        let start = Instant::now();
        self.inner.sync()?;
        io_stats_add_fsync_nanos(start.elapsed().as_nanos() as u64);
        Ok(())
    }

    fn get_file_size(&self) -> usize {
        self.offset
    }
}

pub struct PosixDirectory {
    inner: RawFile,
}

#[async_trait]
impl FsDirectory for PosixDirectory {
    async fn fsync(&self) -> Result<()> {
        let start = Instant::now();
        self.inner.sync()?;
        io_stats_add_fsync_nanos(start.elapsed().as_nanos() as u64);
        Ok(())
    }
}

pub struct SyncPosixFileSystem {}

impl FileSystem for SyncPosixFileSystem {
    fn open_writable_file_writer(&self, path: PathBuf) -> Result<Box<WritableFileWriter>> {
        let f = PosixWritableFile::create(&path)?;
        let filename = path.to_str().unwrap().to_string();
        Ok(Box::new(WritableFileWriter::new(Box::new(f), filename)))
    }

    fn open_directory(&self, path: PathBuf) -> Result<Arc<dyn FsDirectory>> {
        let inner = RawFile::open_dir(&path)?;
        Ok(Arc::new(PosixDirectory { inner }))
    }

    fn read_file_content(&self, path: PathBuf) -> Result<Vec<u8>> {
        std::fs::read(&path).map_err(Error::from)
    }

    fn remove(&self, path: PathBuf) -> Result<()> {
        std::fs::remove_file(&path).map_err(Error::from)
    }

    fn rename(&self, origin: PathBuf, target: PathBuf) -> Result<()> {
        std::fs::rename(&origin, &target).map_err(Error::from)
    }

    fn file_exist(&self, path: &PathBuf) -> Result<bool> {
        Ok(path.exists())
    }
}
