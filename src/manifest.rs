use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::channel::mpsc::UnboundedSender;
use futures::channel::oneshot::{channel as once_channel, Sender as OnceSender};
use futures::SinkExt;

use crate::common::{
    make_current_file, make_descriptor_file_name, make_temp_plain_file_name, Error, FileSystem,
    Result,
};
use crate::compaction::CompactionEngine;
use crate::log::LogWriter;
use crate::memtable::Memtable;
use crate::options::ImmutableDBOptions;
use crate::version::{FileMetaData, VersionEdit, VersionSet};

const MAX_BATCH_SIZE: usize = 128;

/// Owns the descriptor log. All version installs funnel through here, one
/// batch at a time, which is what serializes installation across overlapping
/// flush jobs.
pub struct Manifest {
    log: Option<Box<LogWriter>>,
    version_set: Arc<Mutex<VersionSet>>,
    options: Arc<ImmutableDBOptions>,
    manifest_file_number: u64,
}

impl Manifest {
    pub fn new(version_set: Arc<Mutex<VersionSet>>, options: Arc<ImmutableDBOptions>) -> Self {
        Self {
            log: None,
            version_set,
            options,
            manifest_file_number: 0,
        }
    }

    pub fn get_version_set(&self) -> Arc<Mutex<VersionSet>> {
        self.version_set.clone()
    }

    pub async fn process_manifest_writes(&mut self, edits: Vec<VersionEdit>) -> Result<()> {
        if edits.is_empty() {
            return Ok(());
        }
        let mut new_descriptor = false;
        if self.log.as_ref().map_or(true, |f| {
            f.get_file_size() > self.options.max_manifest_file_size
        }) {
            let file_number = {
                let vs = self.version_set.lock().unwrap();
                vs.new_file_number()
            };
            let descriptor_file_name =
                make_descriptor_file_name(&self.options.db_path, file_number);
            let writer = self
                .options
                .fs
                .open_writable_file_writer(descriptor_file_name)?;
            let mut writer = LogWriter::new(writer, 0);
            self.write_snapshot(&mut writer).await?;
            self.log = Some(Box::new(writer));
            self.manifest_file_number = file_number;
            new_descriptor = true;
        }

        let mut data = vec![];
        for e in &edits {
            e.encode_to(&mut data);
            self.log.as_mut().unwrap().add_record(&data).await?;
            data.clear();
        }
        self.log.as_mut().unwrap().fsync().await?;

        let mut edits_by_cf = HashMap::<u32, Vec<VersionEdit>>::new();
        for e in edits {
            edits_by_cf.entry(e.column_family).or_default().push(e);
        }
        // The records are durable; mirror them into the in-memory state.
        let mut to_free: Vec<Arc<Memtable>> = vec![];
        for (cf, edits) in edits_by_cf {
            let version = {
                let vs = self.version_set.lock().unwrap();
                match vs.get_column_family(cf) {
                    Some(cf) => cf.current(),
                    None => return Err(Error::ColumnFamilyDropped),
                }
            };
            let mut mems = vec![];
            let mut to_add = vec![];
            let mut to_delete = vec![];
            let mut log_number = 0;
            for mut e in edits {
                if e.has_log_number {
                    log_number = std::cmp::max(log_number, e.log_number);
                }
                mems.append(&mut e.mems_deleted);
                for m in e.deleted_files {
                    to_delete.push(m.id());
                }
                for m in e.add_files {
                    to_add.push(Arc::new(m));
                }
            }
            let new_version = version.apply(to_add, to_delete, log_number);
            let mut vs = self.version_set.lock().unwrap();
            vs.install_version(cf, mems, new_version, &mut to_free)?;
        }
        // Retired memtables die here, outside the version-set mutex.
        drop(to_free);

        if new_descriptor {
            store_current_file(
                &self.options.fs,
                self.manifest_file_number,
                &self.options.db_path,
            )
            .await?;
        }
        Ok(())
    }

    async fn write_snapshot(&mut self, writer: &mut LogWriter) -> Result<()> {
        let versions = {
            let version_set = self.version_set.lock().unwrap();
            version_set.get_column_family_versions()
        };
        for version in versions {
            let mut record = Vec::new();
            let mut edit = VersionEdit::default();
            edit.column_family = version.get_cf_id();
            edit.set_comparator_name(version.get_comparator_name());
            edit.set_log_number(version.get_log_number());
            let info = version.get_storage_info();
            for level in 0..info.num_levels() {
                info.scan(
                    |f: &FileMetaData| {
                        edit.add_file(
                            level as u32,
                            f.id(),
                            f.fd.file_size,
                            f.smallest.as_ref(),
                            f.largest.as_ref(),
                            f.fd.smallest_seqno,
                            f.fd.largest_seqno,
                        );
                    },
                    level,
                );
            }
            if !edit.encode_to(&mut record) {
                return Err(Error::Other(
                    "write snapshot failed because encode failed".to_string(),
                ));
            }
            writer.add_record(&record).await?;
        }
        writer.fsync().await?;
        Ok(())
    }
}

pub struct ManifestWriter {
    manifest: Box<Manifest>,
    cbs: Vec<OnceSender<Result<()>>>,
    edits: Vec<VersionEdit>,
}

impl ManifestWriter {
    pub fn new(manifest: Box<Manifest>) -> Self {
        Self {
            manifest,
            cbs: vec![],
            edits: vec![],
        }
    }

    pub fn batch(&mut self, mut task: ManifestTask) -> bool {
        let need_apply = self.edits.len() > MAX_BATCH_SIZE;
        self.edits.append(&mut task.edits);
        self.cbs.push(task.cb);
        need_apply
    }

    pub async fn apply(&mut self) {
        let edits = std::mem::take(&mut self.edits);
        match self.manifest.process_manifest_writes(edits).await {
            Ok(()) => {
                for cb in self.cbs.drain(..) {
                    let _ = cb.send(Ok(()));
                }
            }
            Err(e) => {
                for cb in self.cbs.drain(..) {
                    let _ = cb.send(Err(e.clone()));
                }
            }
        }
    }
}

pub struct ManifestTask {
    pub edits: Vec<VersionEdit>,
    pub cb: OnceSender<Result<()>>,
}

#[derive(Clone)]
pub struct ManifestScheduler {
    sender: UnboundedSender<ManifestTask>,
}

impl ManifestScheduler {
    pub fn new(sender: UnboundedSender<ManifestTask>) -> Self {
        Self { sender }
    }
}

#[async_trait::async_trait]
impl CompactionEngine for ManifestScheduler {
    async fn apply(&mut self, edits: Vec<VersionEdit>) -> Result<()> {
        let (cb, rx) = once_channel();
        let task = ManifestTask { edits, cb };
        self.sender
            .send(task)
            .await
            .map_err(|_| Error::Cancel("the manifest thread may close"))?;
        rx.await
            .map_err(|_| Error::Cancel("the manifest thread may cancel this apply"))?
    }
}

pub async fn store_current_file(
    fs: &Arc<dyn FileSystem>,
    descriptor_number: u64,
    dbpath: &str,
) -> Result<()> {
    let fname = make_descriptor_file_name(dbpath, descriptor_number);
    let contents = fname.to_str().unwrap();
    let prefix = dbpath.to_string() + "/";
    let mut ret = contents.trim_start_matches(&prefix).to_string();
    ret.push('\n');
    let tmp = make_temp_plain_file_name(dbpath, descriptor_number);
    let mut writer = fs.open_writable_file_writer(tmp.clone())?;
    writer.append(ret.as_bytes()).await?;
    writer.sync().await?;
    fs.rename(tmp, make_current_file(dbpath))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{InMemFileSystem, ValueType};
    use crate::options::{ColumnFamilyDescriptor, ColumnFamilyOptions, DBOptions};
    use futures::channel::mpsc::unbounded;
    use futures::StreamExt;
    use tokio::runtime::Runtime;

    #[test]
    fn test_manifest_scheduler_installs_edits() {
        let fs = InMemFileSystem::default();
        let mut db_options = DBOptions::default();
        db_options.fs = Arc::new(fs.clone());
        db_options.db_path = "test".to_string();
        let db_options: Arc<ImmutableDBOptions> = Arc::new(db_options.into());
        let version_set = Arc::new(Mutex::new(VersionSet::new(&[ColumnFamilyDescriptor {
            name: "default".to_string(),
            options: ColumnFamilyOptions::default(),
        }])));
        // Seal one memtable so the edit has something to retire.
        let mem = {
            let mut vs = version_set.lock().unwrap();
            let mem = vs.get_column_family(0).unwrap().get_memtable();
            mem.add(b"k", b"v", 1, ValueType::TypeValue);
            vs.switch_memtable(0, 1);
            let picked = vs
                .mut_column_family(0)
                .unwrap()
                .imm
                .pick_memtables_to_flush(u64::MAX);
            assert_eq!(picked.len(), 1);
            picked.into_iter().next().unwrap()
        };

        let manifest = Manifest::new(version_set.clone(), db_options.clone());
        let (tx, mut rx) = unbounded();
        let mut writer = ManifestWriter::new(Box::new(manifest));
        let r = Runtime::new().unwrap();
        r.spawn(async move {
            while let Some(x) = rx.next().await {
                writer.batch(x);
                writer.apply().await;
            }
        });

        let mut edit = VersionEdit::default();
        edit.column_family = 0;
        edit.set_log_number(5);
        edit.mems_deleted = vec![mem.get_id()];
        edit.add_file(0, 11, 128, b"a\0\0\0\0\0\0\0\0", b"z\0\0\0\0\0\0\0\0", 1, 1);
        {
            let mut vs = version_set.lock().unwrap();
            let mut to_free = vec![];
            let edits = vs
                .mut_column_family(0)
                .unwrap()
                .imm
                .try_install_memtable_flush_results(
                    &[mem.clone()],
                    edit,
                    true,
                    &mut to_free,
                );
            assert_eq!(edits.len(), 1);
            drop(vs);
            let mut scheduler = ManifestScheduler::new(tx);
            r.block_on(scheduler.apply(edits)).unwrap();
        }

        let vs = version_set.lock().unwrap();
        let cf = vs.get_column_family(0).unwrap();
        assert_eq!(cf.current().get_storage_info().num_level_files(0), 1);
        assert_eq!(cf.get_log_number(), 5);
        assert_eq!(cf.imm.len(), 0);
        assert!(fs
            .file_exist(&crate::common::make_current_file("test"))
            .unwrap());
    }
}
