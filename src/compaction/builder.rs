use std::sync::Arc;

use log::info;

use crate::common::format::make_internal_key;
use crate::common::{
    make_table_file_name, Error, InternalKeyComparator, Result, ValueType, MAX_SEQUENCE_NUMBER,
};
use crate::compaction::compaction_iter::CompactionIter;
use crate::options::ImmutableDBOptions;
use crate::table::{TableBuilderOptions, TableFactory};
use crate::version::{BlobFileAddition, FileMetaData};

pub struct BuildTableResult {
    /// Records pulled from the merged memtable stream, pre-filtering.
    pub num_input_entries: u64,
    /// Bytes of input that made it into the output.
    pub memtable_payload_bytes: u64,
    /// Bytes of input dropped as shadowed, tombstoned or filtered.
    pub memtable_garbage_bytes: u64,
    pub blob_file_additions: Vec<BlobFileAddition>,
}

/// Drains the compaction iterator into one sorted table for L0, then appends
/// the surviving fragmented range tombstones. A run that emits nothing leaves
/// no file behind and reports `file_size = 0`.
///
/// IO failures are mirrored into `io_status` so the caller can tell a write
/// failure from an iterator failure.
#[allow(clippy::too_many_arguments)]
pub async fn build_table(
    db_options: &ImmutableDBOptions,
    tboptions: TableBuilderOptions,
    factory: Arc<dyn TableFactory>,
    comparator: &InternalKeyComparator,
    iter: &mut CompactionIter,
    meta: &mut FileMetaData,
    io_status: &mut Result<()>,
) -> Result<BuildTableResult> {
    let fname = make_table_file_name(&db_options.db_path, meta.id());
    let file = match db_options.fs.open_writable_file_writer(fname.clone()) {
        Ok(f) => f,
        Err(e) => {
            *io_status = Err(e.clone());
            return Err(e);
        }
    };
    let mut builder = factory.new_builder(&tboptions, file)?;

    let mut payload_bytes = 0u64;
    iter.seek_to_first();
    while iter.valid() {
        let key = iter.key();
        let value = iter.value();
        if let Err(e) = builder.add(key, value) {
            *io_status = Err(e.clone());
            return Err(e);
        }
        meta.update_boundary(key, iter.current_sequence());
        payload_bytes += (key.len() + value.len()) as u64;
        if builder.should_flush() {
            if let Err(e) = builder.flush().await {
                *io_status = Err(e.clone());
                return Err(e);
            }
        }
        iter.next();
    }
    iter.status()?;

    for tombstone in iter.range_del_agg_mut().tombstones() {
        let key = make_internal_key(
            &tombstone.start_key,
            tombstone.sequence,
            ValueType::TypeRangeDeletion,
        );
        if let Err(e) = builder.add(&key, &tombstone.end_key) {
            *io_status = Err(e.clone());
            return Err(e);
        }
        let largest_candidate = make_internal_key(
            &tombstone.end_key,
            MAX_SEQUENCE_NUMBER,
            ValueType::TypeRangeDeletion,
        );
        meta.update_boundaries_for_range(
            &key,
            &largest_candidate,
            tombstone.sequence,
            comparator,
        );
        payload_bytes += (key.len() + tombstone.end_key.len()) as u64;
    }

    let result = |payload: u64, input: u64, blobs: Vec<BlobFileAddition>, entries: u64| {
        BuildTableResult {
            num_input_entries: entries,
            memtable_payload_bytes: payload,
            memtable_garbage_bytes: input.saturating_sub(payload),
            blob_file_additions: blobs,
        }
    };

    if builder.num_entries() == 0 && builder.num_range_deletions() == 0 {
        // Everything was filtered or tombstoned away. No file.
        drop(builder);
        let _ = db_options.fs.remove(fname);
        meta.fd.file_size = 0;
        info!(
            "table #{} not created, all {} input records dropped",
            meta.id(),
            iter.num_input_records()
        );
        return Ok(result(0, iter.input_raw_bytes(), vec![], iter.num_input_records()));
    }

    if let Err(e) = builder.finish().await {
        *io_status = Err(e.clone());
        return Err(e);
    }
    meta.fd.file_size = builder.file_size();
    meta.num_entries = builder.num_entries();
    meta.file_checksum = builder.file_checksum();
    meta.file_checksum_func_name = builder.checksum_func_name().to_string();
    if meta.fd.smallest_seqno > meta.fd.largest_seqno {
        return Err(Error::Corruption(
            "table boundaries never updated despite entries".to_string(),
        ));
    }
    Ok(result(
        payload_bytes,
        iter.input_raw_bytes(),
        vec![],
        iter.num_input_records(),
    ))
}
