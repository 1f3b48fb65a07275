use std::path::PathBuf;

use crate::common::{Error, Result};

#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum DBFileType {
    TableFile,
    DescriptorFile,
    CurrentFile,
    TempFile,
}

pub fn make_table_file_name(path: &str, number: u64) -> PathBuf {
    PathBuf::from(format!("{}/{:06}.sst", path, number))
}

pub fn make_descriptor_file_name(path: &str, number: u64) -> PathBuf {
    PathBuf::from(format!("{}/MANIFEST-{:06}", path, number))
}

pub fn make_current_file(path: &str) -> PathBuf {
    PathBuf::from(format!("{}/CURRENT", path))
}

pub fn make_temp_plain_file_name(path: &str, number: u64) -> PathBuf {
    PathBuf::from(format!("{}/{:06}.dbtmp", path, number))
}

pub fn parse_file_name(fname: &str) -> Result<(DBFileType, u64)> {
    if fname == "CURRENT" {
        return Ok((DBFileType::CurrentFile, 0));
    }
    if let Some(rest) = fname.strip_prefix("MANIFEST-") {
        let number = rest
            .parse::<u64>()
            .map_err(|_| Error::InvalidFile(format!("bad manifest file name: {}", fname)))?;
        return Ok((DBFileType::DescriptorFile, number));
    }
    if let Some(rest) = fname.strip_suffix(".sst") {
        let number = rest
            .parse::<u64>()
            .map_err(|_| Error::InvalidFile(format!("bad table file name: {}", fname)))?;
        return Ok((DBFileType::TableFile, number));
    }
    if let Some(rest) = fname.strip_suffix(".dbtmp") {
        let number = rest
            .parse::<u64>()
            .map_err(|_| Error::InvalidFile(format!("bad temp file name: {}", fname)))?;
        return Ok((DBFileType::TempFile, number));
    }
    Err(Error::InvalidFile(format!("unknown file name: {}", fname)))
}
