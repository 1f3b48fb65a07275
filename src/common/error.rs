use std::io;
use std::result;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid Configuration: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[source] Box<io::Error>),
    #[error("Not supported: {0}")]
    NotSupported(String),
    #[error("Aborted: {0}")]
    Aborted(String),
    #[error("Column family dropped")]
    ColumnFamilyDropped,
    #[error("Shutdown in progress")]
    ShutdownInProgress,
    #[error("Corruption: {0}")]
    Corruption(String),
    #[error("Invalid filename: {0}")]
    InvalidFile(String),
    #[error("Invalid data: {0}")]
    VarDecode(&'static str),
    #[error("Task cancel because of: {0}")]
    Cancel(&'static str),
    #[error("Other Error: {0}")]
    Other(String),
}

impl Error {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted(_))
    }

    pub fn is_column_family_dropped(&self) -> bool {
        matches!(self, Error::ColumnFamilyDropped)
    }

    pub fn is_shutdown_in_progress(&self) -> bool {
        matches!(self, Error::ShutdownInProgress)
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_))
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(e: io::Error) -> Error {
        Error::Io(Box::new(e))
    }
}

impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Error::Config(e) => Error::Config(e.clone()),
            Error::Io(e) => Error::Other(format!("IO Error: {:?}", e)),
            Error::NotSupported(e) => Error::NotSupported(e.clone()),
            Error::Aborted(e) => Error::Aborted(e.clone()),
            Error::ColumnFamilyDropped => Error::ColumnFamilyDropped,
            Error::ShutdownInProgress => Error::ShutdownInProgress,
            Error::Corruption(e) => Error::Corruption(e.clone()),
            Error::InvalidFile(e) => Error::InvalidFile(e.clone()),
            Error::VarDecode(e) => Error::VarDecode(*e),
            Error::Cancel(e) => Error::Cancel(*e),
            Error::Other(e) => Error::Other(e.clone()),
        }
    }
}

pub type Result<T> = result::Result<T, Error>;
