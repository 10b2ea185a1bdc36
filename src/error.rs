use std::{
    num::{ParseIntError, TryFromIntError},
    path::PathBuf,
    str::Utf8Error,
};
use thiserror::Error;

pub type VarstoreResult<T> = std::result::Result<T, VarstoreError>;

#[derive(Debug, Error)]
pub enum VarstoreError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Htslib(#[from] rust_htslib::errors::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Utf8(#[from] Utf8Error),
    #[error(transparent)]
    ParseInt(#[from] ParseIntError),
    #[error(transparent)]
    TryFromInt(#[from] TryFromIntError),
    #[error("Unable to read variant source {}: {message}", path.display())]
    SourceUnreadable { path: PathBuf, message: String },
    #[error("Header conflict for {kind} {id}: {message}")]
    HeaderConflict {
        kind: String,
        id: String,
        message: String,
    },
    #[error("Duplicate sample ID found: {sample}")]
    DuplicateSampleIdentifier { sample: String },
    #[error("Invalid interval {interval}: {reason}")]
    InvalidInterval { interval: String, reason: String },
    #[error("Array already holds data for sample {sample} in {interval} and overwriting is disabled")]
    OverwriteConflict { sample: String, interval: String },
    #[error("Failed writing to array {array}: {message}")]
    StoreWriteError { array: String, message: String },
    #[error("Source for sample {sample} failed after {records_read} records: {message}")]
    PartialSourceExhaustion {
        sample: String,
        records_read: u64,
        message: String,
    },
    #[error("Import job already failed; construct a new job to retry")]
    JobFailed,
}

impl VarstoreError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    pub fn invalid_interval(interval: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidInterval {
            interval: interval.to_string(),
            reason: reason.into(),
        }
    }

    pub fn store_write(array: impl Into<String>, message: impl ToString) -> Self {
        Self::StoreWriteError {
            array: array.into(),
            message: message.to_string(),
        }
    }
}

#[macro_export]
macro_rules! varstore_error {
    ($($arg:tt)*) => {
        $crate::error::VarstoreError::message(format!($($arg)*))
    };
}
