//! Error types for the CSV record source.

use thiserror::Error;

/// Errors that can occur while opening or reading a delimited source.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The underlying stream could not be opened.
    #[error("Failed to open source '{name}'")]
    Open {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The stream contained no header row at all.
    #[error("Source '{0}' is empty: no header row")]
    MissingHeader(String),

    /// The header row could not be parsed.
    #[error("Failed to read header of '{name}'")]
    Header {
        name: String,
        #[source]
        source: csv::Error,
    },

    /// A data record could not be parsed. `record` is 1-based and does not
    /// count the header.
    #[error("Failed to read record {record} of '{name}'")]
    Record {
        name: String,
        record: u64,
        #[source]
        source: csv::Error,
    },
}

impl SourceError {
    /// 1-based index of the data record that failed, if the failure was
    /// row-level.
    pub fn record(&self) -> Option<u64> {
        match self {
            SourceError::Record { record, .. } => Some(*record),
            _ => None,
        }
    }
}
