//! Error types for a load.

use bulkcopy_csv_source::SourceError;
use bulkcopy_postgresql::{DestinationError, SchemaError};
use std::fmt;
use thiserror::Error;

/// Everything that can make a load fail.
#[derive(Error, Debug)]
pub enum Error {
    /// The input stream could not be opened.
    #[error(transparent)]
    SourceOpen(SourceError),

    /// The header row is missing or malformed.
    #[error(transparent)]
    SourceRead(SourceError),

    /// The header does not produce a usable schema, or the destination
    /// refused to drop or create the relation.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Streaming, finalizing or committing failed. Nothing was committed.
    #[error(transparent)]
    Copy(#[from] CopyError),

    /// The destination could not be reached.
    #[error("Failed to connect to PostgreSQL")]
    Connect(#[source] DestinationError),
}

impl From<SourceError> for Error {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::Open { .. } => Error::SourceOpen(e),
            _ => Error::SourceRead(e),
        }
    }
}

/// Where in the copy phase a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStage {
    Begin,
    Open,
    /// Reading the record with this 1-based index from the source.
    Read { record: u64 },
    /// Submitting the record with this 1-based index to the destination.
    Submit { record: u64 },
    Finalize,
    Commit,
}

impl CopyStage {
    /// 1-based record index for row-level stages.
    pub fn record(&self) -> Option<u64> {
        match self {
            CopyStage::Read { record } | CopyStage::Submit { record } => Some(*record),
            _ => None,
        }
    }
}

impl fmt::Display for CopyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyStage::Begin => write!(f, "beginning the transaction"),
            CopyStage::Open => write!(f, "opening the COPY stream"),
            CopyStage::Read { record } => write!(f, "reading record {record}"),
            CopyStage::Submit { record } => write!(f, "submitting record {record}"),
            CopyStage::Finalize => write!(f, "finalizing the COPY stream"),
            CopyStage::Commit => write!(f, "committing"),
        }
    }
}

/// The underlying failure of a [`CopyError`].
#[derive(Error, Debug)]
pub enum CopyCause {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Destination(#[from] DestinationError),

    #[error("Load cancelled")]
    Cancelled,
}

/// The first failure of the copy phase, after which the load was rolled
/// back.
#[derive(Error, Debug)]
#[error("COPY into '{relation}' failed while {stage}")]
pub struct CopyError {
    pub relation: String,
    pub stage: CopyStage,
    #[source]
    pub cause: CopyCause,
}

impl CopyError {
    pub fn new(relation: &str, stage: CopyStage, cause: impl Into<CopyCause>) -> Self {
        Self {
            relation: relation.to_string(),
            stage,
            cause: cause.into(),
        }
    }

    /// A destination failure at `stage`. If the destination named the row
    /// it refused, the stage becomes [`CopyStage::Submit`] for that row,
    /// since buffered rows often fail only once they are flushed.
    pub fn rejected(relation: &str, stage: CopyStage, cause: DestinationError) -> Self {
        let stage = match cause.record() {
            Some(record) => CopyStage::Submit { record },
            None => stage,
        };
        Self::new(relation, stage, cause)
    }

    pub fn cancelled(relation: &str, stage: CopyStage) -> Self {
        Self::new(relation, stage, CopyCause::Cancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.cause, CopyCause::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_errors_split_by_kind() {
        let open = SourceError::Open {
            name: "x.csv".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(matches!(Error::from(open), Error::SourceOpen(_)));

        let missing = SourceError::MissingHeader("x.csv".to_string());
        assert!(matches!(Error::from(missing), Error::SourceRead(_)));
    }

    #[test]
    fn test_copy_error_message_names_record() {
        let err = CopyError::new(
            "people",
            CopyStage::Submit { record: 7 },
            DestinationError::Rejected("extra data after last expected column".to_string()),
        );
        assert_eq!(
            err.to_string(),
            "COPY into 'people' failed while submitting record 7"
        );
        assert_eq!(err.stage.record(), Some(7));
        assert!(!err.is_cancelled());

        let chain = format!("{:#}", anyhow::Error::from(err));
        assert!(chain.contains("extra data after last expected column"));
    }

    #[test]
    fn test_connect_error_keeps_cause() {
        let err = Error::Connect(DestinationError::Io(std::io::Error::other(
            "connection refused",
        )));
        assert_eq!(
            format!("{:#}", anyhow::Error::from(err)),
            "Failed to connect to PostgreSQL: I/O error: connection refused"
        );
    }

    #[test]
    fn test_rejected_row_overrides_stage() {
        let row = DestinationError::Row {
            record: 3,
            source: Box::new(DestinationError::Rejected("missing data".to_string())),
        };
        let err = CopyError::rejected("w", CopyStage::Finalize, row);
        assert_eq!(err.stage, CopyStage::Submit { record: 3 });
        assert_eq!(err.stage.record(), Some(3));

        let plain = DestinationError::Rejected("connection reset".to_string());
        let err = CopyError::rejected("w", CopyStage::Finalize, plain);
        assert_eq!(err.stage, CopyStage::Finalize);
    }
}
