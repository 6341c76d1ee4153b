//! Error types for the PostgreSQL destination.

use thiserror::Error;

/// Errors raised by a [`Destination`](crate::Destination) while executing
/// statements or moving rows.
#[derive(Error, Debug)]
pub enum DestinationError {
    /// PostgreSQL connection or query error.
    #[error("PostgreSQL error")]
    PostgreSQL(#[from] tokio_postgres::Error),

    /// A row could not be framed for the `COPY` stream.
    #[error("Failed to encode COPY row")]
    Encode(#[from] csv::Error),

    /// Buffer I/O error while framing rows.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// The destination refused the statement or row.
    #[error("Rejected by destination: {0}")]
    Rejected(String),

    /// The destination named the row it refused. `record` is 1-based.
    #[error("Row {record} rejected")]
    Row {
        record: u64,
        #[source]
        source: Box<DestinationError>,
    },
}

impl DestinationError {
    /// 1-based index of the row the destination refused, if it said which.
    pub fn record(&self) -> Option<u64> {
        match self {
            DestinationError::Row { record, .. } => Some(*record),
            _ => None,
        }
    }
}

/// Errors raised while deriving a relation schema or (re)creating the
/// relation.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// Two header columns normalize to the same name.
    #[error("Header columns '{first}' and '{second}' both normalize to '{normalized}'")]
    DuplicateColumn {
        first: String,
        second: String,
        normalized: String,
    },

    /// A header column normalizes to an empty name. `position` is 1-based.
    #[error("Header column {position} ('{name}') normalizes to an empty name")]
    EmptyColumn { position: usize, name: String },

    /// `DROP TABLE` was rejected.
    #[error("Failed to drop relation '{relation}'")]
    Drop {
        relation: String,
        #[source]
        source: DestinationError,
    },

    /// `CREATE TABLE` was rejected.
    #[error("Failed to create relation '{relation}'")]
    Create {
        relation: String,
        #[source]
        source: DestinationError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    fn chain(e: &dyn std::error::Error) -> Vec<String> {
        let mut messages = vec![e.to_string()];
        let mut current = e.source();
        while let Some(cause) = current {
            messages.push(cause.to_string());
            current = cause.source();
        }
        messages
    }

    #[test]
    fn test_cause_is_reported_once() {
        let err = SchemaError::Create {
            relation: "t".to_string(),
            source: DestinationError::Row {
                record: 3,
                source: Box::new(DestinationError::Rejected("extra data".to_string())),
            },
        };

        assert_eq!(
            chain(&err),
            vec![
                "Failed to create relation 't'",
                "Row 3 rejected",
                "Rejected by destination: extra data",
            ]
        );
    }

    #[test]
    fn test_record_only_for_row_errors() {
        let row = DestinationError::Row {
            record: 7,
            source: Box::new(DestinationError::Rejected("bad".to_string())),
        };
        assert_eq!(row.record(), Some(7));
        assert_eq!(DestinationError::Rejected("bad".to_string()).record(), None);

        let io = DestinationError::from(std::io::Error::other("disk"));
        assert_eq!(io.to_string(), "I/O error");
        assert_eq!(io.source().map(|e| e.to_string()).as_deref(), Some("disk"));
    }
}
