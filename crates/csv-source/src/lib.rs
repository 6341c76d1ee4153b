//! Streaming CSV record source for bulkcopy
//!
//! Reads a comma-delimited byte stream one record at a time. The header row
//! is consumed separately via [`RecordSource::read_header`], which hands back
//! a forward-only [`Records`] sequence for the data rows. Nothing beyond the
//! current record is held in memory, so arbitrarily large inputs can be
//! streamed.
//!
//! # Example
//!
//! ```ignore
//! use bulkcopy_csv_source::RecordSource;
//!
//! let source = RecordSource::open("people.csv")?;
//! let (header, mut records) = source.read_header()?;
//! while let Some(record) = records.next_record()? {
//!     // submit `record` somewhere...
//! }
//! ```

mod error;
mod source;

pub use error::SourceError;
pub use source::{Record, RecordSource, Records, DEFAULT_BUFFER_SIZE, STDIN_SOURCE_NAME};
