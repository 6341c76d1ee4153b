//! Lazy record reading over a comma-delimited stream.

use crate::error::SourceError;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Buffer size handed to the CSV reader (1MB)
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Display name used for sources read from standard input.
pub const STDIN_SOURCE_NAME: &str = "<stdin>";

/// One data row, fields in file order.
pub type Record = Vec<String>;

/// A delimited byte stream whose header has not been read yet.
///
/// Calling [`RecordSource::read_header`] consumes the source and yields the
/// column names together with the [`Records`] that follow them. The split
/// makes it impossible to read data rows before the header, or to rewind.
pub struct RecordSource {
    name: String,
    reader: csv::Reader<Box<dyn Read + Send>>,
}

impl RecordSource {
    /// Wrap any byte stream. `name` is only used in log lines and errors.
    pub fn from_reader<R>(name: impl Into<String>, reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        let reader: Box<dyn Read + Send> = Box::new(reader);
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            // Ragged rows are passed through; the destination decides.
            .flexible(true)
            .delimiter(b',')
            .buffer_capacity(DEFAULT_BUFFER_SIZE)
            .from_reader(reader);

        Self {
            name: name.into(),
            reader,
        }
    }

    /// Open a file on the local filesystem.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let file = File::open(path).map_err(|source| SourceError::Open {
            name: name.clone(),
            source,
        })?;
        debug!("Opened CSV source: {name}");
        Ok(Self::from_reader(name, file))
    }

    /// Read from the process's standard input.
    pub fn stdin() -> Self {
        Self::from_reader(STDIN_SOURCE_NAME, std::io::stdin())
    }

    /// Display name of the underlying stream.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Consume the first record as the column names.
    ///
    /// Fails with [`SourceError::MissingHeader`] if the stream is empty and
    /// with [`SourceError::Header`] if the first record cannot be parsed.
    pub fn read_header(mut self) -> Result<(Vec<String>, Records), SourceError> {
        let mut record = csv::StringRecord::new();
        let found = self
            .reader
            .read_record(&mut record)
            .map_err(|source| SourceError::Header {
                name: self.name.clone(),
                source,
            })?;

        if !found {
            return Err(SourceError::MissingHeader(self.name));
        }

        let header: Vec<String> = record.iter().map(str::to_owned).collect();
        debug!("Read header of {}: {header:?}", self.name);

        Ok((
            header,
            Records {
                name: self.name,
                reader: self.reader,
                record,
                read: 0,
                finished: false,
            },
        ))
    }
}

/// The data rows following the header.
///
/// Finite and forward-only. Exactly one record is buffered at a time.
pub struct Records {
    name: String,
    reader: csv::Reader<Box<dyn Read + Send>>,
    record: csv::StringRecord,
    read: u64,
    finished: bool,
}

impl Records {
    /// Produce the next record, or `None` once the stream is exhausted.
    ///
    /// Field counts are not checked against the header.
    pub fn next_record(&mut self) -> Result<Option<Record>, SourceError> {
        if self.finished {
            return Ok(None);
        }

        let found =
            self.reader
                .read_record(&mut self.record)
                .map_err(|source| SourceError::Record {
                    name: self.name.clone(),
                    record: self.read + 1,
                    source,
                })?;

        if !found {
            self.finished = true;
            debug!("Reached end of {} after {} records", self.name, self.read);
            return Ok(None);
        }

        self.read += 1;
        Ok(Some(self.record.iter().map(str::to_owned).collect()))
    }

    /// Number of data records produced so far.
    pub fn records_read(&self) -> u64 {
        self.read
    }

    /// Display name of the underlying stream.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Iterator for Records {
    type Item = Result<Record, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}
