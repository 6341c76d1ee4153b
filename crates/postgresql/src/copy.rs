//! `COPY ... FROM STDIN` framing.
//!
//! Rows travel in PostgreSQL's CSV format with every field quoted, so an
//! empty field arrives as an empty string rather than NULL. Field counts are
//! not checked here: the server rejects rows that do not match the column
//! list.
//!
//! The stream carries no header line, so the line number PostgreSQL reports
//! in a `COPY` error context is the 1-based index of the data record.

use crate::error::DestinationError;
use crate::ident::{quote_ident, quote_relation};
use bytes::Bytes;

/// Largest accepted flush threshold (64MB). The encoder allocates this much
/// up front.
pub const MAX_FLUSH_THRESHOLD: usize = 64 * 1024 * 1024;

/// Clamp a requested flush threshold to `1..=MAX_FLUSH_THRESHOLD`.
pub fn clamp_flush_threshold(flush_threshold: usize) -> usize {
    flush_threshold.clamp(1, MAX_FLUSH_THRESHOLD)
}

/// Generate the COPY statement for `relation` and `columns`.
pub fn copy_in_sql(relation: &str, columns: &[String]) -> String {
    let columns = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "COPY {} ({columns}) FROM STDIN WITH (FORMAT csv)",
        quote_relation(relation)
    )
}

/// Accumulates encoded rows until they are worth sending.
pub struct CopyEncoder {
    writer: csv::Writer<Vec<u8>>,
    flush_threshold: usize,
}

impl CopyEncoder {
    pub fn new(flush_threshold: usize) -> Self {
        let flush_threshold = clamp_flush_threshold(flush_threshold);
        Self {
            writer: Self::writer(flush_threshold),
            flush_threshold,
        }
    }

    fn writer(capacity: usize) -> csv::Writer<Vec<u8>> {
        csv::WriterBuilder::new()
            .quote_style(csv::QuoteStyle::Always)
            .flexible(true)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::with_capacity(capacity))
    }

    /// Append one row.
    pub fn encode(&mut self, fields: &[String]) -> Result<(), DestinationError> {
        self.writer.write_record(fields)?;
        // Push the row out of the csv writer's own buffer so `should_flush`
        // sees it.
        self.writer.flush()?;
        Ok(())
    }

    pub fn flush_threshold(&self) -> usize {
        self.flush_threshold
    }

    /// True once the buffered output has reached the flush threshold.
    pub fn should_flush(&self) -> bool {
        self.writer.get_ref().len() >= self.flush_threshold
    }

    /// Take everything encoded so far, leaving the encoder empty.
    pub fn take(&mut self) -> Result<Bytes, DestinationError> {
        let writer = std::mem::replace(&mut self.writer, Self::writer(self.flush_threshold));
        let buffer = writer.into_inner().map_err(|e| {
            DestinationError::Io(std::io::Error::new(e.error().kind(), e.error().to_string()))
        })?;
        Ok(Bytes::from(buffer))
    }
}

/// Record index from an error context such as `COPY t, line 3: "x"` or
/// `COPY t, line 3, column b: "x"`.
pub(crate) fn copy_line(context: &str) -> Option<u64> {
    context
        .lines()
        .filter(|line| line.starts_with("COPY "))
        .find_map(|line| {
            let (_, rest) = line.split_once(", line ")?;
            let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        })
}

/// Attach the failing record to a `COPY` error when the server named it.
pub(crate) fn copy_error(e: tokio_postgres::Error) -> DestinationError {
    let record = e
        .as_db_error()
        .and_then(|db| db.where_())
        .and_then(copy_line);

    match record {
        Some(record) => DestinationError::Row {
            record,
            source: Box::new(DestinationError::PostgreSQL(e)),
        },
        None => DestinationError::PostgreSQL(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_copy_in_sql() {
        let columns = row(&["name", "age"]);
        assert_eq!(
            copy_in_sql("people", &columns),
            "COPY \"people\" (\"name\", \"age\") FROM STDIN WITH (FORMAT csv)"
        );
    }

    #[test]
    fn test_encoder_quotes_everything() {
        let mut encoder = CopyEncoder::new(1024);
        encoder.encode(&row(&["Ada", ""])).unwrap();
        encoder.encode(&row(&["a,b", "say \"hi\""])).unwrap();

        let bytes = encoder.take().unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            "\"Ada\",\"\"\n\"a,b\",\"say \"\"hi\"\"\"\n"
        );
    }

    #[test]
    fn test_encoder_passes_ragged_rows() {
        let mut encoder = CopyEncoder::new(1024);
        encoder.encode(&row(&["1", "2"])).unwrap();
        encoder.encode(&row(&["1", "2", "3"])).unwrap();
        assert!(!encoder.take().unwrap().is_empty());
    }

    #[test]
    fn test_take_resets_buffer() {
        let mut encoder = CopyEncoder::new(1024);
        encoder.encode(&row(&["x"])).unwrap();
        assert!(!encoder.take().unwrap().is_empty());
        assert!(encoder.take().unwrap().is_empty());
    }

    #[test]
    fn test_should_flush_once_threshold_is_crossed() {
        // Each encoded row is `"n"` plus a newline: 4 bytes.
        let mut encoder = CopyEncoder::new(10);
        let mut chunks = Vec::new();

        for i in 0..7 {
            encoder.encode(&row(&[i.to_string().as_str()])).unwrap();
            let buffered = 4 * (i % 3 + 1);
            assert_eq!(encoder.should_flush(), buffered >= 10, "row {i}");
            if encoder.should_flush() {
                chunks.push(encoder.take().unwrap());
                assert!(!encoder.should_flush());
            }
        }
        chunks.push(encoder.take().unwrap());

        assert_eq!(chunks.len(), 3);
        let joined: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
        assert_eq!(
            std::str::from_utf8(&joined).unwrap(),
            "\"0\"\n\"1\"\n\"2\"\n\"3\"\n\"4\"\n\"5\"\n\"6\"\n"
        );
    }

    #[test]
    fn test_flush_threshold_is_clamped() {
        assert_eq!(CopyEncoder::new(0).flush_threshold(), 1);
        assert_eq!(
            CopyEncoder::new(usize::MAX).flush_threshold(),
            MAX_FLUSH_THRESHOLD
        );
        assert_eq!(clamp_flush_threshold(4096), 4096);
    }

    #[test]
    fn test_copy_line() {
        assert_eq!(copy_line("COPY w, line 3: \"\"x\"\""), Some(3));
        assert_eq!(
            copy_line("COPY people, line 120, column age: \"abc\""),
            Some(120)
        );
        assert_eq!(
            copy_line("SQL function \"f\" statement 1\nCOPY t, line 9"),
            Some(9)
        );
        assert_eq!(copy_line("COPY t"), None);
        assert_eq!(copy_line("PL/pgSQL function g() line 4 at RAISE"), None);
    }
}
