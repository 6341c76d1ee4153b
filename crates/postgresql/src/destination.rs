//! The destination abstraction the bulk copy engine writes through.
//!
//! A destination executes plain statements, opens transactions, and inside a
//! transaction opens a single row-oriented `COPY` channel. Borrowing ties the
//! three together: a channel borrows its transaction, which borrows its
//! destination, so nothing else can touch the connection while a load is in
//! flight.

use crate::error::DestinationError;
use async_trait::async_trait;

/// A connection to the destination engine.
#[async_trait]
pub trait Destination: Send {
    /// Execute a statement outside of any transaction opened by [`begin`](Self::begin).
    async fn execute(&mut self, statement: &str) -> Result<(), DestinationError>;

    /// Begin a transaction.
    async fn begin(&mut self) -> Result<Box<dyn LoadTransaction + '_>, DestinationError>;
}

/// An open transaction.
///
/// Dropping it without calling [`commit`](Self::commit) discards its work.
#[async_trait]
pub trait LoadTransaction: Send {
    /// Open a `COPY` channel into `relation`, feeding `columns` in order.
    async fn copy_in(
        &mut self,
        relation: &str,
        columns: &[String],
    ) -> Result<Box<dyn CopyChannel + '_>, DestinationError>;

    async fn commit(self: Box<Self>) -> Result<(), DestinationError>;

    async fn rollback(self: Box<Self>) -> Result<(), DestinationError>;
}

/// A bulk-copy channel scoped to a transaction.
///
/// Dropping it without calling [`finish`](Self::finish) aborts the copy.
#[async_trait]
pub trait CopyChannel: Send {
    /// Submit one row. Fields are matched to the channel's columns by
    /// position; the destination decides what a length mismatch means.
    async fn submit(&mut self, fields: &[String]) -> Result<(), DestinationError>;

    /// Flush any buffered rows and close the channel, returning the number
    /// of rows the destination accepted.
    async fn finish(self: Box<Self>) -> Result<u64, DestinationError>;
}
