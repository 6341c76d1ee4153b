//! [`Destination`] implementation over `tokio-postgres`.

use crate::copy::{clamp_flush_threshold, copy_error, copy_in_sql, CopyEncoder};
use crate::destination::{CopyChannel, Destination, LoadTransaction};
use crate::error::DestinationError;
use crate::ident::quote_relation;
use async_trait::async_trait;
use bytes::Bytes;
use futures::SinkExt;
use std::pin::Pin;
use tokio_postgres::{Client, CopyInSink, NoTls, Transaction};
use tracing::debug;

/// Default number of encoded bytes buffered before they are sent (1MB)
pub const DEFAULT_FLUSH_THRESHOLD: usize = 1024 * 1024;

/// A dedicated PostgreSQL connection used for one load.
pub struct PostgresDestination {
    client: Client,
    flush_threshold: usize,
}

impl PostgresDestination {
    /// Connect and spawn the connection task.
    ///
    /// # Arguments
    ///
    /// * `connection_string` - PostgreSQL connection string (e.g., "host=localhost user=postgres password=postgres dbname=testdb")
    pub async fn connect(connection_string: &str) -> Result<Self, DestinationError> {
        let (client, connection) = tokio_postgres::connect(connection_string, NoTls).await?;

        // Spawn the connection task
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error: {}", e);
            }
        });

        // Test connection
        client.simple_query("SELECT 1").await?;

        Ok(Self::with_client(client))
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
        }
    }

    /// Set how many encoded bytes are buffered before a `COPY` write.
    /// Clamped to `1..=MAX_FLUSH_THRESHOLD`.
    pub fn with_flush_threshold(mut self, flush_threshold: usize) -> Self {
        self.flush_threshold = clamp_flush_threshold(flush_threshold);
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Get the row count for a relation.
    pub async fn row_count(&self, relation: &str) -> Result<u64, DestinationError> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_relation(relation));
        let row = self.client.query_one(&sql, &[]).await?;
        let count: i64 = row.get(0);
        Ok(count as u64)
    }
}

#[async_trait]
impl Destination for PostgresDestination {
    async fn execute(&mut self, statement: &str) -> Result<(), DestinationError> {
        self.client.batch_execute(statement).await?;
        Ok(())
    }

    async fn begin(&mut self) -> Result<Box<dyn LoadTransaction + '_>, DestinationError> {
        let flush_threshold = self.flush_threshold;
        let transaction = self.client.transaction().await?;
        Ok(Box::new(PostgresTransaction {
            transaction,
            flush_threshold,
        }))
    }
}

struct PostgresTransaction<'a> {
    transaction: Transaction<'a>,
    flush_threshold: usize,
}

#[async_trait]
impl LoadTransaction for PostgresTransaction<'_> {
    async fn copy_in(
        &mut self,
        relation: &str,
        columns: &[String],
    ) -> Result<Box<dyn CopyChannel + '_>, DestinationError> {
        let sql = copy_in_sql(relation, columns);
        debug!("COPY: {}", sql);
        let sink: CopyInSink<Bytes> = self.transaction.copy_in(&sql).await?;
        Ok(Box::new(PostgresCopyChannel {
            sink: Box::pin(sink),
            encoder: CopyEncoder::new(self.flush_threshold),
        }))
    }

    async fn commit(self: Box<Self>) -> Result<(), DestinationError> {
        self.transaction.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DestinationError> {
        self.transaction.rollback().await?;
        Ok(())
    }
}

struct PostgresCopyChannel {
    sink: Pin<Box<CopyInSink<Bytes>>>,
    encoder: CopyEncoder,
}

#[async_trait]
impl CopyChannel for PostgresCopyChannel {
    async fn submit(&mut self, fields: &[String]) -> Result<(), DestinationError> {
        self.encoder.encode(fields)?;
        if self.encoder.should_flush() {
            let chunk = self.encoder.take()?;
            self.sink.send(chunk).await.map_err(copy_error)?;
        }
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<u64, DestinationError> {
        let mut channel = self;
        let tail = channel.encoder.take()?;
        if !tail.is_empty() {
            channel.sink.send(tail).await.map_err(copy_error)?;
        }
        let rows = channel.sink.as_mut().finish().await.map_err(copy_error)?;
        Ok(rows)
    }
}
