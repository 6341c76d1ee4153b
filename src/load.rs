//! The bulk copy engine.
//!
//! One transaction, one `COPY` stream, every record pulled lazily from the
//! source and pushed straight through. Nothing is committed unless every
//! record made it and the stream finalized cleanly.

use crate::error::{CopyError, CopyStage};
use bulkcopy_csv_source::{Record, SourceError};
use bulkcopy_postgresql::{Destination, LoadTransaction, RelationSchema};
use std::fmt;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Records between two progress lines.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100_000;

/// Knobs for [`load`].
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Log progress every this many records. `0` disables progress lines.
    pub progress_interval: u64,
    /// Cancelling this token aborts and rolls back the load.
    pub cancel: CancellationToken,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            cancel: CancellationToken::new(),
        }
    }
}

/// Outcome of a successful load.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub relation: String,
    /// Records submitted and committed.
    pub record_count: u64,
    /// Time from the start of the copy phase to commit.
    pub elapsed: Duration,
    pub records_per_second: f64,
}

impl LoadReport {
    pub fn new(relation: &str, record_count: u64, elapsed: Duration) -> Self {
        Self {
            relation: relation.to_string(),
            record_count,
            elapsed,
            records_per_second: throughput(record_count, elapsed),
        }
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records into {} in {:.2}s ({:.0} records/sec)",
            self.record_count,
            self.relation,
            self.elapsed.as_secs_f64(),
            self.records_per_second
        )
    }
}

fn throughput(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

/// Counts submitted records and logs throughput at a fixed cadence.
struct Progress {
    count: u64,
    started: Instant,
    interval: u64,
}

impl Progress {
    fn new(started: Instant, interval: u64) -> Self {
        Self {
            count: 0,
            started,
            interval,
        }
    }

    /// 1-based index of the record about to be handled.
    fn next(&self) -> u64 {
        self.count + 1
    }

    fn advance(&mut self) {
        self.count += 1;
        if self.interval > 0 && self.count % self.interval == 0 {
            info!(
                "COPY: {} records ({:.0} records/sec)",
                self.count,
                throughput(self.count, self.started.elapsed())
            );
        }
    }
}

/// Stream `records` into `relation` inside a single transaction.
///
/// The relation must already exist with `schema`'s columns. On any failure
/// the transaction is rolled back before the error is returned.
pub async fn load<D, I>(
    destination: &mut D,
    relation: &str,
    schema: &RelationSchema,
    records: I,
    options: &LoadOptions,
) -> Result<LoadReport, CopyError>
where
    D: Destination + ?Sized,
    I: IntoIterator<Item = Result<Record, SourceError>>,
{
    let started = Instant::now();

    let mut transaction = destination
        .begin()
        .await
        .map_err(|e| CopyError::new(relation, CopyStage::Begin, e))?;

    let copied = copy_records(
        transaction.as_mut(),
        relation,
        schema,
        records,
        options,
        started,
    )
    .await;

    let count = match copied {
        Ok(count) => count,
        Err(e) => {
            if let Err(rollback) = transaction.rollback().await {
                warn!("Rollback after failed COPY into {relation} also failed: {rollback}");
            } else {
                debug!("Rolled back COPY into {relation}");
            }
            return Err(e);
        }
    };

    if options.cancel.is_cancelled() {
        if let Err(rollback) = transaction.rollback().await {
            warn!("Rollback of cancelled COPY into {relation} failed: {rollback}");
        }
        return Err(CopyError::cancelled(relation, CopyStage::Commit));
    }

    // A failed commit leaves nothing behind: the server aborts the
    // transaction itself.
    transaction
        .commit()
        .await
        .map_err(|e| CopyError::new(relation, CopyStage::Commit, e))?;

    Ok(LoadReport::new(relation, count, started.elapsed()))
}

async fn copy_records<T, I>(
    transaction: &mut T,
    relation: &str,
    schema: &RelationSchema,
    records: I,
    options: &LoadOptions,
    started: Instant,
) -> Result<u64, CopyError>
where
    T: LoadTransaction + ?Sized,
    I: IntoIterator<Item = Result<Record, SourceError>>,
{
    let columns = schema.column_names();
    let mut channel = transaction
        .copy_in(relation, &columns)
        .await
        .map_err(|e| CopyError::new(relation, CopyStage::Open, e))?;

    info!("Starting COPY stream into {relation}");
    let mut progress = Progress::new(started, options.progress_interval);

    for record in records {
        let index = progress.next();
        if options.cancel.is_cancelled() {
            return Err(CopyError::cancelled(
                relation,
                CopyStage::Read { record: index },
            ));
        }

        let record =
            record.map_err(|e| CopyError::new(relation, CopyStage::Read { record: index }, e))?;
        channel
            .submit(&record)
            .await
            .map_err(|e| CopyError::rejected(relation, CopyStage::Submit { record: index }, e))?;
        progress.advance();
    }

    let accepted = tokio::select! {
        biased;
        _ = options.cancel.cancelled() => {
            return Err(CopyError::cancelled(relation, CopyStage::Finalize));
        }
        result = channel.finish() => {
            result.map_err(|e| CopyError::rejected(relation, CopyStage::Finalize, e))?
        }
    };

    if accepted != progress.count {
        debug!(
            "Destination reported {accepted} rows for {} submitted records",
            progress.count
        );
    }

    Ok(progress.count)
}
