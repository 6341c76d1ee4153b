//! PostgreSQL destination support for bulkcopy
//!
//! This crate owns everything that talks to the destination engine:
//!
//! - the [`Destination`] abstraction (statements, transactions, `COPY`
//!   channels) and its [`PostgresDestination`] implementation,
//! - relation preparation: header normalization, `DROP` and
//!   `CREATE UNLOGGED TABLE`,
//! - best-effort session tuning for the load window and its restoration.
//!
//! # Example
//!
//! ```ignore
//! use bulkcopy_postgresql::{derive_schema, prepare_relation, tune_for_bulk_load, PostgresDestination};
//!
//! let mut destination = PostgresDestination::connect("host=localhost user=postgres").await?;
//! let schema = derive_schema(&header)?;
//! let tuning = tune_for_bulk_load(&mut destination).await;
//! prepare_relation(&mut destination, "people", &schema).await?;
//! // ... stream rows through `destination.begin()` ...
//! tuning.restore(&mut destination).await;
//! ```

mod client;
mod copy;
mod destination;
mod error;
mod ident;
mod schema;
mod tuning;

// Make testing module available for integration tests
#[doc(hidden)]
pub mod testing;

pub use client::{PostgresDestination, DEFAULT_FLUSH_THRESHOLD};
pub use copy::{clamp_flush_threshold, copy_in_sql, CopyEncoder, MAX_FLUSH_THRESHOLD};
pub use destination::{CopyChannel, Destination, LoadTransaction};
pub use error::{DestinationError, SchemaError};
pub use ident::{quote_ident, quote_relation};
pub use schema::{
    create_relation_sql, derive_schema, drop_relation_sql, normalize_column_name,
    normalize_relation_name, prepare_relation, Column, RelationSchema,
};
pub use tuning::{tune_for_bulk_load, TuningGuard, TuningSetting, BULK_LOAD_TUNING};
