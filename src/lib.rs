//! bulkcopy library
//!
//! Loads a CSV file into a freshly created PostgreSQL table as fast as the
//! server allows, trading durability for throughput for the duration of a
//! one-shot load.
//!
//! # Pipeline
//!
//! 1. The CSV header is read and normalized into a schema of `TEXT` columns.
//! 2. The session is tuned for bulk writes (best-effort) and the target table
//!    is dropped and recreated `UNLOGGED`.
//! 3. Every record is streamed through a single `COPY ... FROM STDIN` inside
//!    one transaction. Any failure rolls the whole load back.
//! 4. Session settings are reset and a [`LoadReport`] is returned.
//!
//! # CLI Usage
//!
//! ```bash
//! bulkcopy --connection-string "host=localhost user=postgres" \
//!   --file people.csv --table people
//!
//! # Read from standard input
//! cat people.csv | bulkcopy --file - --table people
//! ```
//!
//! # Library Usage
//!
//! ```ignore
//! use bulkcopy::{open_source, process, postgresql::PostgresDestination};
//!
//! let mut destination = PostgresDestination::connect(connection_string).await?;
//! let report = process(&mut destination, open_source("people.csv")?, "people").await?;
//! println!("{report}");
//! ```

mod args;
mod error;
pub mod load;
mod process;

// Re-export component crates for convenience
pub use bulkcopy_csv_source as csv_source;
pub use bulkcopy_postgresql as postgresql;

pub use args::LoadArgs;
pub use error::{CopyCause, CopyError, CopyStage, Error};
pub use load::{load, LoadOptions, LoadReport, DEFAULT_PROGRESS_INTERVAL};
pub use process::{open_source, process, process_with, ProcessOptions};
