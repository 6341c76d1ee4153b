//! End-to-end load: header, schema, tuning, relation, copy.

use crate::error::Error;
use crate::load::{load, LoadOptions, LoadReport};
use bulkcopy_csv_source::{RecordSource, Records};
use bulkcopy_postgresql::{
    derive_schema, normalize_relation_name, prepare_relation, tune_for_bulk_load, Destination,
    RelationSchema,
};
use tracing::info;

/// Knobs for [`process_with`].
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub load: LoadOptions,
    /// Apply bulk load session tuning around the load.
    pub tune: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            load: LoadOptions::default(),
            tune: true,
        }
    }
}

/// Open `input` as a record source. `-` means standard input.
pub fn open_source(input: &str) -> Result<RecordSource, Error> {
    if input == "-" {
        Ok(RecordSource::stdin())
    } else {
        Ok(RecordSource::open(input)?)
    }
}

/// Load `source` into a freshly recreated `relation` with default options.
pub async fn process<D>(
    destination: &mut D,
    source: RecordSource,
    relation: &str,
) -> Result<LoadReport, Error>
where
    D: Destination + ?Sized,
{
    process_with(destination, source, relation, &ProcessOptions::default()).await
}

/// Load `source` into a freshly recreated `relation`.
///
/// The relation name is lowercased, then the relation is dropped and
/// recreated before any record is read past the header. Session tuning, if enabled, is reset before returning whether the
/// load succeeded or not.
pub async fn process_with<D>(
    destination: &mut D,
    source: RecordSource,
    relation: &str,
    options: &ProcessOptions,
) -> Result<LoadReport, Error>
where
    D: Destination + ?Sized,
{
    info!("CSV: {}", source.name());
    let (header, records) = source.read_header()?;
    info!("Columns: {header:?}");

    let schema = derive_schema(&header)?;
    let relation = normalize_relation_name(relation);

    let tuning = if options.tune {
        Some(tune_for_bulk_load(destination).await)
    } else {
        None
    };

    let result = prepare_and_load(destination, &relation, &schema, records, &options.load).await;

    if let Some(tuning) = tuning {
        tuning.restore(destination).await;
    }

    let report = result?;
    info!("COPY: {report}");
    Ok(report)
}

async fn prepare_and_load<D>(
    destination: &mut D,
    relation: &str,
    schema: &RelationSchema,
    records: Records,
    options: &LoadOptions,
) -> Result<LoadReport, Error>
where
    D: Destination + ?Sized,
{
    prepare_relation(destination, relation, schema).await?;
    Ok(load(destination, relation, schema, records, options).await?)
}
