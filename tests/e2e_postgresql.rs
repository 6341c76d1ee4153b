//! End-to-end loads against a real PostgreSQL started in Docker.

use anyhow::Result;
use bulkcopy::postgresql::testing::container::PostgresContainer;
use bulkcopy::postgresql::PostgresDestination;
use bulkcopy::{open_source, process, CopyStage, Error};
use std::io::Write;
use tempfile::NamedTempFile;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Test port that doesn't conflict with standard PostgreSQL port
const TEST_PORT: u16 = 15442;

/// Initialize logging for tests
fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

fn csv_file(contents: &str) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

async fn column_names(destination: &PostgresDestination, table: &str) -> Result<Vec<String>> {
    let rows = destination
        .client()
        .query(
            "SELECT column_name::text FROM information_schema.columns \
             WHERE table_name = $1 ORDER BY ordinal_position",
            &[&table],
        )
        .await?;
    Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
}

#[tokio::test]
#[ignore = "Requires Docker"]
async fn test_postgresql_bulk_load() -> Result<()> {
    init_logging();

    let container = PostgresContainer::new("bulkcopy-e2e-postgres", TEST_PORT);
    container.start()?;
    container.wait_until_ready(60).await?;

    let mut destination = PostgresDestination::connect(&container.connection_string).await?;

    // People scenario
    let people = csv_file("name,age\nAda,36\nAlan,41\n")?;
    let report = process(
        &mut destination,
        open_source(&people.path().display().to_string())?,
        "people",
    )
    .await?;
    assert_eq!(report.record_count, 2);
    assert_eq!(destination.row_count("people").await?, 2);
    assert_eq!(column_names(&destination, "people").await?, vec!["name", "age"]);

    let rows = destination
        .client()
        .query("SELECT name, age FROM people ORDER BY name", &[])
        .await?;
    let values: Vec<(String, String)> = rows.iter().map(|r| (r.get(0), r.get(1))).collect();
    assert_eq!(
        values,
        vec![
            ("Ada".to_string(), "36".to_string()),
            ("Alan".to_string(), "41".to_string())
        ]
    );

    let persistence: String = destination
        .client()
        .query_one(
            "SELECT relpersistence::text FROM pg_class WHERE relname = 'people'",
            &[],
        )
        .await?
        .get(0);
    assert_eq!(persistence, "u");

    // Reload with a different schema replaces the old one
    let renamed = csv_file("First Name,Last-Name\nGrace,Hopper\n")?;
    process(
        &mut destination,
        open_source(&renamed.path().display().to_string())?,
        "people",
    )
    .await?;
    assert_eq!(
        column_names(&destination, "people").await?,
        vec!["first_name", "last_name"]
    );
    assert_eq!(destination.row_count("people").await?, 1);

    // Ragged input is rejected by the server and nothing is committed
    let ragged = csv_file("a,b\n1,2\n3\n")?;
    let err = process(
        &mut destination,
        open_source(&ragged.path().display().to_string())?,
        "ragged",
    )
    .await
    .unwrap_err();
    match err {
        Error::Copy(e) => assert_eq!(e.stage, CopyStage::Submit { record: 2 }),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(destination.row_count("ragged").await?, 0);

    // Small flush threshold: rows go out in many chunks mid-stream
    let mut chunked = PostgresDestination::connect(&container.connection_string)
        .await?
        .with_flush_threshold(64);
    let mut data = String::from("id,name\n");
    for i in 1..=1000 {
        data.push_str(&format!("{i},name_{i}\n"));
    }
    let many = csv_file(&data)?;
    let report = process(
        &mut chunked,
        open_source(&many.path().display().to_string())?,
        "chunks",
    )
    .await?;
    assert_eq!(report.record_count, 1000);
    assert_eq!(chunked.row_count("chunks").await?, 1000);
    let last: String = chunked
        .client()
        .query_one("SELECT name FROM chunks WHERE id = '1000'", &[])
        .await?
        .get(0);
    assert_eq!(last, "name_1000");

    // Mixed-case table names fold like unquoted identifiers
    let mixed = csv_file("a\n1\n")?;
    process(
        &mut chunked,
        open_source(&mixed.path().display().to_string())?,
        "MixedCase",
    )
    .await?;
    assert_eq!(chunked.row_count("mixedcase").await?, 1);

    // Session settings were reset
    let synchronous_commit: String = destination
        .client()
        .query_one("SHOW synchronous_commit", &[])
        .await?
        .get(0);
    assert_eq!(synchronous_commit, "on");

    container.stop()?;
    Ok(())
}
