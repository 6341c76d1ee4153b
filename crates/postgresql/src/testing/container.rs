//! Docker container management for a throwaway PostgreSQL

use anyhow::{Context, Result};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tokio_postgres::NoTls;
use tracing::{debug, info};

/// Image used when none is given.
pub const DEFAULT_IMAGE: &str = "postgres:16";

/// Configuration for a test PostgreSQL container
pub struct PostgresContainer {
    /// Container name
    pub container_name: String,
    /// Host port to bind to
    pub host_port: u16,
    /// Image name
    pub image_name: String,
    /// Connection string for the container
    pub connection_string: String,
}

impl PostgresContainer {
    /// Creates a new PostgreSQL container configuration
    pub fn new(container_name: &str, host_port: u16) -> Self {
        let connection_string = format!(
            "host=localhost port={host_port} user=postgres password=postgres dbname=testdb",
        );

        Self {
            container_name: container_name.to_string(),
            host_port,
            image_name: DEFAULT_IMAGE.to_string(),
            connection_string,
        }
    }

    /// Starts the PostgreSQL container, replacing any leftover one with the
    /// same name
    pub fn start(&self) -> Result<()> {
        info!("Starting PostgreSQL container: {}", self.container_name);

        let _ = Command::new("docker")
            .args(["rm", "-f", &self.container_name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        let output = Command::new("docker")
            .args([
                "run",
                "--name",
                &self.container_name,
                "-e",
                "POSTGRES_USER=postgres",
                "-e",
                "POSTGRES_PASSWORD=postgres",
                "-e",
                "POSTGRES_DB=testdb",
                "-p",
                &format!("{}:5432", self.host_port),
                "-d",
                &self.image_name,
            ])
            .output()
            .context("Failed to start Docker container")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to start container: {stderr}");
        }

        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!("Started container: {}", container_id);

        Ok(())
    }

    /// Waits for PostgreSQL to be ready to accept connections
    pub async fn wait_until_ready(&self, timeout_secs: u64) -> Result<()> {
        info!("Waiting for PostgreSQL to be ready...");

        let start = Instant::now();
        let timeout = Duration::from_secs(timeout_secs);

        while start.elapsed() < timeout {
            match self.test_connection().await {
                Ok(_) => {
                    info!("PostgreSQL is ready!");
                    return Ok(());
                }
                Err(e) => {
                    debug!("Connection attempt failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            }
        }

        anyhow::bail!("PostgreSQL did not become ready within {timeout_secs} seconds")
    }

    async fn test_connection(&self) -> Result<()> {
        let (client, connection) = tokio_postgres::connect(&self.connection_string, NoTls)
            .await
            .context("Failed to connect")?;

        tokio::spawn(async move {
            let _ = connection.await;
        });

        client
            .execute("SELECT 1", &[])
            .await
            .context("Failed to execute test query")?;

        Ok(())
    }

    /// Stops and removes the container
    pub fn stop(&self) -> Result<()> {
        info!("Stopping container: {}", self.container_name);

        let output = Command::new("docker")
            .args(["rm", "-f", &self.container_name])
            .output()
            .context("Failed to remove container")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("Failed to remove container (may not exist): {}", stderr);
        }

        Ok(())
    }
}

impl Drop for PostgresContainer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
