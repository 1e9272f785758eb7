use anyhow::{bail, Context, Result};
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, info};

/// Applies goose-format SQL migrations by shelling out to the `goose` binary.
pub struct MigrationRunner {
    /// `goose` when on PATH, otherwise an absolute path
    goose_binary_path: String,
    migrations_dir: String,
    /// goose driver name, e.g. `postgres`
    driver: String,
    dsn: String,
}

impl MigrationRunner {
    pub fn new(
        goose_binary_path: String,
        migrations_dir: String,
        driver: String,
        dsn: String,
    ) -> Self {
        Self {
            goose_binary_path,
            migrations_dir,
            driver,
            dsn,
        }
    }

    /// `goose -dir <dir> <driver> <dsn> up`
    pub async fn run_migrations(&self) -> Result<()> {
        info!(migrations_dir = %self.migrations_dir, "applying database migrations");

        let output = self.goose("up").await?;
        if !output.status.success() {
            bail!(
                "migration failed\nstdout: {}\nstderr: {}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
        }

        debug!("migrations applied:\n{}", String::from_utf8_lossy(&output.stdout));
        Ok(())
    }

    /// `goose ... status`; goose writes the table to stderr
    pub async fn migration_status(&self) -> Result<String> {
        let output = self.goose("status").await?;
        if !output.status.success() {
            bail!(
                "failed to read migration status: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }

        let mut status = String::from_utf8_lossy(&output.stdout).into_owned();
        status.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(status)
    }

    async fn goose(&self, command: &str) -> Result<Output> {
        Command::new(&self.goose_binary_path)
            .args(self.args(command))
            .output()
            .await
            .with_context(|| format!("failed to execute {}", self.goose_binary_path))
    }

    fn args<'a>(&'a self, command: &'a str) -> [&'a str; 5] {
        ["-dir", &self.migrations_dir, &self.driver, &self.dsn, command]
    }
}
