// Database connection and pool management
// SQLite via sqlx; records are stored one row per part number with the
// attribute block and both history sequences as JSON columns.

use anyhow::{Context, Result};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;
use tracing::info;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let in_memory = database_url.contains(":memory:");

        if !in_memory {
            let db_path = database_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:");
            let db_path = db_path.split('?').next().unwrap_or(db_path);

            if let Some(parent) = Path::new(db_path).parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| {
                        format!("Failed to create database directory {}", parent.display())
                    })?;
            }
            if !Path::new(db_path).exists() {
                tokio::fs::File::create(db_path)
                    .await
                    .with_context(|| format!("Failed to create database file {db_path}"))?;
            }
        }

        // Every in-memory connection is its own database
        let max_connections = if in_memory { 1 } else { max_connections.max(1) };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .with_context(|| format!("Failed to connect to {database_url}"))?;

        info!("🗄️ Connected to {} ({} connections)", database_url, max_connections);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_records_sql = r#"
            CREATE TABLE IF NOT EXISTS catalog_records (
                part_number TEXT PRIMARY KEY,
                attributes TEXT NOT NULL,
                pricing TEXT NOT NULL,
                inventory TEXT NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        let create_indexes_sql = r#"
            CREATE INDEX IF NOT EXISTS idx_catalog_records_updated_at ON catalog_records (updated_at);
        "#;

        sqlx::query(create_records_sql).execute(&self.pool).await?;
        sqlx::query(create_indexes_sql).execute(&self.pool).await?;

        Ok(())
    }
}
