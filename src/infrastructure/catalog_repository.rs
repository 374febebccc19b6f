//! SQLite catalog repository
//!
//! One row per part number. Attributes and both history sequences are JSON
//! columns; every batch runs inside a single transaction.

#![allow(clippy::uninlined_format_args)]

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::debug;

use crate::domain::catalog::{CatalogRecord, HistoryUpdate};
use crate::domain::errors::StoreError;
use crate::domain::repositories::CatalogRepository;

/// SQLite caps bound parameters per statement; lookups are chunked below it
const LOOKUP_CHUNK: usize = 500;

#[derive(Clone)]
pub struct SqliteCatalogRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteCatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    fn encode<T: Serialize>(part_number: &str, value: &T) -> Result<String, StoreError> {
        serde_json::to_string(value).map_err(|e| StoreError::Encode {
            part_number: part_number.to_string(),
            reason: e.to_string(),
        })
    }

    fn decode<T: DeserializeOwned>(part_number: &str, raw: &str) -> Result<T, StoreError> {
        serde_json::from_str(raw).map_err(|e| StoreError::Decode {
            part_number: part_number.to_string(),
            reason: e.to_string(),
        })
    }

    fn record_from_row(row: &SqliteRow) -> Result<CatalogRecord, StoreError> {
        let part_number: String = row.get("part_number");
        let attributes: String = row.get("attributes");
        let pricing: String = row.get("pricing");
        let inventory: String = row.get("inventory");
        Ok(CatalogRecord {
            attributes: Self::decode(&part_number, &attributes)?,
            pricing: Self::decode(&part_number, &pricing)?,
            inventory: Self::decode(&part_number, &inventory)?,
            part_number,
        })
    }
}

#[async_trait]
impl CatalogRepository for SqliteCatalogRepository {
    async fn find_by_part_numbers(
        &self,
        part_numbers: &[String],
    ) -> Result<Vec<CatalogRecord>, StoreError> {
        let mut found = Vec::with_capacity(part_numbers.len());
        for chunk in part_numbers.chunks(LOOKUP_CHUNK) {
            let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT part_number, attributes, pricing, inventory FROM catalog_records WHERE part_number IN (",
            );
            let mut separated = query.separated(", ");
            for part_number in chunk {
                separated.push_bind(part_number.as_str());
            }
            separated.push_unseparated(")");

            let rows = query.build().fetch_all(&*self.pool).await?;
            for row in &rows {
                found.push(Self::record_from_row(row)?);
            }
        }
        debug!("🔍 Looked up {} part numbers, {} known", part_numbers.len(), found.len());
        Ok(found)
    }

    async fn insert_many(&self, records: &[CatalogRecord]) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO catalog_records (part_number, attributes, pricing, inventory)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&record.part_number)
            .bind(Self::encode(&record.part_number, &record.attributes)?)
            .bind(Self::encode(&record.part_number, &record.pricing)?)
            .bind(Self::encode(&record.part_number, &record.inventory)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(records.len() as u64)
    }

    async fn update_histories(&self, updates: &[HistoryUpdate]) -> Result<u64, StoreError> {
        if updates.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for update in updates {
            let result = sqlx::query(
                r#"
                UPDATE catalog_records
                SET attributes = ?, pricing = ?, inventory = ?, updated_at = CURRENT_TIMESTAMP
                WHERE part_number = ?
                "#,
            )
            .bind(Self::encode(&update.part_number, &update.attributes)?)
            .bind(Self::encode(&update.part_number, &update.pricing)?)
            .bind(Self::encode(&update.part_number, &update.inventory)?)
            .bind(&update.part_number)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }
        tx.commit().await?;
        Ok(written)
    }

    async fn find_record(&self, part_number: &str) -> Result<Option<CatalogRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT part_number, attributes, pricing, inventory FROM catalog_records WHERE part_number = ?",
        )
        .bind(part_number)
        .fetch_optional(&*self.pool)
        .await?;
        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn all_records(&self) -> Result<Vec<CatalogRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT part_number, attributes, pricing, inventory FROM catalog_records ORDER BY part_number",
        )
        .fetch_all(&*self.pool)
        .await?;
        rows.iter().map(Self::record_from_row).collect()
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM catalog_records")
            .fetch_one(&*self.pool)
            .await?;
        let total: i64 = row.get("total");
        Ok(u64::try_from(total).unwrap_or(0))
    }

    async fn all_part_numbers(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT part_number FROM catalog_records ORDER BY part_number")
            .fetch_all(&*self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("part_number")).collect())
    }

    async fn duplicate_part_numbers(&self) -> Result<Vec<(String, u64)>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT part_number, COUNT(*) AS copies
            FROM catalog_records
            GROUP BY part_number
            HAVING COUNT(*) > 1
            "#,
        )
        .fetch_all(&*self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| {
                let copies: i64 = row.get("copies");
                (row.get("part_number"), u64::try_from(copies).unwrap_or(0))
            })
            .collect())
    }
}
