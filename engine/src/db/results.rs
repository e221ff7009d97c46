//! Persisted fetch results
//!
//! One row per cache key. Rows are written with a single upsert so a race
//! between two runs for the same key resolves to the last writer without a
//! partially written row ever being visible.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Raw row of the `tool_results` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResult {
    pub cache_key: String,
    pub source: String,
    pub param_tag: String,
    pub query: String,
    pub result_json: String,
    pub created_at: i64,
}

/// Result repository for database operations
#[derive(Clone)]
pub struct ResultRepository {
    pool: SqlitePool,
}

impl ResultRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace the row for `result.cache_key`
    pub async fn upsert(&self, result: &StoredResult) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tool_results (cache_key, source, param_tag, query, result_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(cache_key) DO UPDATE SET
                source = excluded.source,
                param_tag = excluded.param_tag,
                query = excluded.query,
                result_json = excluded.result_json,
                created_at = excluded.created_at
            "#,
        )
        .bind(&result.cache_key)
        .bind(&result.source)
        .bind(&result.param_tag)
        .bind(&result.query)
        .bind(&result.result_json)
        .bind(result.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to store tool result")?;

        Ok(())
    }

    /// Get a stored result by cache key
    pub async fn get(&self, cache_key: &str) -> Result<Option<StoredResult>> {
        let row = sqlx::query(
            "SELECT cache_key, source, param_tag, query, result_json, created_at FROM tool_results WHERE cache_key = ?",
        )
        .bind(cache_key)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch tool result")?;

        Ok(row.map(|row| Self::row_to_result(&row)))
    }

    /// List stored results, newest first
    pub async fn list(&self, limit: i64) -> Result<Vec<StoredResult>> {
        let rows = sqlx::query(
            r#"
            SELECT cache_key, source, param_tag, query, result_json, created_at
            FROM tool_results
            ORDER BY created_at DESC, cache_key ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list tool results")?;

        Ok(rows.iter().map(Self::row_to_result).collect())
    }

    /// Number of stored results
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tool_results")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count tool results")?;

        Ok(count)
    }

    fn row_to_result(row: &sqlx::sqlite::SqliteRow) -> StoredResult {
        StoredResult {
            cache_key: row.get("cache_key"),
            source: row.get("source"),
            param_tag: row.get("param_tag"),
            query: row.get("query"),
            result_json: row.get("result_json"),
            created_at: row.get("created_at"),
        }
    }
}
