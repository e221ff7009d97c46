use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sdk::types::FetchValue;

use super::{CacheEntry, CacheError, Provenance, ResultCache};
use crate::db::{ResultRepository, StoredResult};
use crate::sources::CacheKey;

/// Result cache backed by the `tool_results` table
#[derive(Clone)]
pub struct SqliteResultCache {
    repo: ResultRepository,
}

impl SqliteResultCache {
    pub fn new(repo: ResultRepository) -> Self {
        Self { repo }
    }

    /// Most recent entries, newest first
    pub async fn list(&self, limit: i64) -> Result<Vec<CacheEntry>, CacheError> {
        let rows = self
            .repo
            .list(limit)
            .await
            .map_err(|e| CacheError::Read(format!("{:#}", e)))?;

        rows.into_iter().map(entry_from_row).collect()
    }

    /// Number of stored entries
    pub async fn count(&self) -> Result<i64, CacheError> {
        self.repo
            .count()
            .await
            .map_err(|e| CacheError::Read(format!("{:#}", e)))
    }
}

#[async_trait]
impl ResultCache for SqliteResultCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let row = self
            .repo
            .get(key.as_str())
            .await
            .map_err(|e| CacheError::Read(format!("{:#}", e)))?;

        row.map(entry_from_row).transpose()
    }

    async fn put(
        &self,
        key: &CacheKey,
        result: &FetchValue,
        provenance: &Provenance,
    ) -> Result<(), CacheError> {
        let row = StoredResult {
            cache_key: key.as_str().to_string(),
            source: provenance.source.clone(),
            param_tag: provenance.param_tag.clone(),
            query: provenance.query.clone(),
            result_json: result.to_json_string(),
            created_at: Utc::now().timestamp(),
        };

        self.repo
            .upsert(&row)
            .await
            .map_err(|e| CacheError::Write(format!("{:#}", e)))
    }
}

fn entry_from_row(row: StoredResult) -> Result<CacheEntry, CacheError> {
    let result: FetchValue = serde_json::from_str(&row.result_json).map_err(|e| {
        CacheError::Read(format!("Corrupt entry '{}': {}", row.cache_key, e))
    })?;
    let created_at = DateTime::from_timestamp(row.created_at, 0).unwrap_or_default();

    Ok(CacheEntry {
        key: CacheKey::from_raw(row.cache_key),
        result,
        provenance: Provenance {
            source: row.source,
            param_tag: row.param_tag,
            query: row.query,
        },
        created_at,
    })
}
