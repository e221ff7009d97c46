use async_trait::async_trait;
use chrono::Utc;
use sdk::types::FetchValue;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{CacheEntry, CacheError, Provenance, ResultCache};
use crate::sources::CacheKey;

/// Process-local result cache
#[derive(Default)]
pub struct MemoryResultCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ResultCache for MemoryResultCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(
        &self,
        key: &CacheKey,
        result: &FetchValue,
        provenance: &Provenance,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry {
            key: key.clone(),
            result: result.clone(),
            provenance: provenance.clone(),
            created_at: Utc::now(),
        };
        self.entries.write().await.insert(key.clone(), entry);
        Ok(())
    }
}

/// Cache that stores nothing; every lookup misses
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopResultCache;

#[async_trait]
impl ResultCache for NoopResultCache {
    async fn get(&self, _key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(None)
    }

    async fn put(
        &self,
        _key: &CacheKey,
        _result: &FetchValue,
        _provenance: &Provenance,
    ) -> Result<(), CacheError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn provenance(query: &str) -> Provenance {
        Provenance::new("custom_alert_filters", "agent_id=001", query)
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let cache = MemoryResultCache::new();
        let key = CacheKey::from_raw("custom_alert_filters-agent_id=001");

        cache
            .put(&key, &FetchValue::from(json!({"x": 1})), &provenance("first"))
            .await
            .unwrap();
        cache
            .put(&key, &FetchValue::from(json!({"x": 2})), &provenance("second"))
            .await
            .unwrap();

        let entry = cache.get(&key).await.unwrap().unwrap();
        assert_eq!(entry.result, FetchValue::from(json!({"x": 2})));
        assert_eq!(entry.provenance.query, "second");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_writers_on_distinct_keys() {
        let cache = Arc::new(MemoryResultCache::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                let key = CacheKey::from_raw(format!("k{}", i));
                cache
                    .put(&key, &FetchValue::from(json!(i)), &provenance("q"))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.len().await, 16);
        let entry = cache.get(&CacheKey::from_raw("k7")).await.unwrap().unwrap();
        assert_eq!(entry.result.as_i64(), Some(7));
    }

    #[tokio::test]
    async fn test_noop_always_misses() {
        let cache = NoopResultCache;
        let key = CacheKey::from_raw("k");
        cache.put(&key, &FetchValue::Null, &provenance("q")).await.unwrap();
        assert!(cache.get(&key).await.unwrap().is_none());
    }
}
