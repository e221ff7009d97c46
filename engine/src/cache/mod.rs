//! Result Cache
//!
//! Point get/put of normalized fetch results keyed by [`CacheKey`]. The
//! orchestrator receives an `Arc<dyn ResultCache>` at construction, so the
//! backing store is opened once by the caller and shared by every run.
//!
//! Entries never expire. A `put` for an existing key replaces it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sdk::types::FetchValue;
use serde::{Deserialize, Serialize};

use crate::sources::CacheKey;

pub mod memory;
pub mod sqlite;

pub use memory::{MemoryResultCache, NoopResultCache};
pub use sqlite::SqliteResultCache;

/// Errors raised by a cache backend
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache read failed: {0}")]
    Read(String),

    #[error("Cache write failed: {0}")]
    Write(String),
}

/// Which source and query produced a cached result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub source: String,
    pub param_tag: String,
    pub query: String,
}

impl Provenance {
    pub fn new(
        source: impl Into<String>,
        param_tag: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            param_tag: param_tag.into(),
            query: query.into(),
        }
    }
}

/// One cached result with its provenance
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub result: FetchValue,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
}

/// Durable store of fetch results
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Look up `key`. A missing key is `Ok(None)`.
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    /// Store `result` under `key`, replacing any previous entry
    async fn put(
        &self,
        key: &CacheKey,
        result: &FetchValue,
        provenance: &Provenance,
    ) -> Result<(), CacheError>;
}
