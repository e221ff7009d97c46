//! Orchestrator
//!
//! Runs every registered source once per call: cache lookup, then a live
//! fetch on a miss, then a cache write. Sources are independent; a failure at
//! one is logged and leaves that source out of the aggregate.
//!
//! Up to `max_concurrency` sources are in flight at once. Results are always
//! reported in registry order regardless of completion order.

use futures::stream::{self, StreamExt};
use sdk::errors::EngineError;
use sdk::types::FetchValue;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{Provenance, ResultCache};
use crate::fetch::FetchAdapter;
use crate::sources::{SourceDescriptor, SourceRegistry};

/// Default number of sources fetched concurrently
pub const DEFAULT_MAX_CONCURRENCY: usize = 6;

/// Per-source results of one run, in registry order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateResult {
    entries: Vec<(String, FetchValue)>,
}

impl AggregateResult {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, source: &str, value: FetchValue) {
        self.entries.push((source.to_string(), value));
    }

    pub fn get(&self, source: &str) -> Option<&FetchValue> {
        self.entries
            .iter()
            .find(|(name, _)| name == source)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FetchValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Serialize as a JSON object keyed by source name
    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Serialize for AggregateResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// How one source was resolved during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    /// Served from the cache; no fetch
    Cached,
    /// Fetched live. `cached` is false when the cache write failed.
    Fetched { cached: bool },
    /// Fetch failed; the source is absent from the aggregate
    Failed { reason: String },
}

impl fmt::Display for SourceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceOutcome::Cached => write!(f, "cached"),
            SourceOutcome::Fetched { cached: true } => write!(f, "fetched"),
            SourceOutcome::Fetched { cached: false } => write!(f, "fetched (not cached)"),
            SourceOutcome::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// Aggregate plus the outcome of every registered source
#[derive(Debug, Clone)]
pub struct RunReport {
    pub aggregate: AggregateResult,
    /// One entry per registered source, in registry order
    pub outcomes: Vec<(String, SourceOutcome)>,
}

impl RunReport {
    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, SourceOutcome::Failed { .. }))
            .count()
    }

    pub fn cache_hits(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == SourceOutcome::Cached)
            .count()
    }
}

/// Fans out over the source registry and assembles the aggregate
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<SourceRegistry>,
    adapter: FetchAdapter,
    cache: Arc<dyn ResultCache>,
    max_concurrency: usize,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<SourceRegistry>,
        adapter: FetchAdapter,
        cache: Arc<dyn ResultCache>,
    ) -> Self {
        Self {
            registry,
            adapter,
            cache,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Limit in-flight sources. `1` runs sources strictly one after another.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn adapter(&self) -> &FetchAdapter {
        &self.adapter
    }

    /// Run all sources and return the aggregate
    pub async fn run(&self, query_tag: &str) -> AggregateResult {
        self.run_detailed(query_tag).await.aggregate
    }

    /// Run all sources, keeping the per-source outcome
    pub async fn run_detailed(&self, query_tag: &str) -> RunReport {
        let started = Instant::now();
        info!(
            "Running {} sources (max {} in flight)",
            self.registry.len(),
            self.max_concurrency
        );

        // Futures are built eagerly (they stay lazy until polled) so the
        // returned future is `Send` despite the borrowed sources
        let pending: Vec<_> = self
            .registry
            .list_sources()
            .iter()
            .map(|source| self.resolve_source(source, query_tag))
            .collect();
        let resolved: Vec<(&'static str, Option<FetchValue>, SourceOutcome)> =
            stream::iter(pending)
                .buffered(self.max_concurrency)
                .collect()
                .await;

        let mut aggregate = AggregateResult::new();
        let mut outcomes = Vec::with_capacity(resolved.len());
        for (name, value, outcome) in resolved {
            if let Some(value) = value {
                aggregate.push(name, value);
            }
            outcomes.push((name.to_string(), outcome));
        }

        let report = RunReport {
            aggregate,
            outcomes,
        };
        info!(
            "Run finished in {:?}: {} of {} sources ({} cached, {} failed)",
            started.elapsed(),
            report.aggregate.len(),
            self.registry.len(),
            report.cache_hits(),
            report.failures()
        );
        report
    }

    /// Caller entry point: run all sources and serialize the aggregate.
    ///
    /// `query_text` is recorded as provenance only; it never selects sources.
    pub async fn analyze(&self, query_text: &str) -> Result<String, EngineError> {
        self.run(query_text).await.to_json()
    }

    async fn resolve_source(
        &self,
        source: &SourceDescriptor,
        query_tag: &str,
    ) -> (&'static str, Option<FetchValue>, SourceOutcome) {
        let name = source.name();
        let key = source.cache_key();

        match self.cache.get(&key).await {
            Ok(Some(entry)) => {
                info!("{} served from cache ({})", name, key);
                // Entries may predate the current limits
                let value = entry.result.capped(self.adapter.limits());
                return (name, Some(value), SourceOutcome::Cached);
            }
            Ok(None) => debug!("Cache miss for {}", key),
            Err(e) => warn!("Treating {} as a cache miss: {}", key, e),
        }

        let value = match self.adapter.fetch(name, &source.params).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Source {} failed: {}", name, e);
                return (
                    name,
                    None,
                    SourceOutcome::Failed {
                        reason: e.to_string(),
                    },
                );
            }
        };

        info!("{} fetched", name);
        let provenance = Provenance::new(name, source.params.tag(), query_tag);
        let cached = match self.cache.put(&key, &value, &provenance).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Result for {} not cached: {}", key, e);
                false
            }
        };

        (name, Some(value), SourceOutcome::Fetched { cached })
    }
}
