//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - analyze: run every source and print the aggregate
//! - sources: list the registry with cache keys
//! - tool / tools: dispatch one tool, list the catalog
//! - route: show which tool a question maps to
//! - cache list / show: inspect persisted results
//!
//! Handlers that need the cache open the database once and close it before
//! returning, whatever the outcome of the command. A cache that cannot be
//! opened or closed never fails a fetch command; it only costs reuse.

use anyhow::{Context, Result};
use sdk::errors::{EngineError, VigilErrorExt};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{NoopResultCache, ResultCache, SqliteResultCache};
use crate::config::Config;
use crate::db::Database;
use crate::fetch::{FetchAdapter, SourceTransport, WazuhClient};
use crate::orchestrator::Orchestrator;
use crate::secrets::{CredentialStore, KEYRING_SERVICE};
use crate::sources::{CacheKey, SourceRegistry};
use crate::tools::{route_query, ToolRegistry};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Run every source and print the aggregate
pub async fn handle_analyze(query: String, config: &Config, format: OutputFormat) -> Result<()> {
    let database = open_cache_db(config).await;

    let outcome = async {
        let (orchestrator, _) = build_orchestrator(config, cache_for(database.as_ref()))?;
        let report = orchestrator.run_detailed(&query).await;

        match format {
            OutputFormat::Text => {
                if report.outcomes.is_empty() {
                    println!("No sources registered");
                }
                for (name, outcome) in &report.outcomes {
                    println!("{} [{}]", name, outcome);
                    if let Some(value) = report.aggregate.get(name) {
                        let pretty = serde_json::to_string_pretty(value)?;
                        for line in pretty.lines() {
                            println!("    {}", line);
                        }
                    }
                    println!();
                }
                println!(
                    "{} of {} sources returned data ({} from cache)",
                    report.aggregate.len(),
                    report.outcomes.len(),
                    report.cache_hits()
                );
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&report.aggregate)?);
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    close_cache_db(database).await;
    outcome
}

/// List registered sources
pub async fn handle_sources(config: &Config, format: OutputFormat) -> Result<()> {
    let registry = SourceRegistry::from_config(&config.sources)?;

    match format {
        OutputFormat::Text => {
            println!("Sources ({}):", registry.len());
            println!();
            for source in registry.list_sources() {
                println!("  {}", source.name());
                println!("    {}", source.kind.description());
                println!("    Cache key: {}", source.cache_key());
            }
        }
        OutputFormat::Json => {
            let sources: Vec<Value> = registry
                .list_sources()
                .iter()
                .map(|source| {
                    let params: serde_json::Map<String, Value> = source
                        .params
                        .iter()
                        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                        .collect();
                    json!({
                        "name": source.name(),
                        "description": source.kind.description(),
                        "params": params,
                        "cache_key": source.cache_key().as_str(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json!({ "sources": sources }))?);
        }
    }

    Ok(())
}

/// Dispatch one tool and print its output
pub async fn handle_tool(
    name: String,
    args: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let database = open_cache_db(config).await;

    let outcome = async {
        let (orchestrator, client) = build_orchestrator(config, cache_for(database.as_ref()))?;
        let tools = ToolRegistry::new(orchestrator, Some(client));
        let output = tools.dispatch(&name, &args).await;

        match format {
            OutputFormat::Text => println!("{}", output),
            OutputFormat::Json => {
                let parsed = serde_json::from_str::<Value>(&output)
                    .unwrap_or_else(|_| Value::String(output.clone()));
                let body = json!({
                    "tool": name,
                    "ok": !output.starts_with("ERROR:"),
                    "output": parsed,
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    close_cache_db(database).await;
    outcome
}

/// List the tools available for dispatch
pub fn handle_tools(format: OutputFormat) -> Result<()> {
    let catalog = ToolRegistry::full_catalog();

    match format {
        OutputFormat::Text => {
            println!("Available tools ({}):", catalog.len());
            println!();
            for (name, description) in &catalog {
                println!("  {}", name);
                println!("    {}", description);
            }
        }
        OutputFormat::Json => {
            let tools: Vec<Value> = catalog
                .iter()
                .map(|(name, description)| json!({ "name": name, "description": description }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&json!({ "tools": tools }))?);
        }
    }

    Ok(())
}

/// Show the routed tool for a question
pub fn handle_route(query: String, format: OutputFormat) -> Result<()> {
    let tool = route_query(&query);
    match format {
        OutputFormat::Text => println!("{}", tool),
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "query": query, "tool": tool }))?
            );
        }
    }
    Ok(())
}

/// List cached entries, newest first
pub async fn handle_cache_list(limit: i64, config: &Config, format: OutputFormat) -> Result<()> {
    let database = open_db(config).await?;
    let cache = SqliteResultCache::new(database.results());
    let listed = cache.list(limit).await;
    let total = cache.count().await;
    database.close().await?;
    let entries = listed.context("Failed to list cache entries")?;
    let total = total.context("Failed to count cache entries")?;

    match format {
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No cached results");
                return Ok(());
            }

            println!("Cached results ({} of {}):", entries.len(), total);
            println!();
            for entry in &entries {
                println!("Key: {}", entry.key);
                println!("  Source: {}", entry.provenance.source);
                println!("  Query: {}", entry.provenance.query);
                println!("  Items: {}", entry.result.len());
                println!("  Created: {}", entry.created_at.format("%Y-%m-%d %H:%M:%S"));
                println!();
            }
        }
        OutputFormat::Json => {
            let rows: Vec<Value> = entries
                .iter()
                .map(|entry| {
                    json!({
                        "key": entry.key.as_str(),
                        "source": entry.provenance.source,
                        "params": entry.provenance.param_tag,
                        "query": entry.provenance.query,
                        "created_at": entry.created_at.timestamp(),
                    })
                })
                .collect();
            let output = json!({
                "entries": rows,
                "count": entries.len(),
                "total": total,
                "limit": limit
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Show one cached entry
pub async fn handle_cache_show(key: String, config: &Config, format: OutputFormat) -> Result<()> {
    let database = open_db(config).await?;
    let cache = SqliteResultCache::new(database.results());
    let found = cache.get(&CacheKey::from_raw(key.as_str())).await;
    database.close().await?;

    let entry = found
        .context("Failed to read cache entry")?
        .with_context(|| format!("No cache entry for '{}'", key))?;

    match format {
        OutputFormat::Text => {
            println!("Key: {}", entry.key);
            println!("  Source: {}", entry.provenance.source);
            println!("  Params: {}", entry.provenance.param_tag);
            println!("  Query: {}", entry.provenance.query);
            println!("  Created: {}", entry.created_at.format("%Y-%m-%d %H:%M:%S"));
            println!();
            println!("{}", serde_json::to_string_pretty(&entry.result)?);
        }
        OutputFormat::Json => {
            let output = json!({
                "key": entry.key.as_str(),
                "source": entry.provenance.source,
                "params": entry.provenance.param_tag,
                "query": entry.provenance.query,
                "created_at": entry.created_at.timestamp(),
                "result": entry.result,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Wire the registry, the Wazuh transport and `cache` into an orchestrator
pub fn build_orchestrator(
    config: &Config,
    cache: Arc<dyn ResultCache>,
) -> Result<(Orchestrator, Arc<WazuhClient>)> {
    let registry = Arc::new(SourceRegistry::from_config(&config.sources)?);
    let store = CredentialStore::new(KEYRING_SERVICE);
    let client = Arc::new(WazuhClient::from_config(config, &store)?);

    let adapter = FetchAdapter::new(
        Arc::clone(&client) as Arc<dyn SourceTransport>,
        config.limits,
    );
    let orchestrator = Orchestrator::new(registry, adapter, cache)
        .with_max_concurrency(config.orchestrator.max_concurrency);

    Ok((orchestrator, client))
}

fn cache_for(database: Option<&Database>) -> Arc<dyn ResultCache> {
    match database {
        Some(db) => Arc::new(SqliteResultCache::new(db.results())),
        None => Arc::new(NoopResultCache),
    }
}

async fn open_db(config: &Config) -> Result<Database, EngineError> {
    Database::new(&config.cache_path())
        .await
        .map_err(|e| EngineError::Database(format!("{:#}", e)))
}

/// Open the result cache, or `None` to run uncached
async fn open_cache_db(config: &Config) -> Option<Database> {
    if !config.cache.enabled {
        info!("Result cache disabled; every source will be fetched live");
        return None;
    }
    match open_db(config).await {
        Ok(database) => Some(database),
        Err(e) => {
            warn!("{}; running without the result cache ({})", e, e.user_hint());
            None
        }
    }
}

async fn close_cache_db(database: Option<Database>) {
    if let Some(database) = database {
        if let Err(e) = database.close().await {
            warn!("Result cache not closed cleanly: {:#}", e);
        }
    }
}
