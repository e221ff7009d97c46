//! Vigil Engine Library
//!
//! Fetches security data from Wazuh, caches it per source and parameters,
//! and aggregates it for a conversational layer. It is used by both the
//! main binary and integration tests.

/// Configuration management module
pub mod config;

/// Secret management module
pub mod secrets;

/// Database persistence module
pub mod db;

/// Source registry and cache keys
pub mod sources;

/// Fetch adapter and Wazuh transport
pub mod fetch;

/// Result cache backends
pub mod cache;

/// Fan-out over all sources
pub mod orchestrator;

/// Tool dispatch for the conversational layer
pub mod tools;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
