use sdk::errors::EngineError;
use sdk::types::{FetchValue, ResultLimits, ToolInput};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::fetch::{FetchError, WazuhClient};
use crate::orchestrator::Orchestrator;
use crate::sources::{SourceKind, SourceParams};

/// Tool that runs every source and returns the aggregate
pub const ANALYZE_TOOL: &str = "analyze_security_issues";

/// Read-only Wazuh calls exposed individually, with descriptions
const WAZUH_TOOLS: [(&str, &str); 7] = [
    ("get_wazuh_rules_summary", "Total number of installed detection rules"),
    ("get_wazuh_weekly_stats", "Manager event statistics for the past week"),
    ("get_wazuh_cluster_nodes", "Nodes of the manager cluster"),
    ("get_wazuh_cluster_health", "Health check of the manager cluster"),
    (
        "search_wazuh_manager_logs",
        "Search manager logs. Arguments: {\"query\": \"text\", \"limit\": 20}",
    ),
    (
        "get_osquery_results",
        "Scheduled osquery results of an agent. Arguments: {\"agent_id\": \"001\"}",
    ),
    ("get_all_agents_hotfixes", "Installed hotfixes of every agent"),
];

/// Keyword routes, checked in order; the first match wins
const ROUTES: [(&[&str], &str); 12] = [
    (&["hotfix", "patch"], "get_all_agents_hotfixes"),
    (&["osquery"], "get_osquery_results"),
    (&["vulnerab", "cve"], "get_wazuh_vulnerabilities"),
    (&["alert"], "custom_alert_filters"),
    (&["process"], "get_wazuh_processes"),
    (&["port", "listening"], "get_wazuh_agent_ports"),
    (&["integrity", "fim", "syscheck"], "custom_fim_queries"),
    (&["cluster health", "healthcheck"], "get_wazuh_cluster_health"),
    (&["cluster", "node"], "get_wazuh_cluster_nodes"),
    (&["rule"], "get_wazuh_rules_summary"),
    (&["weekly", "stats", "statistic"], "get_wazuh_weekly_stats"),
    (&["log"], "get_wazuh_manager_logs"),
];

/// Map a free-text question to the tool best suited to answer it.
///
/// Falls back to the full scan when no keyword matches.
pub fn route_query(text: &str) -> &'static str {
    let text = text.to_lowercase();
    ROUTES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|kw| text.contains(kw)))
        .map(|(_, tool)| *tool)
        .unwrap_or(ANALYZE_TOOL)
}

/// Registry of tools the conversational layer can dispatch.
///
/// The orchestrator backs the full scan and the per-source tools; the Wazuh
/// client backs the extra read-only calls. Only tools whose backing is `Some`
/// are listed in the catalog and available for dispatch.
pub struct ToolRegistry {
    pub orchestrator: Option<Orchestrator>,
    pub wazuh: Option<Arc<WazuhClient>>,
    pub limits: ResultLimits,
}

impl ToolRegistry {
    /// Create an empty registry with no tools enabled.
    pub fn empty() -> Self {
        Self {
            orchestrator: None,
            wazuh: None,
            limits: ResultLimits::default(),
        }
    }

    pub fn new(orchestrator: Orchestrator, wazuh: Option<Arc<WazuhClient>>) -> Self {
        let limits = *orchestrator.adapter().limits();
        Self {
            orchestrator: Some(orchestrator),
            wazuh,
            limits,
        }
    }

    /// Dispatch a tool call by name, parsing arguments from JSON.
    ///
    /// Returns the tool output as a string. Errors are returned as
    /// `"ERROR: ..."` strings so the caller can see them and self-correct.
    pub async fn dispatch(&self, name: &str, arguments_json: &str) -> String {
        debug!("Dispatching tool '{}' with args: {}", name, arguments_json);

        let input = match ToolInput::from_json(name, arguments_json) {
            Ok(input) => input,
            Err(e) => return format!("ERROR: {}", e),
        };

        if name == ANALYZE_TOOL {
            let Some(ref orchestrator) = self.orchestrator else {
                return not_enabled(name);
            };
            let query = input.param_str_opt("query").unwrap_or_default();
            return match orchestrator.analyze(&query).await {
                Ok(json) => json,
                Err(e) => format!("ERROR: {}", e),
            };
        }

        if let Ok(kind) = SourceKind::from_name(name) {
            return self.fetch_source(kind, &input).await;
        }

        if WAZUH_TOOLS.iter().any(|(tool, _)| *tool == name) {
            return self.call_wazuh(name, &input).await;
        }

        warn!("Unknown tool requested: {}", name);
        format!(
            "ERROR: {}. Available tools: {}",
            EngineError::ToolNotFound(name.to_string()),
            self.available_tool_names().join(", ")
        )
    }

    async fn fetch_source(&self, kind: SourceKind, input: &ToolInput) -> String {
        let Some(ref orchestrator) = self.orchestrator else {
            return not_enabled(kind.name());
        };

        let overrides = match input.scalar_params() {
            Ok(overrides) => overrides,
            Err(e) => return format!("ERROR: {}", e),
        };
        let params = match SourceParams::resolve(
            kind,
            overrides.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        ) {
            Ok(params) => params,
            Err(e) => return format!("ERROR: {}", e),
        };

        match orchestrator.adapter().fetch(kind.name(), &params).await {
            Ok(value) => value.to_json_string(),
            Err(e) => {
                if !e.is_caller_error() {
                    warn!("Source {} failed: {}", kind, e);
                }
                format!("ERROR: {}", e)
            }
        }
    }

    async fn call_wazuh(&self, name: &str, input: &ToolInput) -> String {
        let Some(ref wazuh) = self.wazuh else {
            return not_enabled(name);
        };

        let mut limits = self.limits;
        let result: Result<Value, FetchError> = match name {
            "get_wazuh_rules_summary" => wazuh.rules_summary().await,
            "get_wazuh_weekly_stats" => wazuh.weekly_stats().await,
            "get_wazuh_cluster_nodes" => wazuh.cluster_nodes().await,
            "get_wazuh_cluster_health" => wazuh.cluster_health().await,
            "search_wazuh_manager_logs" => {
                let query = input.param_str_opt("query").unwrap_or_default();
                wazuh
                    .search_manager_logs(&query, input.param_i64_opt("limit"))
                    .await
                    .map(|(logs, limit)| {
                        // The requested row count replaces the default item cap
                        limits = ResultLimits::new(limit, self.limits.max_fields);
                        logs
                    })
            }
            "get_osquery_results" => {
                let agent_id = input
                    .param_str_opt("agent_id")
                    .unwrap_or_else(|| "001".to_string());
                wazuh.osquery_results(&agent_id).await
            }
            "get_all_agents_hotfixes" => wazuh.agent_hotfixes().await,
            _ => return format!("ERROR: {}", EngineError::ToolNotFound(name.to_string())),
        };

        match result {
            Ok(value) => FetchValue::from(value).capped(&limits).to_json_string(),
            Err(e) => format!("ERROR: {}", e),
        }
    }

    /// Enabled tools with a one-line description each
    pub fn catalog(&self) -> Vec<(&'static str, &'static str)> {
        catalog_entries(self.orchestrator.is_some(), self.wazuh.is_some())
    }

    /// Every tool a fully configured registry offers. Needs no credentials.
    pub fn full_catalog() -> Vec<(&'static str, &'static str)> {
        catalog_entries(true, true)
    }

    /// Return the names of all currently enabled tools.
    fn available_tool_names(&self) -> Vec<&'static str> {
        self.catalog().into_iter().map(|(name, _)| name).collect()
    }
}

fn catalog_entries(sources: bool, wazuh: bool) -> Vec<(&'static str, &'static str)> {
    let mut tools = Vec::new();
    if sources {
        tools.push((
            ANALYZE_TOOL,
            "Run every source and return the combined findings. Arguments: {\"query\": \"text\"}",
        ));
        tools.extend(SourceKind::ALL.iter().map(|kind| (kind.name(), kind.description())));
    }
    if wazuh {
        tools.extend(WAZUH_TOOLS.iter().copied());
    }
    tools
}

fn not_enabled(name: &str) -> String {
    format!(
        "ERROR: {}",
        EngineError::ToolError(format!("{} tool is not enabled", name))
    )
}
