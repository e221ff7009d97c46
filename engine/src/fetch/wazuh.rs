//! Wazuh transport
//!
//! Thin request wrappers over the Wazuh manager REST API (JWT bearer auth)
//! and the Wazuh indexer (OpenSearch, basic auth). Implements
//! [`SourceTransport`] for the registry sources and exposes a handful of
//! extra read-only calls the tool surface offers individually.
//!
//! Every request is made exactly once. A rejected token is dropped so the
//! next call re-authenticates, but the failing call itself is not repeated.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{Client, Response, StatusCode};
use sdk::errors::EngineError;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::sync::Mutex;

use super::{FetchError, SourceTransport};
use crate::config::{Config, WazuhConfig};
use crate::secrets::{scrub_secrets, CredentialStore, SecretString, WazuhCredentials};
use crate::sources::{ParamKind, ParamSpec, SourceKind, SourceParams};

/// Indexer pattern holding per-agent vulnerability states
pub const VULNERABILITY_INDEX: &str = "wazuh-states-vulnerabilities-*";

/// Indexer pattern holding alerts
pub const ALERTS_INDEX: &str = "wazuh-alerts-*";

/// Indexer pattern holding file-integrity events
pub const SYSCHECK_INDEX: &str = "wazuh-syscheck-*";

/// Documents requested per indexer search
const SEARCH_SIZE: u32 = 50;

/// Rows requested per syscollector call
const SYSCOLLECTOR_LIMIT: &str = "50";

/// Log search defaults and bounds
const LOG_SEARCH_DEFAULT_LIMIT: i64 = 20;
const LOG_SEARCH_MAX_LIMIT: i64 = 50;

/// Agents requested when enumerating hotfixes
const AGENT_LIST_LIMIT: &str = "500";

/// Longest error body kept in a [`FetchError::Status`]
const MAX_ERROR_BODY: usize = 512;

/// Client for the Wazuh manager API and indexer
pub struct WazuhClient {
    api_url: String,
    indexer_url: String,
    credentials: WazuhCredentials,
    client: Client,
    token: Mutex<Option<SecretString>>,
}

impl WazuhClient {
    /// Create a client from endpoint configuration and resolved credentials
    pub fn new(config: &WazuhConfig, credentials: WazuhCredentials) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| EngineError::Network(format!("Failed to create HTTP client: {}", e)))?;

        if !config.verify_tls {
            tracing::warn!("TLS certificate verification is disabled for Wazuh endpoints");
        }

        Ok(Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            indexer_url: config.indexer_url.trim_end_matches('/').to_string(),
            credentials,
            client,
            token: Mutex::new(None),
        })
    }

    /// Create a client from the loaded configuration, resolving credentials
    pub fn from_config(config: &Config, store: &CredentialStore) -> Result<Self, EngineError> {
        Self::new(&config.wazuh, store.wazuh_credentials()?)
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn indexer_url(&self) -> &str {
        &self.indexer_url
    }

    /// Obtain a fresh JWT from the manager
    pub async fn authenticate(&self) -> Result<SecretString, FetchError> {
        let url = format!("{}/security/user/authenticate", self.api_url);
        let response = self
            .client
            .post(&url)
            .query(&[("raw", "true")])
            .basic_auth(
                self.credentials.api_user.unsecure(),
                Some(self.credentials.api_password.unsecure()),
            )
            .send()
            .await
            .map_err(|e| map_send_error(e, &self.api_url))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::Authentication(format!(
                "manager rejected credentials ({})",
                status
            )));
        }

        let body = read_text(response).await?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        let token = body.trim();
        if token.is_empty() {
            return Err(FetchError::Authentication(
                "manager returned an empty token".to_string(),
            ));
        }

        tracing::debug!("Authenticated against {}", self.api_url);
        Ok(SecretString::new(token))
    }

    async fn token(&self) -> Result<SecretString, FetchError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let token = self.authenticate().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// GET a manager API path, returning the response body as JSON
    pub async fn api_get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, FetchError> {
        let token = self.token().await?;
        let url = format!("{}{}", self.api_url, path);

        let response = self
            .client
            .get(&url)
            .query(query)
            .bearer_auth(token.unsecure())
            .send()
            .await
            .map_err(|e| map_send_error(e, &self.api_url))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            self.token.lock().await.take();
            return Err(FetchError::Authentication(format!(
                "token rejected for {}",
                path
            )));
        }

        read_json(response).await
    }

    /// Run an OpenSearch query against `index_pattern`
    pub async fn indexer_search(
        &self,
        index_pattern: &str,
        body: &Value,
    ) -> Result<Value, FetchError> {
        let url = format!("{}/{}/_search", self.indexer_url, index_pattern);

        let response = self
            .client
            .post(&url)
            .basic_auth(
                self.credentials.indexer_user.unsecure(),
                Some(self.credentials.indexer_password.unsecure()),
            )
            .json(body)
            .send()
            .await
            .map_err(|e| map_send_error(e, &self.indexer_url))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::Authentication(format!(
                "indexer rejected credentials ({})",
                status
            )));
        }

        read_json(response).await
    }

    /// Total number of installed rules
    pub async fn rules_summary(&self) -> Result<Value, FetchError> {
        let body = self.api_get("/rules", &[("limit", "1".to_string())]).await?;
        let total = body
            .pointer("/data/total_affected_items")
            .and_then(Value::as_u64)
            .ok_or_else(|| FetchError::Status {
                status: 200,
                body: "response has no data.total_affected_items".to_string(),
            })?;
        Ok(json!({ "total_rules": total }))
    }

    /// Manager statistics for the past week
    pub async fn weekly_stats(&self) -> Result<Value, FetchError> {
        Ok(affected_items(self.api_get("/manager/stats/weekly", &[]).await?))
    }

    /// Nodes of the manager cluster
    pub async fn cluster_nodes(&self) -> Result<Value, FetchError> {
        Ok(affected_items(self.api_get("/cluster/nodes", &[]).await?))
    }

    /// Health check of the manager cluster
    pub async fn cluster_health(&self) -> Result<Value, FetchError> {
        Ok(affected_items(self.api_get("/cluster/healthcheck", &[]).await?))
    }

    /// Search manager logs. Returns the rows and the effective limit.
    ///
    /// `limit` defaults to 20; values below 1 fall back to the default and
    /// values above 50 are clamped.
    pub async fn search_manager_logs(
        &self,
        query: &str,
        limit: Option<i64>,
    ) -> Result<(Value, usize), FetchError> {
        let limit = clamp_log_limit(limit);
        let mut params = vec![("limit", limit.to_string())];
        if !query.trim().is_empty() {
            params.push(("q", query.trim().to_string()));
        }

        let body = self.api_get("/manager/logs", &params).await?;
        Ok((affected_items(body), limit as usize))
    }

    /// Scheduled osquery results of one agent
    pub async fn osquery_results(&self, agent_id: &str) -> Result<Value, FetchError> {
        let agent_id = validate_agent_id(agent_id)?;
        Ok(affected_items(
            self.api_get(&format!("/osquery/{}/queries", agent_id), &[])
                .await?,
        ))
    }

    /// Installed hotfixes, keyed by agent id.
    ///
    /// An agent whose hotfix call fails contributes an empty list.
    pub async fn agent_hotfixes(&self) -> Result<Value, FetchError> {
        let agents = affected_items(
            self.api_get("/agents", &[("limit", AGENT_LIST_LIMIT.to_string())])
                .await?,
        );

        let ids: Vec<String> = agents
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|agent| agent.get("id").and_then(Value::as_str))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let per_agent: Vec<(String, Value)> = stream::iter(ids)
            .map(|id| async move {
                let hotfixes = match self
                    .api_get(&format!("/experimental/hotfixes/{}", id), &[])
                    .await
                {
                    Ok(body) => affected_items(body),
                    Err(e) => {
                        tracing::warn!("Hotfix lookup failed for agent {}: {}", id, e);
                        Value::Array(Vec::new())
                    }
                };
                (id, hotfixes)
            })
            .buffered(4)
            .collect()
            .await;

        Ok(Value::Object(per_agent.into_iter().collect::<Map<_, _>>()))
    }
}

#[async_trait]
impl SourceTransport for WazuhClient {
    async fn call(&self, kind: SourceKind, params: &SourceParams) -> Result<Value, FetchError> {
        match kind {
            SourceKind::Vulnerabilities => {
                let body = agent_query(agent_param(params)?, false);
                Ok(hit_sources(
                    self.indexer_search(VULNERABILITY_INDEX, &body).await?,
                ))
            }
            SourceKind::Alerts => {
                let body = agent_query(agent_param(params)?, true);
                Ok(hit_sources(self.indexer_search(ALERTS_INDEX, &body).await?))
            }
            SourceKind::FileIntegrity => {
                let body = agent_query(agent_param(params)?, true);
                Ok(hit_sources(self.indexer_search(SYSCHECK_INDEX, &body).await?))
            }
            SourceKind::Processes => {
                let path = format!("/syscollector/{}/processes", agent_param(params)?);
                let body = self
                    .api_get(&path, &[("limit", SYSCOLLECTOR_LIMIT.to_string())])
                    .await?;
                Ok(affected_items(body))
            }
            SourceKind::Ports => {
                let path = format!("/syscollector/{}/ports", agent_param(params)?);
                let body = self
                    .api_get(&path, &[("limit", SYSCOLLECTOR_LIMIT.to_string())])
                    .await?;
                Ok(affected_items(body))
            }
            SourceKind::ManagerLogs => {
                let limit = params.get("limit").ok_or_else(|| missing("limit"))?;
                let body = self
                    .api_get(
                        "/manager/logs",
                        &[
                            ("limit", limit.to_string()),
                            ("sort", "-timestamp".to_string()),
                        ],
                    )
                    .await?;
                Ok(affected_items(body))
            }
        }
    }
}

fn agent_param(params: &SourceParams) -> Result<&str, FetchError> {
    params.get("agent_id").ok_or_else(|| missing("agent_id"))
}

fn missing(name: &str) -> FetchError {
    FetchError::InvalidParameter {
        name: name.to_string(),
        reason: "required parameter is missing".to_string(),
    }
}

fn validate_agent_id(agent_id: &str) -> Result<String, FetchError> {
    let spec = ParamSpec {
        name: "agent_id",
        kind: ParamKind::Identifier,
        default: None,
    };
    Ok(spec.canonicalize(agent_id)?)
}

fn clamp_log_limit(limit: Option<i64>) -> i64 {
    match limit {
        Some(n) if n <= 0 => LOG_SEARCH_DEFAULT_LIMIT,
        Some(n) => n.min(LOG_SEARCH_MAX_LIMIT),
        None => LOG_SEARCH_DEFAULT_LIMIT,
    }
}

/// OpenSearch query selecting one agent's documents
pub fn agent_query(agent_id: &str, newest_first: bool) -> Value {
    let mut body = json!({
        "size": SEARCH_SIZE,
        "query": {
            "bool": {
                "must": [
                    { "term": { "agent.id": agent_id } }
                ]
            }
        }
    });
    if newest_first {
        body["sort"] = json!([{ "@timestamp": { "order": "desc" } }]);
    }
    body
}

/// Unwrap the `data.affected_items` list of a manager API envelope.
///
/// Anything else is returned unchanged.
pub fn affected_items(body: Value) -> Value {
    match body {
        Value::Object(mut map) => {
            let items = map
                .get_mut("data")
                .and_then(|data| data.get_mut("affected_items"))
                .map(Value::take);
            match items {
                Some(items) => items,
                None => Value::Object(map),
            }
        }
        other => other,
    }
}

/// Extract `_source` documents from an OpenSearch response.
///
/// Responses without `hits.hits` are returned unchanged.
pub fn hit_sources(body: Value) -> Value {
    match body.pointer("/hits/hits").and_then(Value::as_array) {
        Some(hits) => Value::Array(
            hits.iter()
                .map(|hit| hit.get("_source").cloned().unwrap_or_else(|| json!({})))
                .collect(),
        ),
        None => body,
    }
}

fn map_send_error(error: reqwest::Error, target: &str) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout
    } else if error.is_connect() {
        FetchError::Network(format!("Cannot connect to {}", target))
    } else {
        FetchError::Network(scrub_secrets(&error.to_string()))
    }
}

fn status_error(status: StatusCode, body: &str) -> FetchError {
    let mut body = scrub_secrets(body.trim());
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    FetchError::Status {
        status: status.as_u16(),
        body,
    }
}

async fn read_text(response: Response) -> Result<String, FetchError> {
    response.text().await.map_err(|e| {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(format!("Failed to read response body: {}", scrub_secrets(&e.to_string())))
        }
    })
}

/// Read a response body as JSON, keeping non-JSON bodies as a string
async fn read_json(response: Response) -> Result<Value, FetchError> {
    let status = response.status();
    let text = read_text(response).await?;

    if !status.is_success() {
        return Err(status_error(status, &text));
    }

    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}
