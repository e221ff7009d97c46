//! Fetch Adapter
//!
//! Executes the live call for one registered source and turns whatever the
//! transport returned into a size-capped [`FetchValue`]. One call, no retry.
//!
//! The transport is a trait so the orchestrator can be driven by the real
//! Wazuh client or by an in-process stub.

use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::types::{FetchValue, ResultLimits};
use serde_json::Value;
use std::sync::Arc;

use crate::sources::{SourceKind, SourceParams};

pub mod wazuh;

pub use wazuh::WazuhClient;

/// Errors that can occur while fetching one source
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },
}

impl FetchError {
    /// Caller mistakes, as opposed to failures of the live source
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            FetchError::UnknownSource(_) | FetchError::InvalidParameter { .. }
        )
    }
}

impl From<EngineError> for FetchError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::UnknownSource(name) => FetchError::UnknownSource(name),
            EngineError::InvalidParameter { name, reason } => {
                FetchError::InvalidParameter { name, reason }
            }
            other => FetchError::Network(other.to_string()),
        }
    }
}

/// Performs the single external request backing one source
#[async_trait]
pub trait SourceTransport: Send + Sync {
    /// Fetch `kind` with already-validated parameters.
    ///
    /// Returns the response body as JSON. Bodies that are not JSON are
    /// returned as a JSON string.
    async fn call(&self, kind: SourceKind, params: &SourceParams) -> Result<Value, FetchError>;
}

/// Validates, fetches, normalizes and caps results for any registered source
#[derive(Clone)]
pub struct FetchAdapter {
    transport: Arc<dyn SourceTransport>,
    limits: ResultLimits,
}

impl FetchAdapter {
    pub fn new(transport: Arc<dyn SourceTransport>, limits: ResultLimits) -> Self {
        Self { transport, limits }
    }

    pub fn limits(&self) -> &ResultLimits {
        &self.limits
    }

    /// Fetch one source by name.
    ///
    /// The name must belong to the registry and the parameters must satisfy
    /// the source's schema; both are checked here before any request is made.
    pub async fn fetch(
        &self,
        source_name: &str,
        params: &SourceParams,
    ) -> Result<FetchValue, FetchError> {
        let kind = SourceKind::from_name(source_name)?;
        let params = SourceParams::resolve(kind, params.iter())?;

        tracing::debug!("Fetching {} ({})", kind, params.tag());
        let raw = self.transport.call(kind, &params).await?;

        Ok(normalize(raw).capped(&self.limits))
    }
}

/// Convert a transport response into a structured value.
///
/// A string body that is itself JSON is decoded; any other string stays text.
pub fn normalize(raw: Value) -> FetchValue {
    match raw {
        Value::String(text) => FetchValue::from_raw_text(&text),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedTransport {
        response: Value,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SourceTransport for FixedTransport {
        async fn call(&self, _kind: SourceKind, _params: &SourceParams) -> Result<Value, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    fn adapter(response: Value) -> (FetchAdapter, Arc<FixedTransport>) {
        let transport = Arc::new(FixedTransport {
            response,
            calls: AtomicUsize::new(0),
        });
        let adapter = FetchAdapter::new(
            Arc::clone(&transport) as Arc<dyn SourceTransport>,
            ResultLimits::default(),
        );
        (adapter, transport)
    }

    #[tokio::test]
    async fn test_unknown_source_is_rejected_before_transport() {
        let (adapter, transport) = adapter(json!([]));
        let err = adapter
            .fetch("get_wazuh_everything", &SourceParams::default())
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::UnknownSource(_)));
        assert!(err.is_caller_error());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_parameters_rejected_before_transport() {
        let (adapter, transport) = adapter(json!([]));
        let bad = SourceParams::resolve(SourceKind::Ports, [("agent_id", "001")]).unwrap();

        // Ports parameters are not valid for the log source
        let err = adapter.fetch("get_wazuh_manager_logs", &bad).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidParameter { .. }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_caps_large_results() {
        let row: serde_json::Map<String, Value> =
            (0..20).map(|i| (format!("f{}", i), json!(i))).collect();
        let rows: Vec<Value> = (0..1000).map(|_| Value::Object(row.clone())).collect();
        let (adapter, transport) = adapter(Value::Array(rows));

        let params = SourceParams::defaults(SourceKind::Processes).unwrap();
        let value = adapter.fetch("get_wazuh_processes", &params).await.unwrap();

        let items = value.as_sequence().unwrap();
        assert_eq!(items.len(), 10);
        assert!(items.iter().all(|item| item.len() == 6));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unparsable_body_fails_open() {
        let (adapter, _) = adapter(Value::String("<html>maintenance</html>".into()));
        let params = SourceParams::defaults(SourceKind::ManagerLogs).unwrap();

        let value = adapter.fetch("get_wazuh_manager_logs", &params).await.unwrap();
        assert_eq!(value.as_text(), Some("<html>maintenance</html>"));
    }

    #[test]
    fn test_normalize_decodes_json_strings() {
        let value = normalize(Value::String(r#"[{"id": "001"}]"#.into()));
        assert_eq!(value.len(), 1);
        assert_eq!(normalize(json!({"a": 1})).get("a").and_then(FetchValue::as_i64), Some(1));
    }

    #[test]
    fn test_engine_error_conversion() {
        let err: FetchError = EngineError::UnknownSource("x".into()).into();
        assert!(matches!(err, FetchError::UnknownSource(name) if name == "x"));
        let err: FetchError = EngineError::Network("down".into()).into();
        assert!(!err.is_caller_error());
    }
}
