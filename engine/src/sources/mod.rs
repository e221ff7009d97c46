//! Source Registry
//!
//! The fixed, ordered set of data sources one aggregate run covers. Each
//! source has a typed parameter schema; parameters are resolved once at
//! start-up (defaults applied, overrides validated) and never change after.
//!
//! Registry order is the order sources are fetched, cached and reported in.

use regex::Regex;
use sdk::errors::EngineError;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::OnceLock;

/// One registered data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Vulnerability states of one agent (indexer)
    Vulnerabilities,
    /// Latest alerts of one agent (indexer)
    Alerts,
    /// Running processes of one agent (syscollector)
    Processes,
    /// Open ports of one agent (syscollector)
    Ports,
    /// File-integrity events of one agent (indexer)
    FileIntegrity,
    /// Latest manager log lines
    ManagerLogs,
}

impl SourceKind {
    /// All sources, in registry order
    pub const ALL: [SourceKind; 6] = [
        SourceKind::Vulnerabilities,
        SourceKind::Alerts,
        SourceKind::Processes,
        SourceKind::Ports,
        SourceKind::FileIntegrity,
        SourceKind::ManagerLogs,
    ];

    /// Stable public name, also the tool name the conversational layer uses
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Vulnerabilities => "get_wazuh_vulnerabilities",
            SourceKind::Alerts => "custom_alert_filters",
            SourceKind::Processes => "get_wazuh_processes",
            SourceKind::Ports => "get_wazuh_agent_ports",
            SourceKind::FileIntegrity => "custom_fim_queries",
            SourceKind::ManagerLogs => "get_wazuh_manager_logs",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SourceKind::Vulnerabilities => "Known vulnerabilities detected on an agent",
            SourceKind::Alerts => "Most recent security alerts raised for an agent",
            SourceKind::Processes => "Processes running on an agent",
            SourceKind::Ports => "Network ports open on an agent",
            SourceKind::FileIntegrity => "Most recent file-integrity monitoring events for an agent",
            SourceKind::ManagerLogs => "Most recent Wazuh manager log entries",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, EngineError> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| EngineError::UnknownSource(name.to_string()))
    }

    /// Parameter schema, in canonical order
    pub fn param_specs(&self) -> &'static [ParamSpec] {
        match self {
            SourceKind::ManagerLogs => &LOG_PARAMS,
            _ => &AGENT_PARAMS,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value domain of one parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// 1-64 characters of `[A-Za-z0-9_-]`
    Identifier,
    /// Decimal integer within `min..=max`, stored without leading zeros
    Integer { min: u32, max: u32 },
}

/// Schema entry for one source parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    /// Value used when none is supplied. `None` makes the parameter required.
    pub default: Option<&'static str>,
}

impl ParamSpec {
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }

    /// Validate a raw value and return its canonical form
    pub fn canonicalize(&self, raw: &str) -> Result<String, EngineError> {
        let value = raw.trim();
        match self.kind {
            ParamKind::Identifier => {
                if identifier_pattern().is_match(value) {
                    Ok(value.to_string())
                } else {
                    Err(self.invalid(format!(
                        "'{}' must be 1-64 characters of letters, digits, '_' or '-'",
                        raw
                    )))
                }
            }
            ParamKind::Integer { min, max } => {
                let parsed: u32 = value
                    .parse()
                    .map_err(|_| self.invalid(format!("'{}' is not an integer", raw)))?;
                if parsed < min || parsed > max {
                    return Err(self.invalid(format!(
                        "{} is outside {}..={}",
                        parsed, min, max
                    )));
                }
                Ok(parsed.to_string())
            }
        }
    }

    fn invalid(&self, reason: String) -> EngineError {
        EngineError::InvalidParameter {
            name: self.name.to_string(),
            reason,
        }
    }
}

static AGENT_PARAMS: [ParamSpec; 1] = [ParamSpec {
    name: "agent_id",
    kind: ParamKind::Identifier,
    default: Some("001"),
}];

static LOG_PARAMS: [ParamSpec; 1] = [ParamSpec {
    name: "limit",
    kind: ParamKind::Integer { min: 1, max: 5000 },
    default: Some("50"),
}];

static IDENTIFIER_PATTERN: OnceLock<Regex> = OnceLock::new();

fn identifier_pattern() -> &'static Regex {
    IDENTIFIER_PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("Invalid identifier pattern")
    })
}

/// Resolved, validated parameters of one source, in schema order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceParams(Vec<(String, String)>);

impl SourceParams {
    /// Resolve parameters for `kind` from raw `(name, value)` overrides.
    ///
    /// Defaults fill unspecified parameters. Unknown names, missing required
    /// parameters and invalid values are rejected.
    pub fn resolve<'a, I>(kind: SourceKind, overrides: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let specs = kind.param_specs();
        let mut supplied: BTreeMap<&str, &str> = BTreeMap::new();

        for (name, value) in overrides {
            if !specs.iter().any(|spec| spec.name == name) {
                return Err(EngineError::InvalidParameter {
                    name: name.to_string(),
                    reason: format!("not a parameter of {}", kind.name()),
                });
            }
            supplied.insert(name, value);
        }

        let mut resolved = Vec::with_capacity(specs.len());
        for spec in specs {
            let raw = match (supplied.get(spec.name), spec.default) {
                (Some(value), _) => *value,
                (None, Some(default)) => default,
                (None, None) => {
                    return Err(EngineError::InvalidParameter {
                        name: spec.name.to_string(),
                        reason: "required parameter is missing".to_string(),
                    })
                }
            };
            resolved.push((spec.name.to_string(), spec.canonicalize(raw)?));
        }

        Ok(Self(resolved))
    }

    /// Defaults for `kind`
    pub fn defaults(kind: SourceKind) -> Result<Self, EngineError> {
        Self::resolve(kind, std::iter::empty())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `name=value` pairs joined with `&`, in schema order
    pub fn tag(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Deterministic cache identifier for one (source, parameters) pair.
///
/// Canonical values never contain `=` or `&`, so distinct parameter values
/// always produce distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(source: &str, params: &SourceParams) -> Self {
        if params.is_empty() {
            Self(source.to_string())
        } else {
            Self(format!("{}-{}", source, params.tag()))
        }
    }

    /// Wrap an already-formatted key (e.g. typed by a user)
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One registered source with its resolved parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub kind: SourceKind,
    pub params: SourceParams,
}

impl SourceDescriptor {
    pub fn new(kind: SourceKind, params: SourceParams) -> Self {
        Self { kind, params }
    }

    pub fn with_defaults(kind: SourceKind) -> Result<Self, EngineError> {
        Ok(Self::new(kind, SourceParams::defaults(kind)?))
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(self.name(), &self.params)
    }
}

/// Ordered, immutable set of sources
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<SourceDescriptor>,
}

impl SourceRegistry {
    /// Build a registry from explicit descriptors, rejecting duplicates
    pub fn new(sources: Vec<SourceDescriptor>) -> Result<Self, EngineError> {
        let mut seen = HashSet::new();
        for source in &sources {
            if !seen.insert(source.kind) {
                return Err(EngineError::DuplicateSource(source.name().to_string()));
            }
        }
        Ok(Self { sources })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Every source with default parameters
    pub fn with_defaults() -> Result<Self, EngineError> {
        Self::from_config(&BTreeMap::new())
    }

    /// Every source, with per-source overrides from configuration.
    ///
    /// An override section for an unknown source is a configuration error.
    pub fn from_config(
        overrides: &BTreeMap<String, BTreeMap<String, String>>,
    ) -> Result<Self, EngineError> {
        for name in overrides.keys() {
            SourceKind::from_name(name)?;
        }

        let sources = SourceKind::ALL
            .iter()
            .map(|kind| {
                let params = match overrides.get(kind.name()) {
                    Some(values) => SourceParams::resolve(
                        *kind,
                        values.iter().map(|(k, v)| (k.as_str(), v.as_str())),
                    )?,
                    None => SourceParams::defaults(*kind)?,
                };
                Ok(SourceDescriptor::new(*kind, params))
            })
            .collect::<Result<Vec<_>, EngineError>>()?;

        Self::new(sources)
    }

    /// Registered sources, in registry order
    pub fn list_sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    pub fn get(&self, name: &str) -> Option<&SourceDescriptor> {
        self.sources.iter().find(|source| source.name() == name)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_order_is_stable() {
        let registry = SourceRegistry::with_defaults().unwrap();
        let names: Vec<&str> = registry.list_sources().iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec![
                "get_wazuh_vulnerabilities",
                "custom_alert_filters",
                "get_wazuh_processes",
                "get_wazuh_agent_ports",
                "custom_fim_queries",
                "get_wazuh_manager_logs",
            ]
        );
    }

    #[test]
    fn test_default_cache_keys() {
        let registry = SourceRegistry::with_defaults().unwrap();
        assert_eq!(
            registry.get("get_wazuh_processes").unwrap().cache_key().as_str(),
            "get_wazuh_processes-agent_id=001"
        );
        assert_eq!(
            registry.get("get_wazuh_manager_logs").unwrap().cache_key().as_str(),
            "get_wazuh_manager_logs-limit=50"
        );
    }

    #[test]
    fn test_from_name_unknown() {
        let err = SourceKind::from_name("get_wazuh_everything").unwrap_err();
        assert!(matches!(err, EngineError::UnknownSource(name) if name == "get_wazuh_everything"));
    }

    #[test]
    fn test_overrides_apply() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "get_wazuh_agent_ports".to_string(),
            BTreeMap::from([("agent_id".to_string(), "042".to_string())]),
        );
        let registry = SourceRegistry::from_config(&overrides).unwrap();

        let ports = registry.get("get_wazuh_agent_ports").unwrap();
        assert_eq!(ports.params.get("agent_id"), Some("042"));
        // Other sources keep their defaults
        let procs = registry.get("get_wazuh_processes").unwrap();
        assert_eq!(procs.params.get("agent_id"), Some("001"));
    }

    #[test]
    fn test_override_for_unknown_source_fails() {
        let mut overrides = BTreeMap::new();
        overrides.insert("not_a_source".to_string(), BTreeMap::new());
        assert!(matches!(
            SourceRegistry::from_config(&overrides),
            Err(EngineError::UnknownSource(_))
        ));
    }

    #[test]
    fn test_unknown_parameter_rejected() {
        let err = SourceParams::resolve(SourceKind::Processes, [("limit", "5")]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter { name, .. } if name == "limit"));
    }

    #[test]
    fn test_identifier_validation() {
        assert!(SourceParams::resolve(SourceKind::Alerts, [("agent_id", "agent-7_b")]).is_ok());
        assert!(SourceParams::resolve(SourceKind::Alerts, [("agent_id", "")]).is_err());
        assert!(SourceParams::resolve(SourceKind::Alerts, [("agent_id", "1 OR 1=1")]).is_err());
        assert!(SourceParams::resolve(SourceKind::Alerts, [("agent_id", "a&b")]).is_err());
    }

    #[test]
    fn test_integer_canonicalized_and_bounded() {
        let params = SourceParams::resolve(SourceKind::ManagerLogs, [("limit", " 050 ")]).unwrap();
        assert_eq!(params.get("limit"), Some("50"));

        assert!(SourceParams::resolve(SourceKind::ManagerLogs, [("limit", "0")]).is_err());
        assert!(SourceParams::resolve(SourceKind::ManagerLogs, [("limit", "5001")]).is_err());
        assert!(SourceParams::resolve(SourceKind::ManagerLogs, [("limit", "many")]).is_err());
    }

    #[test]
    fn test_duplicate_source_rejected() {
        let a = SourceDescriptor::with_defaults(SourceKind::Ports).unwrap();
        let err = SourceRegistry::new(vec![a.clone(), a]).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateSource(_)));
    }

    #[test]
    fn test_empty_registry() {
        let registry = SourceRegistry::empty();
        assert!(registry.is_empty());
        assert!(registry.list_sources().is_empty());
    }

    #[test]
    fn test_required_flag_follows_default() {
        for kind in SourceKind::ALL {
            for spec in kind.param_specs() {
                assert!(!spec.is_required(), "{} has a default", spec.name);
            }
        }
    }
}
