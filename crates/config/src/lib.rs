//! Configuration loading, validation, and management for threadloom.
//!
//! Loads configuration from `~/.threadloom/config.toml` (or an explicit
//! path) with environment variable overrides. Validates all settings at
//! startup.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Tool names the registry knows how to build.
pub const KNOWN_TOOLS: &[&str] = &["web_search", "url_fetch", "code_exec"];

/// System paths a confined code_exec snippet may read.
pub const DEFAULT_EXEC_READ_PATHS: &[&str] = &[
    "/usr",
    "/lib",
    "/lib64",
    "/lib32",
    "/bin",
    "/sbin",
    "/etc/ld.so.cache",
    "/etc/ld.so.conf",
    "/etc/ld.so.conf.d",
    "/etc/alternatives",
    "/etc/localtime",
    "/dev/urandom",
    "/dev/random",
];

/// The root configuration structure.
///
/// Maps directly to `~/.threadloom/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_provider")]
    pub default_provider: String,

    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_max_tokens: Option<u32>,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub turn: TurnConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("gateway", &self.gateway)
            .field("store", &self.store)
            .field("turn", &self.turn)
            .field("tools", &self.tools)
            .field("providers", &self.providers)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Models advertised for this provider when the backend can't list them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("models", &self.models)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Bearer token → owner id. Empty means every caller is the local identity.
    #[serde(default)]
    pub bearer_tokens: BTreeMap<String, String>,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_port() -> u16 {
    42800
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_max_body_bytes() -> usize {
    1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            bearer_tokens: BTreeMap::new(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("port", &self.port)
            .field("host", &self.host)
            .field("bearer_tokens", &format!("[{} REDACTED]", self.bearer_tokens.len()))
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "sqlite" or "memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// SQLite database path; defaults to `~/.threadloom/threads.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_store_backend() -> String {
    "sqlite".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

impl StoreConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("threads.db"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Maximum tool-call iterations per turn
    #[serde(default = "default_tool_budget")]
    pub tool_budget: u32,

    /// Overall turn deadline; unset means no deadline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Capacity of the event channel between orchestrator and encoder
    #[serde(default = "default_stream_capacity")]
    pub stream_capacity: usize,
}

fn default_tool_budget() -> u32 {
    5
}
fn default_system_prompt() -> String {
    "You are a helpful AI assistant with access to various tools. \
     Always strive to provide accurate and helpful information."
        .into()
}
fn default_stream_capacity() -> usize {
    1
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            tool_budget: default_tool_budget(),
            deadline_secs: None,
            system_prompt: default_system_prompt(),
            stream_capacity: default_stream_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Which tools to register
    #[serde(default = "default_enabled_tools")]
    pub enabled: Vec<String>,

    /// Per-invocation timeout
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_search_endpoint")]
    pub search_endpoint: String,

    #[serde(default = "default_search_max_results")]
    pub search_max_results: usize,

    #[serde(default = "default_fetch_max_bytes")]
    pub fetch_max_bytes: usize,

    /// URL prefixes url_fetch may reach. Empty = any public URL.
    #[serde(default)]
    pub fetch_allowed_endpoints: Vec<String>,

    /// Permit loopback/private targets (local testing only)
    #[serde(default)]
    pub fetch_allow_private: bool,

    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    #[serde(default = "default_interpreter_args")]
    pub interpreter_args: Vec<String>,

    #[serde(default = "default_exec_max_output_bytes")]
    pub exec_max_output_bytes: usize,

    /// Restrict snippets to their working directory and `exec_read_paths`
    #[serde(default = "default_true")]
    pub exec_confine: bool,

    /// Read-only paths for confined snippets; the interpreter's own prefix is always added
    #[serde(default = "default_exec_read_paths")]
    pub exec_read_paths: Vec<String>,
}

fn default_enabled_tools() -> Vec<String> {
    KNOWN_TOOLS.iter().map(|s| s.to_string()).collect()
}
fn default_tool_timeout_secs() -> u64 {
    20
}
fn default_search_endpoint() -> String {
    "https://api.duckduckgo.com/".into()
}
fn default_search_max_results() -> usize {
    5
}
fn default_fetch_max_bytes() -> usize {
    64 * 1024
}
fn default_interpreter() -> String {
    "python3".into()
}
fn default_interpreter_args() -> Vec<String> {
    vec!["-I".into()]
}
fn default_exec_max_output_bytes() -> usize {
    16 * 1024
}
fn default_true() -> bool {
    true
}
fn default_exec_read_paths() -> Vec<String> {
    DEFAULT_EXEC_READ_PATHS.iter().map(|s| s.to_string()).collect()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_tools(),
            timeout_secs: default_tool_timeout_secs(),
            search_endpoint: default_search_endpoint(),
            search_max_results: default_search_max_results(),
            fetch_max_bytes: default_fetch_max_bytes(),
            fetch_allowed_endpoints: Vec::new(),
            fetch_allow_private: false,
            interpreter: default_interpreter(),
            interpreter_args: default_interpreter_args(),
            exec_max_output_bytes: default_exec_max_output_bytes(),
            exec_confine: true,
            exec_read_paths: default_exec_read_paths(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.threadloom/config.toml).
    ///
    /// Environment overrides, highest priority first:
    /// - `THREADLOOM_API_KEY`, then `OPENAI_API_KEY` (only if no key in file)
    /// - `THREADLOOM_PROVIDER`, `THREADLOOM_MODEL`
    /// - `THREADLOOM_DB`, `THREADLOOM_PORT`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Load from `path` if given, else from the default location, then apply env.
    pub fn load_with(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| Self::config_dir().join("config.toml"));
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if self.api_key.is_none() {
            self.api_key = std::env::var("THREADLOOM_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }
        if let Ok(provider) = std::env::var("THREADLOOM_PROVIDER") {
            self.default_provider = provider;
        }
        if let Ok(model) = std::env::var("THREADLOOM_MODEL") {
            self.default_model = model;
        }
        if let Ok(db) = std::env::var("THREADLOOM_DB") {
            self.store.path = Some(PathBuf::from(db));
        }
        if let Ok(port) = std::env::var("THREADLOOM_PORT") {
            self.gateway.port = port.parse().map_err(|_| {
                ConfigError::ValidationError(format!("THREADLOOM_PORT is not a port: {port}"))
            })?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".threadloom")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_model.trim().is_empty() {
            return Err(ConfigError::ValidationError("default_model must not be empty".into()));
        }
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.gateway.port == 0 {
            return Err(ConfigError::ValidationError("gateway.port must be non-zero".into()));
        }
        if self.turn.tool_budget > 100 {
            return Err(ConfigError::ValidationError(
                "turn.tool_budget must be at most 100".into(),
            ));
        }
        if self.turn.deadline_secs == Some(0) {
            return Err(ConfigError::ValidationError(
                "turn.deadline_secs must be positive when set".into(),
            ));
        }
        if self.turn.stream_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "turn.stream_capacity must be at least 1".into(),
            ));
        }
        if self.tools.timeout_secs == 0 {
            return Err(ConfigError::ValidationError("tools.timeout_secs must be positive".into()));
        }
        if self.tools.fetch_max_bytes == 0 || self.tools.exec_max_output_bytes == 0 {
            return Err(ConfigError::ValidationError("tool output caps must be positive".into()));
        }
        if let Some(unknown) = self.tools.enabled.iter().find(|t| !KNOWN_TOOLS.contains(&t.as_str())) {
            return Err(ConfigError::ValidationError(format!("unknown tool in tools.enabled: {unknown}")));
        }
        if !matches!(self.store.backend.as_str(), "sqlite" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "unknown store backend: {}",
                self.store.backend
            )));
        }
        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// The default config rendered as TOML.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: None,
            gateway: GatewayConfig::default(),
            store: StoreConfig::default(),
            turn: TurnConfig::default(),
            tools: ToolsConfig::default(),
            providers: HashMap::new(),
        }
    }
}

fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.turn.tool_budget, 5);
        assert_eq!(config.turn.stream_capacity, 1);
        assert_eq!(config.tools.enabled.len(), 3);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.gateway.port, config.gateway.port);
        assert_eq!(parsed.turn.system_prompt, config.turn.system_prompt);
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_provider, "openai");
    }

    #[test]
    fn load_from_file_with_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
default_model = "llama3"

[gateway]
port = 9000

[gateway.bearer_tokens]
"secret-token" = "alice"

[turn]
tool_budget = 2
deadline_secs = 30

[tools]
enabled = ["web_search"]
fetch_max_bytes = 1024
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.default_model, "llama3");
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.gateway.bearer_tokens.get("secret-token").map(String::as_str), Some("alice"));
        assert_eq!(config.turn.tool_budget, 2);
        assert_eq!(config.turn.deadline_secs, Some(30));
        assert_eq!(config.tools.enabled, vec!["web_search".to_string()]);
        assert_eq!(config.tools.timeout_secs, 20);
        assert!(config.tools.exec_confine);
        assert!(config.tools.exec_read_paths.iter().any(|p| p == "/usr"));
    }

    #[test]
    fn exec_confinement_can_be_tuned() {
        let config: AppConfig = toml::from_str(
            r#"
[tools]
exec_confine = false
exec_read_paths = ["/opt/runtime"]
"#,
        )
        .unwrap();
        assert!(!config.tools.exec_confine);
        assert_eq!(config.tools.exec_read_paths, vec!["/opt/runtime".to_string()]);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_model = [").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn unknown_tool_rejected() {
        let mut config = AppConfig::default();
        config.tools.enabled.push("translate".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("translate"));
    }

    #[test]
    fn invalid_limits_rejected() {
        let mut config = AppConfig::default();
        config.turn.stream_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.turn.tool_budget = 1000;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.store.backend = "postgres".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_tool_budget_is_allowed() {
        let mut config = AppConfig::default();
        config.turn.tool_budget = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = AppConfig::default();
        config.api_key = Some("sk-very-secret".into());
        config.gateway.bearer_tokens.insert("tok-secret".into(), "alice".into());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-very-secret"));
        assert!(!rendered.contains("tok-secret"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn explicit_store_path_wins() {
        let config = StoreConfig {
            backend: "sqlite".into(),
            path: Some(PathBuf::from("/var/lib/threadloom.db")),
        };
        assert_eq!(config.resolved_path(), PathBuf::from("/var/lib/threadloom.db"));
    }
}
