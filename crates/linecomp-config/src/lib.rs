use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const LINECOMP_DIR_NAME: &str = ".linecomp";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STATE_FILE_NAME: &str = "state.json";
pub const DEFAULT_GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_OLLAMA_ENDPOINT: &str = "http://127.0.0.1:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "qwen2.5-coder:7b";
pub const DEFAULT_MARKER: &str = "/*@@*/";
pub const DEFAULT_IMPLEMENTATION_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_IMPLEMENTATION_CONCURRENCY: usize = 16;
pub const DEFAULT_ANCHOR_LOOKBACK_LINES: usize = 3;
pub const DEFAULT_FALLBACK_RADIUS_LINES: usize = 10;
pub const DEFAULT_BACKEND_BIND: &str = "127.0.0.1:7524";
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:7524";
pub const DEFAULT_BACKEND_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_READER_ENDPOINT: &str = "https://r.jina.ai/";
pub const DEFAULT_READER_API_KEY_ENV: &str = "JINA_API_KEY";
pub const DEFAULT_READER_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompletionProviderKind {
    #[default]
    Auto,
    Mock,
    Gemini,
    Ollama,
}

impl CompletionProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Mock => "mock",
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
        }
    }
}

impl std::str::FromStr for CompletionProviderKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "auto" => Ok(Self::Auto),
            "mock" => Ok(Self::Mock),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(format!(
                "invalid provider '{other}', expected one of: auto, mock, gemini, ollama"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LinecompConfig {
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub reader: ReaderConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default)]
    pub provider: CompletionProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: CompletionProviderKind::Auto,
            model: None,
            endpoint: None,
            api_key_env: default_api_key_env(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_marker")]
    pub marker: String,
    #[serde(default = "default_implementation_timeout_ms")]
    pub implementation_timeout_ms: u64,
    #[serde(default = "default_implementation_concurrency")]
    pub implementation_concurrency: usize,
    #[serde(default = "default_anchor_lookback_lines")]
    pub anchor_lookback_lines: usize,
    #[serde(default = "default_fallback_radius_lines")]
    pub fallback_radius_lines: usize,
    #[serde(default)]
    pub expand_to_class: bool,
    #[serde(default)]
    pub dedupe_implementations: bool,
    #[serde(default = "default_builtin_path_segments")]
    pub builtin_path_segments: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            implementation_timeout_ms: DEFAULT_IMPLEMENTATION_TIMEOUT_MS,
            implementation_concurrency: DEFAULT_IMPLEMENTATION_CONCURRENCY,
            anchor_lookback_lines: DEFAULT_ANCHOR_LOOKBACK_LINES,
            fallback_radius_lines: DEFAULT_FALLBACK_RADIUS_LINES,
            expand_to_class: false,
            dedupe_implementations: false,
            builtin_path_segments: default_builtin_path_segments(),
        }
    }
}

impl PipelineConfig {
    pub fn implementation_timeout(&self) -> Duration {
        Duration::from_millis(self.implementation_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_bind")]
    pub bind: String,
    #[serde(default = "default_backend_url")]
    pub url: String,
    #[serde(default = "default_backend_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            bind: default_backend_bind(),
            url: default_backend_url(),
            request_timeout_ms: DEFAULT_BACKEND_TIMEOUT_MS,
        }
    }
}

impl BackendConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .parse()
            .map_err(|_| ConfigError::InvalidBind(self.bind.clone()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderConfig {
    #[serde(default = "default_reader_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_reader_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_reader_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_reader_endpoint(),
            api_key_env: default_reader_api_key_env(),
            timeout_ms: DEFAULT_READER_TIMEOUT_MS,
        }
    }
}

impl ReaderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize config TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("invalid backend bind address '{0}'")]
    InvalidBind(String),
}

pub fn linecomp_dir(workspace_root: impl AsRef<Path>) -> PathBuf {
    workspace_root.as_ref().join(LINECOMP_DIR_NAME)
}

pub fn config_path(workspace_root: impl AsRef<Path>) -> PathBuf {
    linecomp_dir(workspace_root).join(CONFIG_FILE_NAME)
}

pub fn state_path(workspace_root: impl AsRef<Path>) -> PathBuf {
    linecomp_dir(workspace_root).join(STATE_FILE_NAME)
}

pub fn load_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<LinecompConfig, ConfigError> {
    let path = config_path(workspace_root);
    if !path.exists() {
        return Ok(LinecompConfig::default());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: LinecompConfig = toml::from_str(&raw)?;
    Ok(normalize_config(parsed))
}

pub fn ensure_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<LinecompConfig, ConfigError> {
    let workspace_root = workspace_root.as_ref();
    fs::create_dir_all(linecomp_dir(workspace_root))?;

    let path = config_path(workspace_root);
    if path.exists() {
        return load_workspace_config(workspace_root);
    }

    let config = LinecompConfig::default();
    let content = toml::to_string_pretty(&config)?;
    fs::write(path, content)?;

    Ok(config)
}

/// Settings that load fine but will not behave as the user probably expects.
pub fn validate_config(config: &LinecompConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();

    if config.completion.provider == CompletionProviderKind::Ollama
        && config.completion.model.is_none()
    {
        warnings.push(ConfigWarning {
            code: "ollama_model_defaulted",
            message: format!("no completion.model set, using {DEFAULT_OLLAMA_MODEL}"),
        });
    }
    if config.pipeline.implementation_timeout_ms == 0 {
        warnings.push(ConfigWarning {
            code: "zero_implementation_timeout",
            message: "pipeline.implementation_timeout_ms is 0, no implementations will resolve"
                .to_owned(),
        });
    }
    if config.backend.bind_addr().is_err() {
        warnings.push(ConfigWarning {
            code: "invalid_bind",
            message: format!("backend.bind '{}' is not a socket address", config.backend.bind),
        });
    }
    if !config.reader.endpoint.ends_with('/') {
        warnings.push(ConfigWarning {
            code: "reader_endpoint_without_slash",
            message: format!(
                "reader.endpoint '{}' does not end with '/', URLs are appended verbatim",
                config.reader.endpoint
            ),
        });
    }

    warnings
}

fn default_api_key_env() -> String {
    DEFAULT_GEMINI_API_KEY_ENV.to_owned()
}

fn default_marker() -> String {
    DEFAULT_MARKER.to_owned()
}

fn default_implementation_timeout_ms() -> u64 {
    DEFAULT_IMPLEMENTATION_TIMEOUT_MS
}

fn default_implementation_concurrency() -> usize {
    DEFAULT_IMPLEMENTATION_CONCURRENCY
}

fn default_anchor_lookback_lines() -> usize {
    DEFAULT_ANCHOR_LOOKBACK_LINES
}

fn default_fallback_radius_lines() -> usize {
    DEFAULT_FALLBACK_RADIUS_LINES
}

fn default_builtin_path_segments() -> Vec<String> {
    ["typeshed", "typeshed-fallback", "stdlib", "builtins.pyi"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

fn default_backend_bind() -> String {
    DEFAULT_BACKEND_BIND.to_owned()
}

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_owned()
}

fn default_backend_timeout_ms() -> u64 {
    DEFAULT_BACKEND_TIMEOUT_MS
}

fn default_reader_endpoint() -> String {
    DEFAULT_READER_ENDPOINT.to_owned()
}

fn default_reader_api_key_env() -> String {
    DEFAULT_READER_API_KEY_ENV.to_owned()
}

fn default_reader_timeout_ms() -> u64 {
    DEFAULT_READER_TIMEOUT_MS
}

fn normalize_optional(input: Option<String>) -> Option<String> {
    input
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn normalize_required(value: &mut String, fallback: fn() -> String) {
    let trimmed = value.trim();
    *value = if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_owned()
    };
}

fn normalize_config(mut config: LinecompConfig) -> LinecompConfig {
    config.completion.model = normalize_optional(config.completion.model.take());
    config.completion.endpoint = normalize_optional(config.completion.endpoint.take());
    normalize_required(&mut config.completion.api_key_env, default_api_key_env);

    if config.pipeline.marker.is_empty() {
        config.pipeline.marker = default_marker();
    }
    config.pipeline.implementation_concurrency = config.pipeline.implementation_concurrency.max(1);
    config.pipeline.builtin_path_segments = config
        .pipeline
        .builtin_path_segments
        .into_iter()
        .map(|segment| segment.trim().to_owned())
        .filter(|segment| !segment.is_empty())
        .collect();

    normalize_required(&mut config.backend.bind, default_backend_bind);
    normalize_required(&mut config.backend.url, default_backend_url);
    normalize_required(&mut config.reader.endpoint, default_reader_endpoint);
    normalize_required(&mut config.reader.api_key_env, default_reader_api_key_env);

    config
}
