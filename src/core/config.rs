//! Configuration management for AgentDNS.
//!
//! Handles loading configuration from TOML (or legacy JSON) files. The
//! configuration is read once at startup and passed by reference to every
//! component that needs it.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::mcp::{SessionTarget, TransportKind};
use crate::routing::CategoryRules;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "AGENTDNS_CONFIG";

/// Environment variable overriding the display locale.
pub const LANG_ENV: &str = "AGENTDNS_LANG";

/// Locale used when neither the environment nor the file sets one.
pub const DEFAULT_LOCALE: &str = "zh-CN";

/// File names searched in the working directory, in order.
const LOCAL_CANDIDATES: [&str; 2] = ["configure.toml", "configure.json"];

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Display locale (e.g. `zh-CN`, `en-US`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Discovery service settings
    pub agentdns: DiscoveryConfig,

    /// Completion API settings
    #[serde(alias = "deepseek")]
    pub completion: CompletionConfig,

    /// Tool service session settings
    #[serde(default)]
    pub tools: ToolServiceConfig,

    /// Category → keywords, in priority order
    pub category_rules: CategoryRules,
}

/// AgentDNS discovery service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Service URL
    #[serde(alias = "sse_url")]
    pub url: String,

    /// Transport used to reach it
    #[serde(default)]
    pub transport: TransportKind,
}

impl DiscoveryConfig {
    /// Session target for the discovery service.
    pub fn target(&self) -> SessionTarget {
        SessionTarget::new(self.url.clone(), self.transport)
    }
}

/// OpenAI-compatible completion API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// API key; `$VAR` / `${VAR}` references are expanded at load time
    pub api_key: String,

    /// API base URL (without `/chat/completions`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,
}

/// Tool service session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolServiceConfig {
    /// Transport used for resolved endpoints
    pub transport: TransportKind,
}

fn default_base_url() -> String {
    "https://api.deepseek.com".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

impl Default for ToolServiceConfig {
    fn default() -> Self {
        Self { transport: TransportKind::StreamableHttp }
    }
}

/// Pick the locale: environment first, then the file, then the default.
pub fn resolve_locale(env_value: Option<&str>, file_value: Option<&str>) -> String {
    env_value
        .filter(|v| !v.trim().is_empty())
        .or(file_value.filter(|v| !v.trim().is_empty()))
        .unwrap_or(DEFAULT_LOCALE)
        .trim()
        .to_string()
}

impl Config {
    /// Load configuration.
    ///
    /// Uses `explicit` when given, otherwise the first of `configure.toml`,
    /// `configure.json` in the working directory, then
    /// `<config dir>/agentdns/config.toml`. A missing file is an error.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => Self::discover().with_context(|| {
                format!(
                    "No configuration file found (looked for {} and {})",
                    LOCAL_CANDIDATES.join(", "),
                    Self::global_path().map_or_else(|| "-".to_string(), |p| p.display().to_string())
                )
            })?,
        };

        Self::load_from_file(&path)
    }

    /// Find a configuration file without loading it.
    pub fn discover() -> Option<PathBuf> {
        LOCAL_CANDIDATES
            .iter()
            .map(PathBuf::from)
            .chain(Self::global_path())
            .find(|path| path.exists())
    }

    /// Path of the per-user configuration file.
    pub fn global_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(crate::APP_NAME).join("config.toml"))
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let mut config = if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
        .with_context(|| format!("Invalid config file {}", path.display()))?;

        config.finalize(std::env::var(LANG_ENV).ok().as_deref())?;
        tracing::debug!(path = %path.display(), locale = config.locale(), "Configuration loaded");
        Ok(config)
    }

    /// Parse TOML without applying environment overrides.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Parse JSON without applying environment overrides.
    pub fn from_json_str(content: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Apply the locale override, expand secrets and validate.
    pub fn finalize(&mut self, env_locale: Option<&str>) -> anyhow::Result<()> {
        self.language = Some(resolve_locale(env_locale, self.language.as_deref()));

        // Unset variables leave the key as written
        match shellexpand::env(&self.completion.api_key) {
            Ok(expanded) => self.completion.api_key = expanded.into_owned(),
            Err(e) => tracing::warn!(error = %e, "completion.api_key kept unexpanded"),
        }

        anyhow::ensure!(!self.agentdns.url.trim().is_empty(), "agentdns.url must not be empty");
        anyhow::ensure!(
            !self.completion.base_url.trim().is_empty(),
            "completion.base_url must not be empty"
        );

        if self.category_rules.is_empty() {
            tracing::warn!("category_rules is empty; every request will be answered directly");
        }

        Ok(())
    }

    /// The effective display locale.
    pub fn locale(&self) -> &str {
        self.language.as_deref().unwrap_or(DEFAULT_LOCALE)
    }
}
