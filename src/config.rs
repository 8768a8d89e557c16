use crate::backend::Backend;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub backend: Backend,
    /// Overrides the backend's default endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_seconds: u64,
    /// Upper bound on model re-invocations caused by tool calls in one
    /// editing request.
    pub max_tool_rounds: usize,
    /// Apply file modifications without asking.
    pub auto_apply_edits: bool,
    /// Command tools only run commands starting with one of these. Empty
    /// allows everything.
    pub allowed_command_prefixes: Vec<String>,
    pub ignored_paths: Vec<String>,
    /// Command whose `path:line:col: severity: message` output feeds
    /// `verifyChanges`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics_command: Option<String>,
    pub web_search: WebSearchConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct WebSearchConfig {
    pub api_key_env_var: String,
    pub engine_id_env_var: String,
    pub max_results: usize,
    pub page_timeout_seconds: u64,
    pub cache_ttl_seconds: u64,
    pub expand_query: bool,
    pub rerank: bool,
    pub summarize: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            base_url: None,
            model: "google/gemini-2.5-flash".to_string(),
            timeout_seconds: 120,
            max_tool_rounds: 5,
            auto_apply_edits: false,
            allowed_command_prefixes: Vec::new(),
            ignored_paths: vec![
                "**/.git/**".to_string(),
                "**/node_modules/**".to_string(),
                "**/target/**".to_string(),
            ],
            diagnostics_command: None,
            web_search: WebSearchConfig::default(),
        }
    }
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            api_key_env_var: "GOOGLE_SEARCH_API_KEY".to_string(),
            engine_id_env_var: "GOOGLE_SEARCH_ENGINE_ID".to_string(),
            max_results: 7,
            page_timeout_seconds: 20,
            cache_ttl_seconds: 600,
            expand_query: false,
            rerank: false,
            summarize: false,
        }
    }
}

impl Config {
    pub fn effective_base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.backend.config().base_url.to_string())
    }
}

pub fn load_or_create() -> Result<Config> {
    let xdg_dirs = xdg::BaseDirectories::new();
    let config_path = xdg_dirs.place_config_file("flexpilot/config.toml")?;
    load_from(&config_path)
}

/// Loads the config at `config_path`, creating it with defaults if missing.
/// Missing fields are filled in and written back so users can see every
/// available option.
pub fn load_from(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        let default_config = Config::default();
        let toml_string = toml::to_string_pretty(&default_config)?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(config_path, toml_string)?;

        tracing::info!(path = %config_path.display(), "created default config");
        return Ok(default_config);
    }

    let config_string = fs::read_to_string(config_path)?;
    let mut config: Config = toml::from_str(&config_string)
        .with_context(|| format!("Invalid config at {}", config_path.display()))?;

    let default_config = Config::default();
    if config.model.trim().is_empty() {
        config.model = default_config.model;
    }
    if config.timeout_seconds == 0 {
        config.timeout_seconds = default_config.timeout_seconds;
    }
    if config.max_tool_rounds == 0 {
        config.max_tool_rounds = default_config.max_tool_rounds;
    }

    let final_toml_string = toml::to_string_pretty(&config)?;
    if final_toml_string != config_string {
        fs::write(config_path, final_toml_string)?;
        tracing::debug!(path = %config_path.display(), "completed config with defaults");
    }

    Ok(config)
}
