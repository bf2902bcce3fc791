//! Configuration loading from TOML files and environment variables.
//!
//! Config is layered in this order of precedence (highest wins):
//! 1. Environment variables (`OPENROUTER_API_KEY`, `HEDDLE_BASE_URL`)
//! 2. ./heddle.toml in the current directory
//! 3. `<heddle_home>/config.toml`
//! 4. Built-in defaults
//!
//! `heddle_home` is `$HEDDLE_HOME` when set (relative paths resolve from the
//! current directory) and `~/.heddle` otherwise.

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
const DEFAULT_MAX_ITERATIONS: usize = 20;
const DEFAULT_DOOM_LOOP_THRESHOLD: usize = 3;

/// Default system prompt used when neither config nor `init` provides one.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a capable software agent. \
Use the available tools to inspect and modify the workspace, and answer \
concisely when the task is complete.";

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

/// Top-level runtime configuration.
#[derive(Debug, Clone)]
pub struct HeddleConfig {
    pub api: ApiConfig,
    pub agent: AgentConfig,
}

impl Default for HeddleConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

/// Resolved API connection settings used by the provider client.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: String::new(),
            model: DEFAULT_MODEL.into(),
        }
    }
}

/// Agent behavior settings.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub system_prompt: String,
    /// Safety cap on agentic loop iterations.
    pub max_iterations: usize,
    /// Identical consecutive tool-call turns tolerated before aborting.
    pub doom_loop_threshold: usize,
    /// Tool-name filter; empty means every built-in is registered.
    pub tools: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            doom_loop_threshold: DEFAULT_DOOM_LOOP_THRESHOLD,
            tools: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// File layer
// ---------------------------------------------------------------------------

/// Partial config as written in a TOML file; absent fields keep the value
/// from the layer below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    api: FileApiConfig,
    agent: FileAgentConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FileApiConfig {
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FileAgentConfig {
    system_prompt: Option<String>,
    max_iterations: Option<usize>,
    doom_loop_threshold: Option<usize>,
    tools: Option<Vec<String>>,
}

impl FileConfig {
    /// Overlay this file layer onto an accumulated config.
    fn apply(self, config: &mut HeddleConfig) {
        if let Some(url) = normalized(self.api.base_url) {
            config.api.base_url = url;
        }
        if let Some(key) = normalized(self.api.api_key) {
            config.api.api_key = key;
        }
        if let Some(model) = normalized(self.api.model) {
            config.api.model = model;
        }
        if let Some(prompt) = self.agent.system_prompt {
            config.agent.system_prompt = prompt;
        }
        if let Some(max) = self.agent.max_iterations {
            config.agent.max_iterations = max.max(1);
        }
        if let Some(threshold) = self.agent.doom_loop_threshold {
            config.agent.doom_loop_threshold = threshold.max(2);
        }
        if let Some(tools) = self.agent.tools {
            config.agent.tools = tools;
        }
    }
}

fn normalized(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Resolve the global config/state directory.
pub fn heddle_home() -> PathBuf {
    if let Ok(home) = std::env::var("HEDDLE_HOME") {
        let trimmed = home.trim();
        if !trimmed.is_empty() {
            let path = PathBuf::from(trimmed);
            return if path.is_absolute() {
                path
            } else {
                std::env::current_dir().unwrap_or_default().join(path)
            };
        }
    }
    std::env::var("HOME")
        .map(|home| PathBuf::from(home).join(".heddle"))
        .unwrap_or_else(|_| PathBuf::from(".heddle"))
}

/// Load configuration from disk and environment layers.
pub fn load_config() -> Result<HeddleConfig, ConfigError> {
    let mut config = HeddleConfig::default();

    for path in [heddle_home().join("config.toml"), PathBuf::from("heddle.toml")] {
        if let Some(layer) = read_layer(&path)? {
            layer.apply(&mut config);
        }
    }

    if let Ok(key) = std::env::var("OPENROUTER_API_KEY") {
        if !key.trim().is_empty() {
            config.api.api_key = key.trim().to_string();
        }
    }
    if let Ok(url) = std::env::var("HEDDLE_BASE_URL") {
        if !url.trim().is_empty() {
            config.api.base_url = url.trim().to_string();
        }
    }

    Ok(config)
}

/// Load configuration and require a usable credential.
pub fn load_config_with_credential() -> Result<HeddleConfig, ConfigError> {
    let config = load_config()?;
    if config.api.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "no API key configured: set OPENROUTER_API_KEY or api.api_key in heddle.toml"
                .to_string(),
        ));
    }
    Ok(config)
}

/// Parse one config file layer; a missing file is not an error.
fn read_layer(path: &Path) -> Result<Option<FileConfig>, ConfigError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(ConfigError::Io(err)),
    };
    Ok(Some(toml::from_str(&text)?))
}
