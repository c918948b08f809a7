use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;
use crate::paths::Paths;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_base: Option<String>,
    /// Per-provider proxy; overrides `network.proxy`. An empty string disables the proxy.
    #[serde(default)]
    pub proxy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefaults {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub think: bool,
    /// Hard ceiling on inference passes per turn.
    #[serde(default = "default_max_passes")]
    pub max_passes: u32,
    #[serde(default = "default_view_tokens")]
    pub view_tokens: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_model() -> String {
    "gpt-oss:20b".to_string()
}

fn default_max_passes() -> u32 {
    20
}

pub fn default_view_tokens() -> usize {
    1024
}

fn default_request_timeout_secs() -> u64 {
    600
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            model: default_model(),
            think: false,
            max_passes: default_max_passes(),
            view_tokens: default_view_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentsConfig {
    #[serde(default)]
    pub defaults: AgentDefaults,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WebMode {
    /// `browser.search` / `browser.open` / `browser.find` over a shared session.
    #[default]
    Browser,
    /// `web_search` / `web_fetch`, no session state.
    Standalone,
    Off,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSearchConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            max_results: default_max_results(),
        }
    }
}

fn default_max_results() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebToolsConfig {
    #[serde(default)]
    pub mode: WebMode,
    #[serde(default)]
    pub search: WebSearchConfig,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_max_fetch_chars")]
    pub max_fetch_chars: usize,
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_max_fetch_chars() -> usize {
    50_000
}

impl Default for WebToolsConfig {
    fn default() -> Self {
        Self {
            mode: WebMode::default(),
            search: WebSearchConfig::default(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_fetch_chars: default_max_fetch_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsConfig {
    #[serde(default)]
    pub web: WebToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    #[serde(default)]
    pub proxy: Option<String>,
    /// Hosts that bypass the proxy. Supports `*.suffix` wildcards.
    #[serde(default)]
    pub no_proxy: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

pub const DEFAULT_OLLAMA_BASE: &str = "http://localhost:11434";

impl Default for Config {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert(
            "ollama".to_string(),
            ProviderConfig {
                api_key: String::new(),
                api_base: Some(DEFAULT_OLLAMA_BASE.to_string()),
                proxy: None,
            },
        );

        Self {
            providers,
            agents: AgentsConfig::default(),
            tools: ToolsConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn get_provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }

    /// Base URL of the Ollama server, trailing slash removed.
    pub fn ollama_base(&self) -> String {
        self.get_provider("ollama")
            .and_then(|p| p.api_base.as_deref())
            .map(|s| s.trim().trim_end_matches('/'))
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_OLLAMA_BASE)
            .to_string()
    }

    pub fn web_search_api_key(&self) -> Option<&str> {
        let key = self.tools.web.search.api_key.trim();
        if key.is_empty() {
            None
        } else {
            Some(key)
        }
    }
}
