use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use qs_agents::AgentSettings;
use qs_core::{ChatSampling, SamplingParams};
use qs_providers::openai::DEFAULT_BASE_URL;
use qs_tools::{FetchSettings, SearchSettings};

/// Effective configuration: compiled defaults, then the config file, then
/// `QS_` environment variables (`QS_CHAT__API_KEY` sets `chat.api_key`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub chat: ChatConfig,
    pub search: SearchSettings,
    pub fetch: FetchSettings,
    pub agent: AgentSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub api_key: String,
    /// OpenAI-compatible endpoints. Batch runs split work across all of them.
    pub base_urls: Vec<String>,
    /// Resolved from the first endpoint's model listing when unset.
    pub model: Option<String>,
    /// Sampling for streamed agent calls.
    pub stream: SamplingParams,
    /// Sampling for one-shot calls.
    pub plain: SamplingParams,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_key: "EMPTY".to_string(),
            base_urls: vec![DEFAULT_BASE_URL.to_string()],
            model: None,
            stream: SamplingParams::streaming(),
            plain: SamplingParams::plain(),
        }
    }
}

impl ChatConfig {
    pub fn sampling(&self) -> ChatSampling {
        ChatSampling {
            stream: self.stream,
            chat: self.plain,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load with `path` as the config file. A missing file is not an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("QS_").split("__"))
            .extract()
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("qs"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Copy with every credential masked, for display.
    pub fn masked(&self) -> Self {
        let mut config = self.clone();
        config.chat.api_key = mask(&config.chat.api_key);
        config.search.bing.api_key = config.search.bing.api_key.as_deref().map(mask);
        config.search.qihoo.api_key = config.search.qihoo.api_key.as_deref().map(mask);
        config.search.qihoo.key = mask(&config.search.qihoo.key);
        config
    }
}

fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    match chars.len() {
        0 => String::new(),
        n if n <= 8 => "*".repeat(n),
        n => {
            let head: String = chars[..4].iter().collect();
            let tail: String = chars[n - 2..].iter().collect();
            format!("{head}****{tail}")
        }
    }
}
