use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cons::provider_cons::{Provider, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use crate::llm::models::provider_base::ProviderClient;
use crate::llm::models::provider_handle::LlmManager;
use crate::llm::prompts::DEFAULT_SYSTEM_PROMPT;

const CONFIG_DIR_NAME: &str = "ida-re-assistant";
const CONFIG_FILE_NAME: &str = "config.json";

/// Pre-multi-provider installs stored the Claude key here.
const LEGACY_API_KEY: &str = "api_key";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub provider: String,
    pub claude_api_key: String,
    pub openai_api_key: String,
    pub gemini_api_key: String,
    pub openrouter_api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system_prompt: String,
    pub anthropic_base_url: String,
    pub openai_base_url: String,
    pub openrouter_free_only: bool,
    pub mcp_host: String,
    pub mcp_port: u16,
    pub enable_cache: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            claude_api_key: String::new(),
            openai_api_key: String::new(),
            gemini_api_key: String::new(),
            openrouter_api_key: String::new(),
            model: "gemini-2.0-flash-exp".to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            anthropic_base_url: String::new(),
            openai_base_url: String::new(),
            openrouter_free_only: true,
            mcp_host: "127.0.0.1".to_string(),
            mcp_port: 13120,
            enable_cache: true,
        }
    }
}

impl AppConfig {
    /// Embedded `Config.toml`.
    pub fn defaults() -> Result<Self> {
        let default_str = include_str!("../Config.toml");
        toml::from_str(default_str).context("Failed to parse embedded Config.toml")
    }

    /// `<config dir>/ida-re-assistant/config.json`, when the platform has a
    /// config dir.
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Defaults overlaid with the user config file.
    pub fn load() -> Result<Self> {
        let mut config = Self::defaults()?;
        if let Some(path) = Self::user_config_path() {
            Self::apply_patch(&mut config, path);
        }
        Ok(config)
    }

    /// Defaults overlaid with the JSON file at `path`.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::defaults()?;
        Self::apply_patch(&mut config, path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::user_config_path().context("No config directory on this platform")?;
        self.save_to(path)
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("Config saved to {}", path.display());
        Ok(())
    }

    /// Overlays keys present in the JSON object at `path`. A missing file is
    /// a no-op; an unreadable or malformed one is logged and ignored.
    pub(crate) fn apply_patch<P: AsRef<Path>>(config: &mut AppConfig, path: P) {
        let path = path.as_ref();
        if !path.exists() {
            return;
        }
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Failed to read config patch at {}: {}", path.display(), e);
                return;
            }
        };
        let merged = serde_json::from_str::<Value>(&content)
            .map_err(anyhow::Error::from)
            .and_then(|patch| merge_patch(config, patch));
        match merged {
            Ok(merged) => *config = merged,
            Err(e) => {
                log::warn!("Failed to parse config patch at {}: {}", path.display(), e);
            }
        }
    }

    /// The selected provider; unknown names fall back to Gemini.
    pub fn provider_kind(&self) -> Provider {
        Provider::from_name(&self.provider).unwrap_or(Provider::Gemini)
    }

    pub fn api_key_for(&self, provider: Provider) -> &str {
        match provider {
            Provider::Claude => &self.claude_api_key,
            Provider::OpenAI => &self.openai_api_key,
            Provider::Gemini => &self.gemini_api_key,
            Provider::OpenRouter => &self.openrouter_api_key,
        }
    }

    /// Pushes keys and generation settings into every client, the model into
    /// the selected one, and selects it.
    pub fn apply_to(&self, manager: &LlmManager) {
        for provider in Provider::ALL {
            let client = manager.client(provider);
            client.set_api_key(self.api_key_for(provider));
            client.set_max_tokens(self.max_tokens);
            client.set_temperature(self.temperature);
            client.set_system_prompt(&self.system_prompt);
        }

        if !self.anthropic_base_url.is_empty() {
            manager.claude().set_base_url(&self.anthropic_base_url);
        }
        if !self.openai_base_url.is_empty() {
            manager.openai().set_base_url(&self.openai_base_url);
        }
        manager.openrouter().set_show_free_only(self.openrouter_free_only);

        let selected = self.provider_kind();
        if !self.model.trim().is_empty() {
            manager.client(selected).set_model(self.model.trim());
        }
        manager.set_provider(selected);
    }
}

fn merge_patch(config: &AppConfig, patch: Value) -> Result<AppConfig> {
    let Value::Object(mut patch) = patch else {
        anyhow::bail!("config patch is not a JSON object");
    };

    if !patch.contains_key("claude_api_key") {
        if let Some(legacy) = patch.remove(LEGACY_API_KEY) {
            patch.insert("claude_api_key".to_string(), legacy);
        }
    }

    let mut base = serde_json::to_value(config)?;
    if let Value::Object(fields) = &mut base {
        for (k, v) in patch {
            if fields.contains_key(&k) {
                fields.insert(k, v);
            }
        }
    }
    Ok(serde_json::from_value(base)?)
}
