use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Claude,
    OpenAI,
    Gemini,
    OpenRouter,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::Claude,
        Provider::OpenAI,
        Provider::Gemini,
        Provider::OpenRouter,
    ];

    /// Returns the identifier used in configuration (e.g., "openai", "claude")
    pub fn provider_name(&self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::OpenAI => "openai",
            Provider::Gemini => "gemini",
            Provider::OpenRouter => "openrouter",
        }
    }

    /// Helper to parse from a string (handles aliases)
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "claude" | "anthropic" => Some(Provider::Claude),
            "openai" => Some(Provider::OpenAI),
            "gemini" | "google" => Some(Provider::Gemini),
            "openrouter" => Some(Provider::OpenRouter),
            _ => None,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.provider_name())
    }
}

pub const CLAUDE_DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const CLAUDE_MESSAGES_PATH: &str = "/v1/messages";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

pub const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const OPENAI_CHAT_PATH: &str = "/v1/chat/completions";

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai";
pub const OPENROUTER_CHAT_PATH: &str = "/api/v1/chat/completions";
pub const OPENROUTER_MODELS_PATH: &str = "/api/v1/models";
pub const OPENROUTER_REFERER: &str = "https://github.com/W1lliam1337/ida-re-assistant";
pub const OPENROUTER_TITLE: &str = "IDA RE Assistant";
pub const OPENROUTER_FREE_SUFFIX: &str = ":free";
pub const OPENROUTER_MODELS_TTL: Duration = Duration::from_secs(30 * 60);
pub const OPENROUTER_MODELS_TIMEOUT: Duration = Duration::from_secs(30);

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const READ_TIMEOUT: Duration = Duration::from_secs(120);

pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
