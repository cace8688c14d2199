use std::sync::{Arc, RwLock};

use crate::cons::provider_cons::Provider;
use crate::llm::prompts;
use crate::llm::utils::transport::{HttpTransport, ReqwestTransport};

use super::claude::ClaudeClient;
use super::gemini::GeminiClient;
use super::openai::OpenAiClient;
use super::openrouter::OpenRouterClient;
pub use super::provider_base::{Message, Model, ProviderClient, Response};

/// Owns one client per provider and routes calls to the selected one.
///
/// Shared between the UI thread and worker threads behind an `Arc`; every
/// method takes `&self`.
pub struct LlmManager {
    provider: RwLock<Provider>,
    claude: ClaudeClient,
    openai: OpenAiClient,
    gemini: GeminiClient,
    openrouter: OpenRouterClient,
}

impl LlmManager {
    pub fn new() -> Self {
        Self::with_transport(Arc::new(ReqwestTransport::new()))
    }

    pub fn with_transport(transport: Arc<dyn HttpTransport>) -> Self {
        Self::from_clients(
            ClaudeClient::new(Arc::clone(&transport)),
            OpenAiClient::new(Arc::clone(&transport)),
            GeminiClient::new(Arc::clone(&transport)),
            OpenRouterClient::new(transport),
        )
    }

    pub fn from_clients(
        claude: ClaudeClient,
        openai: OpenAiClient,
        gemini: GeminiClient,
        openrouter: OpenRouterClient,
    ) -> Self {
        Self {
            provider: RwLock::new(Provider::default()),
            claude,
            openai,
            gemini,
            openrouter,
        }
    }

    pub fn set_provider(&self, provider: Provider) {
        log::info!("Active LLM provider: {}", provider);
        *self.provider.write().unwrap_or_else(|e| e.into_inner()) = provider;
    }

    pub fn get_provider(&self) -> Provider {
        *self.provider.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn claude(&self) -> &ClaudeClient {
        &self.claude
    }

    pub fn openai(&self) -> &OpenAiClient {
        &self.openai
    }

    pub fn gemini(&self) -> &GeminiClient {
        &self.gemini
    }

    pub fn openrouter(&self) -> &OpenRouterClient {
        &self.openrouter
    }

    pub fn client(&self, provider: Provider) -> &dyn ProviderClient {
        match provider {
            Provider::Claude => &self.claude,
            Provider::OpenAI => &self.openai,
            Provider::Gemini => &self.gemini,
            Provider::OpenRouter => &self.openrouter,
        }
    }

    pub fn active(&self) -> &dyn ProviderClient {
        self.client(self.get_provider())
    }

    pub fn send(&self, messages: &[Message]) -> Response {
        self.active().send(messages)
    }

    pub fn send_text(&self, message: &str) -> Response {
        self.active().send_text(message)
    }

    pub fn stream(&self, messages: &[Message], on_chunk: &mut dyn FnMut(&str)) {
        self.active().stream(messages, on_chunk)
    }

    pub fn stream_text(&self, message: &str, on_chunk: &mut dyn FnMut(&str)) {
        self.active().stream_text(message, on_chunk)
    }

    /// True while any client has a request in flight, including one started
    /// before the active provider was switched.
    pub fn is_busy(&self) -> bool {
        Provider::ALL.iter().any(|p| self.client(*p).is_busy())
    }

    /// Cancels whatever is in flight on every client.
    pub fn cancel(&self) {
        for provider in Provider::ALL {
            self.client(provider).cancel();
        }
    }

    /// Static catalogs of Claude, OpenAI and Gemini. OpenRouter's live
    /// catalog is not included; query `openrouter().fetch_models()`.
    pub fn all_models(&self) -> Vec<Model> {
        let mut models = ClaudeClient::static_models();
        models.extend(OpenAiClient::static_models());
        models.extend(GeminiClient::static_models());
        models
    }

    pub fn analyze_code(&self, code: &str, custom_prompt: Option<&str>) -> Response {
        self.send_text(&prompts::analyze_code(code, custom_prompt))
    }

    pub fn explain_function(&self, pseudocode: &str) -> Response {
        self.send_text(&prompts::explain_function(pseudocode))
    }

    pub fn find_vulnerabilities(&self, code: &str) -> Response {
        self.send_text(&prompts::find_vulnerabilities(code))
    }

    pub fn suggest_name(&self, pseudocode: &str) -> Response {
        self.send_text(&prompts::suggest_name(pseudocode))
    }
}

impl Default for LlmManager {
    fn default() -> Self {
        Self::new()
    }
}
