use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::cons::provider_cons::{
    Provider, OPENROUTER_BASE_URL, OPENROUTER_CHAT_PATH, OPENROUTER_FREE_SUFFIX,
    OPENROUTER_MODELS_PATH, OPENROUTER_MODELS_TIMEOUT, OPENROUTER_MODELS_TTL, OPENROUTER_REFERER,
    OPENROUTER_TITLE,
};
use crate::llm::models::openai::{
    build_chat_completions_body, chat_completions_deltas, parse_chat_completions_reply,
};
use crate::llm::models::provider_base::{
    run_send, run_stream, ClientConfig, ClientState, Message, Model, ProviderClient, Response,
};
use crate::llm::utils::transport::{HttpRequest, HttpTransport};

pub const OPENROUTER_DEFAULT_MODEL: &str = "mistralai/devstral-small:free";

#[derive(Default)]
struct ModelCache {
    models: Vec<Model>,
    fetched_at: Option<Instant>,
}

/// OpenRouter aggregator. Chat traffic uses the OpenAI wire shape on a fixed
/// host; the model list is fetched live and cached.
pub struct OpenRouterClient {
    state: ClientState,
    transport: Arc<dyn HttpTransport>,
    cache: Mutex<ModelCache>,
    refresh: Mutex<()>,
    cache_ttl: Duration,
    free_only: AtomicBool,
}

impl OpenRouterClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            state: ClientState::new(ClientConfig::with_model(OPENROUTER_DEFAULT_MODEL)),
            transport,
            cache: Mutex::new(ModelCache::default()),
            refresh: Mutex::new(()),
            cache_ttl: OPENROUTER_MODELS_TTL,
            free_only: AtomicBool::new(true),
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn set_show_free_only(&self, free_only: bool) {
        self.free_only.store(free_only, Ordering::Release);
    }

    pub fn show_free_only(&self) -> bool {
        self.free_only.load(Ordering::Acquire)
    }

    /// Returns the catalog, refreshing it when forced, empty or older than
    /// the cache TTL. A failed refresh keeps serving the previous list.
    ///
    /// Refreshes are serialised among themselves; the cache lock is only
    /// held to read or swap the list, never across the download.
    pub fn fetch_models(&self, force_refresh: bool) -> Vec<Model> {
        let _refresh = self.refresh.lock().unwrap_or_else(|e| e.into_inner());

        if force_refresh || self.is_stale() {
            match self.download_models() {
                Ok(models) => {
                    log::info!("OpenRouter catalog refreshed: {} models", models.len());
                    let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
                    cache.models = models;
                    cache.fetched_at = Some(Instant::now());
                }
                Err(e) => {
                    let kept = self.cache.lock().unwrap_or_else(|p| p.into_inner()).models.len();
                    log::warn!(
                        "OpenRouter catalog refresh failed, keeping {} cached models: {}",
                        kept,
                        e
                    );
                }
            }
        }

        self.cached_models()
    }

    fn is_stale(&self) -> bool {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let fresh = cache
            .fetched_at
            .is_some_and(|at| at.elapsed() < self.cache_ttl);
        cache.models.is_empty() || !fresh
    }

    /// Current cache contents under the free-only filter, without any I/O.
    pub fn cached_models(&self) -> Vec<Model> {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        filter_and_sort(&cache.models, self.show_free_only())
    }

    fn download_models(&self) -> Result<Vec<Model>> {
        let request = HttpRequest::get(format!("{}{}", OPENROUTER_BASE_URL, OPENROUTER_MODELS_PATH))
            .with_timeout(OPENROUTER_MODELS_TIMEOUT);
        let reply = self.transport.execute(&request)?;
        if !reply.is_ok() {
            return Err(anyhow!("HTTP {}", reply.status));
        }
        let json: Value = serde_json::from_str(&reply.body).context("Invalid models JSON")?;
        parse_models(&json)
    }
}

pub fn is_free_model(id: &str) -> bool {
    id.ends_with(OPENROUTER_FREE_SUFFIX)
}

pub(crate) fn parse_models(json: &Value) -> Result<Vec<Model>> {
    let entries = json
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("models reply has no 'data' array"))?;

    Ok(entries
        .iter()
        .filter_map(|entry| {
            let id = entry.get("id").and_then(Value::as_str).unwrap_or_default();
            if id.is_empty() {
                return None;
            }
            let name = entry.get("name").and_then(Value::as_str).unwrap_or(id);
            let context = entry
                .get("context_length")
                .and_then(Value::as_u64)
                .unwrap_or(0)
                .min(u32::MAX as u64) as u32;
            Some(Model::new(id, name, Provider::OpenRouter, context))
        })
        .collect())
}

/// Free models first, then display name ascending.
pub fn filter_and_sort(models: &[Model], free_only: bool) -> Vec<Model> {
    let mut out: Vec<Model> = models
        .iter()
        .filter(|m| !free_only || is_free_model(&m.id))
        .cloned()
        .collect();
    out.sort_by(|a, b| {
        is_free_model(&b.id)
            .cmp(&is_free_model(&a.id))
            .then_with(|| a.name.cmp(&b.name))
    });
    out
}

fn build_request(cfg: &ClientConfig, messages: &[Message], stream: bool) -> Result<HttpRequest> {
    Ok(HttpRequest::post(
        format!("{}{}", OPENROUTER_BASE_URL, OPENROUTER_CHAT_PATH),
        build_chat_completions_body(cfg, messages, stream),
    )
    .header("Authorization", format!("Bearer {}", cfg.api_key))
    .header("HTTP-Referer", OPENROUTER_REFERER)
    .header("X-Title", OPENROUTER_TITLE))
}

impl ProviderClient for OpenRouterClient {
    fn provider(&self) -> Provider {
        Provider::OpenRouter
    }

    fn state(&self) -> &ClientState {
        &self.state
    }

    fn send(&self, messages: &[Message]) -> Response {
        run_send(
            &self.state,
            self.transport.as_ref(),
            Provider::OpenRouter,
            messages,
            |cfg, msgs| build_request(cfg, msgs, false),
            parse_chat_completions_reply,
        )
    }

    fn stream(&self, messages: &[Message], on_chunk: &mut dyn FnMut(&str)) {
        run_stream(
            &self.state,
            self.transport.as_ref(),
            Provider::OpenRouter,
            messages,
            |cfg, msgs| build_request(cfg, msgs, true),
            chat_completions_deltas,
            on_chunk,
        )
    }

    /// The cached catalog; use `fetch_models` to refresh it.
    fn models(&self) -> Vec<Model> {
        self.cached_models()
    }
}
