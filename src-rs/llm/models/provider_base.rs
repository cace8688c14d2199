use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::cons::provider_cons::{Provider, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use crate::llm::utils::busy_guard::BusyGuard;
use crate::llm::utils::sse::{SseDecoder, SseEvent};
use crate::llm::utils::transport::{HttpRequest, HttpTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u32,
    pub output: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input.saturating_add(self.output)
    }
}

/// Uniform result of a blocking `send`.
///
/// `success` implies `error` is empty and `content` holds the complete
/// reply. On failure `content` is meaningless and `error` says why.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    pub content: String,
    pub error: String,
    pub model: String,
    pub finish_reason: String,
    pub usage: TokenUsage,
    pub provider: Provider,
}

impl Response {
    pub fn new(provider: Provider) -> Self {
        Self { provider, ..Default::default() }
    }

    pub fn failure(provider: Provider, error: impl Into<String>) -> Self {
        Self { provider, error: error.into(), ..Default::default() }
    }

    pub fn ok(&self) -> bool {
        self.success && self.error.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub name: String,
    pub provider: Provider,
    pub context_window: u32,
    pub supports_streaming: bool,
}

impl Model {
    pub fn new(id: &str, name: &str, provider: Provider, context_window: u32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            provider,
            context_window,
            supports_streaming: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub api_key: String,
    pub model: String,
    pub system_prompt: String,
    /// Empty means the provider's default host.
    pub base_url: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ClientConfig {
    pub fn with_model(model: &str) -> Self {
        Self {
            api_key: String::new(),
            model: model.to_string(),
            system_prompt: String::new(),
            base_url: String::new(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

/// Per-client mutable state: the configuration, the single-flight request
/// lock and the busy/cancel flags.
pub struct ClientState {
    config: Mutex<ClientConfig>,
    flight: Mutex<()>,
    busy: AtomicBool,
    cancel: AtomicBool,
}

pub(crate) struct InFlight<'a> {
    // Field order matters: busy is cleared before the request lock is released.
    guard: BusyGuard<'a>,
    _lock: MutexGuard<'a, ()>,
}

impl InFlight<'_> {
    pub(crate) fn cancelled(&self) -> bool {
        self.guard.cancelled()
    }
}

impl ClientState {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config: Mutex::new(config),
            flight: Mutex::new(()),
            busy: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut ClientConfig)) {
        let mut cfg = self.config.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut cfg);
    }

    /// Copy of the configuration taken under the lock; no lock is held
    /// afterwards.
    pub fn snapshot(&self) -> ClientConfig {
        self.config.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    /// Waits for any request already running on this client, then marks a
    /// new one in flight.
    pub(crate) fn begin(&self) -> InFlight<'_> {
        let lock = self.flight.lock().unwrap_or_else(|e| e.into_inner());
        InFlight {
            guard: BusyGuard::new(&self.busy, &self.cancel),
            _lock: lock,
        }
    }
}

/// Shared contract over the four provider wire protocols.
pub trait ProviderClient: Send + Sync {
    fn provider(&self) -> Provider;

    fn state(&self) -> &ClientState;

    /// Blocking request/response call. Never fails across this boundary:
    /// all failures are reported through `Response::error`.
    fn send(&self, messages: &[Message]) -> Response;

    /// Blocking streaming call. `on_chunk` runs on the calling thread, once
    /// per text fragment, in arrival order. Returns when the stream ends,
    /// fails or is cancelled.
    fn stream(&self, messages: &[Message], on_chunk: &mut dyn FnMut(&str));

    fn models(&self) -> Vec<Model>;

    fn send_text(&self, message: &str) -> Response {
        self.send(&[Message::user(message)])
    }

    fn stream_text(&self, message: &str, on_chunk: &mut dyn FnMut(&str)) {
        self.stream(&[Message::user(message)], on_chunk)
    }

    fn set_api_key(&self, key: &str) {
        self.state().update(|c| c.api_key = key.to_string());
    }

    fn set_model(&self, model: &str) {
        self.state().update(|c| c.model = model.to_string());
    }

    fn set_system_prompt(&self, prompt: &str) {
        self.state().update(|c| c.system_prompt = prompt.to_string());
    }

    fn set_max_tokens(&self, tokens: u32) {
        self.state().update(|c| c.max_tokens = tokens);
    }

    fn set_temperature(&self, temperature: f32) {
        self.state().update(|c| c.temperature = temperature);
    }

    fn has_api_key(&self) -> bool {
        !self.state().snapshot().api_key.is_empty()
    }

    fn get_model(&self) -> String {
        self.state().snapshot().model
    }

    fn is_busy(&self) -> bool {
        self.state().is_busy()
    }

    fn cancel(&self) {
        self.state().cancel();
    }
}

/// Fields extracted from a successful reply body.
#[derive(Debug, Default)]
pub(crate) struct ParsedReply {
    pub content: String,
    pub model: String,
    pub finish_reason: String,
    pub usage: TokenUsage,
}

pub(crate) const API_KEY_NOT_SET: &str = "API key not set";

/// Runs one non-streaming call: pre-flight key check, transport, status
/// normalisation and body parsing.
pub(crate) fn run_send(
    state: &ClientState,
    transport: &dyn HttpTransport,
    provider: Provider,
    messages: &[Message],
    build: impl FnOnce(&ClientConfig, &[Message]) -> Result<HttpRequest>,
    parse: impl FnOnce(&Value, &ClientConfig) -> Result<ParsedReply>,
) -> Response {
    let _flight = state.begin();
    let cfg = state.snapshot();

    if cfg.api_key.is_empty() {
        return Response::failure(provider, API_KEY_NOT_SET);
    }

    let request = match build(&cfg, messages) {
        Ok(r) => r,
        Err(e) => return Response::failure(provider, format!("Request failed: {}", e)),
    };

    log::info!(
        "{} send: model={} messages={}",
        provider,
        cfg.model,
        messages.len()
    );

    let reply = match transport.execute(&request) {
        Ok(r) => r,
        Err(e) => {
            log::warn!("{} transport failure: {}", provider, e);
            return Response::failure(provider, format!("Request failed: {}", e));
        }
    };

    if !reply.is_ok() {
        log::warn!("{} returned HTTP {}", provider, reply.status);
        return Response::failure(provider, error_message(reply.status, &reply.body));
    }

    match parse_body(&reply.body).and_then(|json| parse(&json, &cfg)) {
        Ok(parsed) => Response {
            success: true,
            content: parsed.content,
            error: String::new(),
            model: parsed.model,
            finish_reason: parsed.finish_reason,
            usage: parsed.usage,
            provider,
        },
        Err(e) => {
            log::warn!("{} reply could not be parsed: {}", provider, e);
            Response::failure(provider, format!("Parse error: {}", e))
        }
    }
}

/// Runs one streaming call, feeding text deltas produced by `extract` to
/// `on_chunk`. Cancellation is polled once per network buffer and before
/// each decoded event.
pub(crate) fn run_stream(
    state: &ClientState,
    transport: &dyn HttpTransport,
    provider: Provider,
    messages: &[Message],
    build: impl FnOnce(&ClientConfig, &[Message]) -> Result<HttpRequest>,
    extract: impl Fn(&Value) -> Vec<String>,
    on_chunk: &mut dyn FnMut(&str),
) {
    let flight = state.begin();
    let cfg = state.snapshot();

    if cfg.api_key.is_empty() {
        log::warn!("{} stream skipped: {}", provider, API_KEY_NOT_SET);
        return;
    }

    let request = match build(&cfg, messages) {
        Ok(r) => r,
        Err(e) => {
            log::warn!("{} stream request could not be built: {}", provider, e);
            return;
        }
    };

    log::info!(
        "{} stream: model={} messages={}",
        provider,
        cfg.model,
        messages.len()
    );

    let mut decoder = SseDecoder::new();
    let mut finished = false;
    let mut emitted = 0usize;

    let decode = |data: &str| -> Vec<String> {
        match serde_json::from_str::<Value>(data) {
            Ok(event) => extract(&event),
            Err(e) => {
                log::trace!("{} skipping undecodable event: {}", provider, e);
                Vec::new()
            }
        }
    };

    let mut on_data = |bytes: &[u8]| -> bool {
        if flight.cancelled() {
            return false;
        }
        for event in decoder.push(bytes) {
            if flight.cancelled() {
                return false;
            }
            match event {
                SseEvent::Done => {
                    finished = true;
                    return false;
                }
                SseEvent::Data(data) => emit(decode(&data), &mut *on_chunk, &mut emitted),
            }
        }
        true
    };

    match transport.execute_streaming(&request, &mut on_data) {
        Ok(reply) if !reply.is_ok() => {
            log::warn!(
                "{} stream returned HTTP {}: {}",
                provider,
                reply.status,
                error_message(reply.status, &reply.body)
            );
            return;
        }
        Ok(_) => {}
        Err(e) => {
            log::warn!("{} stream transport failure: {}", provider, e);
            return;
        }
    }

    if flight.cancelled() {
        log::info!("{} stream cancelled after {} chunks", provider, emitted);
        return;
    }

    if !finished {
        if let Some(SseEvent::Data(data)) = decoder.finish() {
            emit(decode(&data), on_chunk, &mut emitted);
        }
    }

    log::debug!("{} stream finished: {} chunks", provider, emitted);
}

fn emit(texts: Vec<String>, on_chunk: &mut dyn FnMut(&str), emitted: &mut usize) {
    for text in texts.iter().filter(|t| !t.is_empty()) {
        *emitted += 1;
        on_chunk(text);
    }
}

fn parse_body(body: &str) -> Result<Value> {
    let json: Value = serde_json::from_str(body)?;
    if !json.is_object() {
        return Err(anyhow!("expected a JSON object"));
    }
    Ok(json)
}

/// Error text for a non-200 reply: the `error.message` envelope when
/// present, else the raw body, else the bare status.
pub(crate) fn error_message(status: u16, body: &str) -> String {
    let envelope = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        v.pointer("/error/message")
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    if let Some(message) = envelope {
        return message;
    }
    if body.trim().is_empty() {
        format!("HTTP {}", status)
    } else {
        body.to_string()
    }
}

/// Configured system prompt followed by every `system`-role message,
/// newline-joined. Used by providers with a dedicated system field.
pub(crate) fn merged_system_prompt(cfg: &ClientConfig, messages: &[Message]) -> Option<String> {
    let parts: Vec<&str> = std::iter::once(cfg.system_prompt.as_str())
        .chain(
            messages
                .iter()
                .filter(|m| m.role == Role::System)
                .map(|m| m.content.as_str()),
        )
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

pub(crate) fn u32_at(v: &Value, pointer: &str) -> u32 {
    v.pointer(pointer)
        .and_then(Value::as_u64)
        .map(|n| n.min(u32::MAX as u64) as u32)
        .unwrap_or(0)
}

pub(crate) fn str_at<'a>(v: &'a Value, pointer: &str) -> Option<&'a str> {
    v.pointer(pointer).and_then(Value::as_str)
}

/// Normalises a host override into an origin; a bare host gets `https://`.
pub(crate) fn origin_or(base_url: &str, default: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return default.to_string();
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}
