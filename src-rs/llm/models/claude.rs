use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::cons::provider_cons::{
    Provider, ANTHROPIC_VERSION, CLAUDE_DEFAULT_BASE_URL, CLAUDE_MESSAGES_PATH,
};
use crate::llm::models::provider_base::{
    merged_system_prompt, origin_or, run_send, run_stream, str_at, u32_at, ClientConfig,
    ClientState, Message, Model, ParsedReply, ProviderClient, Response, Role,
};
use crate::llm::utils::transport::{HttpRequest, HttpTransport};

pub const CLAUDE_DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

pub struct ClaudeClient {
    state: ClientState,
    transport: Arc<dyn HttpTransport>,
}

impl ClaudeClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            state: ClientState::new(ClientConfig::with_model(CLAUDE_DEFAULT_MODEL)),
            transport,
        }
    }

    /// Overrides `api.anthropic.com`. A bare host is served over https.
    pub fn set_base_url(&self, url: &str) {
        self.state.update(|c| c.base_url = url.to_string());
    }

    pub fn static_models() -> Vec<Model> {
        vec![
            Model::new(CLAUDE_DEFAULT_MODEL, "Claude Sonnet 4.5", Provider::Claude, 200_000),
            Model::new("claude-opus-4-5-20251101", "Claude Opus 4.5", Provider::Claude, 200_000),
            Model::new("claude-3-5-sonnet-20241022", "Claude 3.5 Sonnet", Provider::Claude, 200_000),
            Model::new("claude-3-5-haiku-20241022", "Claude 3.5 Haiku", Provider::Claude, 200_000),
        ]
    }
}

/// The system prompt goes into the top-level `system` field; every
/// `system`-role message is removed from `messages`.
pub(crate) fn build_body(cfg: &ClientConfig, messages: &[Message], stream: bool) -> Value {
    let converted: Vec<Value> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
        .collect();

    let mut body = json!({
        "model": cfg.model,
        "max_tokens": cfg.max_tokens,
        "messages": converted,
    });
    if let Some(system) = merged_system_prompt(cfg, messages) {
        body["system"] = json!(system);
    }
    if stream {
        body["stream"] = json!(true);
    }
    body
}

pub(crate) fn build_request(cfg: &ClientConfig, messages: &[Message], stream: bool) -> Result<HttpRequest> {
    let url = format!(
        "{}{}",
        origin_or(&cfg.base_url, CLAUDE_DEFAULT_BASE_URL),
        CLAUDE_MESSAGES_PATH
    );
    Ok(HttpRequest::post(url, build_body(cfg, messages, stream))
        .header("x-api-key", cfg.api_key.as_str())
        .header("anthropic-version", ANTHROPIC_VERSION))
}

pub(crate) fn parse_reply(json: &Value, cfg: &ClientConfig) -> Result<ParsedReply> {
    let mut reply = ParsedReply::default();

    if let Some(content) = json.get("content") {
        let blocks = content
            .as_array()
            .ok_or_else(|| anyhow!("'content' is not an array"))?;
        for block in blocks {
            if block.get("type").and_then(Value::as_str) == Some("text") {
                reply.content.push_str(str_at(block, "/text").unwrap_or_default());
            }
        }
    }

    reply.usage.input = u32_at(json, "/usage/input_tokens");
    reply.usage.output = u32_at(json, "/usage/output_tokens");
    reply.model = str_at(json, "/model").unwrap_or(&cfg.model).to_string();
    reply.finish_reason = str_at(json, "/stop_reason").unwrap_or_default().to_string();
    Ok(reply)
}

/// Text carried by a `content_block_delta` event with a `text_delta`.
pub(crate) fn stream_deltas(event: &Value) -> Vec<String> {
    if event.get("type").and_then(Value::as_str) != Some("content_block_delta") {
        return Vec::new();
    }
    if str_at(event, "/delta/type") != Some("text_delta") {
        return Vec::new();
    }
    str_at(event, "/delta/text")
        .map(|t| vec![t.to_string()])
        .unwrap_or_default()
}

impl ProviderClient for ClaudeClient {
    fn provider(&self) -> Provider {
        Provider::Claude
    }

    fn state(&self) -> &ClientState {
        &self.state
    }

    fn send(&self, messages: &[Message]) -> Response {
        run_send(
            &self.state,
            self.transport.as_ref(),
            Provider::Claude,
            messages,
            |cfg, msgs| build_request(cfg, msgs, false),
            parse_reply,
        )
    }

    fn stream(&self, messages: &[Message], on_chunk: &mut dyn FnMut(&str)) {
        run_stream(
            &self.state,
            self.transport.as_ref(),
            Provider::Claude,
            messages,
            |cfg, msgs| build_request(cfg, msgs, true),
            stream_deltas,
            on_chunk,
        )
    }

    fn models(&self) -> Vec<Model> {
        Self::static_models()
    }
}
