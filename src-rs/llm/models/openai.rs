use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::cons::provider_cons::{Provider, OPENAI_CHAT_PATH, OPENAI_DEFAULT_BASE_URL};
use crate::llm::models::provider_base::{
    origin_or, run_send, run_stream, str_at, u32_at, ClientConfig, ClientState, Message, Model,
    ParsedReply, ProviderClient, Response,
};
use crate::llm::utils::transport::{HttpRequest, HttpTransport};

pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o";

pub struct OpenAiClient {
    state: ClientState,
    transport: Arc<dyn HttpTransport>,
}

impl OpenAiClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            state: ClientState::new(ClientConfig::with_model(OPENAI_DEFAULT_MODEL)),
            transport,
        }
    }

    /// Overrides `api.openai.com`. A bare host is served over https.
    pub fn set_base_url(&self, url: &str) {
        self.state.update(|c| c.base_url = url.to_string());
    }

    pub fn static_models() -> Vec<Model> {
        vec![
            Model::new("gpt-4o", "GPT-4o", Provider::OpenAI, 128_000),
            Model::new("gpt-4o-mini", "GPT-4o Mini", Provider::OpenAI, 128_000),
            Model::new("gpt-4-turbo", "GPT-4 Turbo", Provider::OpenAI, 128_000),
        ]
    }
}

/// Chat-completions body shared with OpenRouter. The configured system
/// prompt is prepended as `messages[0]`; caller messages pass through as-is.
pub(crate) fn build_chat_completions_body(cfg: &ClientConfig, messages: &[Message], stream: bool) -> Value {
    let mut converted: Vec<Value> = Vec::with_capacity(messages.len() + 1);
    if !cfg.system_prompt.is_empty() {
        converted.push(json!({ "role": "system", "content": cfg.system_prompt }));
    }
    converted.extend(
        messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content })),
    );

    let mut body = json!({
        "model": cfg.model,
        "max_tokens": cfg.max_tokens,
        "messages": converted,
    });
    if stream {
        body["stream"] = json!(true);
    }
    body
}

pub(crate) fn parse_chat_completions_reply(json: &Value, cfg: &ClientConfig) -> Result<ParsedReply> {
    let mut reply = ParsedReply::default();

    if let Some(choices) = json.get("choices") {
        let choices = choices
            .as_array()
            .ok_or_else(|| anyhow!("'choices' is not an array"))?;
        if let Some(choice) = choices.first() {
            reply.content = str_at(choice, "/message/content").unwrap_or_default().to_string();
            reply.finish_reason = str_at(choice, "/finish_reason").unwrap_or_default().to_string();
        }
    }

    reply.usage.input = u32_at(json, "/usage/prompt_tokens");
    reply.usage.output = u32_at(json, "/usage/completion_tokens");
    reply.model = str_at(json, "/model").unwrap_or(&cfg.model).to_string();
    Ok(reply)
}

/// Text at `choices[0].delta.content`.
pub(crate) fn chat_completions_deltas(event: &Value) -> Vec<String> {
    str_at(event, "/choices/0/delta/content")
        .map(|t| vec![t.to_string()])
        .unwrap_or_default()
}

fn build_request(cfg: &ClientConfig, messages: &[Message], stream: bool) -> Result<HttpRequest> {
    let url = format!(
        "{}{}",
        origin_or(&cfg.base_url, OPENAI_DEFAULT_BASE_URL),
        OPENAI_CHAT_PATH
    );
    Ok(HttpRequest::post(url, build_chat_completions_body(cfg, messages, stream))
        .header("Authorization", format!("Bearer {}", cfg.api_key)))
}

impl ProviderClient for OpenAiClient {
    fn provider(&self) -> Provider {
        Provider::OpenAI
    }

    fn state(&self) -> &ClientState {
        &self.state
    }

    fn send(&self, messages: &[Message]) -> Response {
        run_send(
            &self.state,
            self.transport.as_ref(),
            Provider::OpenAI,
            messages,
            |cfg, msgs| build_request(cfg, msgs, false),
            parse_chat_completions_reply,
        )
    }

    fn stream(&self, messages: &[Message], on_chunk: &mut dyn FnMut(&str)) {
        run_stream(
            &self.state,
            self.transport.as_ref(),
            Provider::OpenAI,
            messages,
            |cfg, msgs| build_request(cfg, msgs, true),
            chat_completions_deltas,
            on_chunk,
        )
    }

    fn models(&self) -> Vec<Model> {
        Self::static_models()
    }
}
