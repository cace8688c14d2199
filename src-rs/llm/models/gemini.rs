use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use url::Url;

use crate::cons::provider_cons::{Provider, GEMINI_BASE_URL};
use crate::llm::models::provider_base::{
    merged_system_prompt, run_send, run_stream, str_at, u32_at, ClientConfig, ClientState,
    Message, Model, ParsedReply, ProviderClient, Response, Role,
};
use crate::llm::utils::transport::{HttpRequest, HttpTransport};

pub const GEMINI_DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Google AI client. The host is fixed; the API key travels as the `key`
/// query parameter.
pub struct GeminiClient {
    state: ClientState,
    transport: Arc<dyn HttpTransport>,
}

impl GeminiClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            state: ClientState::new(ClientConfig::with_model(GEMINI_DEFAULT_MODEL)),
            transport,
        }
    }

    pub fn static_models() -> Vec<Model> {
        vec![
            Model::new("gemini-2.0-flash-exp", "Gemini 2.0 Flash Experimental (Free)", Provider::Gemini, 1_000_000),
            Model::new("gemini-2.0-flash-thinking-exp-1219", "Gemini 2.0 Flash Thinking Exp", Provider::Gemini, 1_000_000),
            Model::new("gemini-1.5-flash", "Gemini 1.5 Flash", Provider::Gemini, 1_000_000),
            Model::new("gemini-1.5-flash-8b", "Gemini 1.5 Flash 8B", Provider::Gemini, 1_000_000),
            Model::new("gemini-1.5-pro", "Gemini 1.5 Pro", Provider::Gemini, 2_000_000),
        ]
    }
}

pub(crate) fn build_body(cfg: &ClientConfig, messages: &[Message]) -> Value {
    let contents: Vec<Value> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let role = if m.role == Role::Assistant { "model" } else { "user" };
            json!({ "role": role, "parts": [{ "text": m.content }] })
        })
        .collect();

    let mut body = json!({
        "contents": contents,
        "generationConfig": {
            "maxOutputTokens": cfg.max_tokens,
            "temperature": cfg.temperature,
        },
    });
    if let Some(system) = merged_system_prompt(cfg, messages) {
        body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }
    body
}

pub(crate) fn endpoint(cfg: &ClientConfig, stream: bool) -> Result<String> {
    let action = if stream { "streamGenerateContent" } else { "generateContent" };
    let mut url = Url::parse(GEMINI_BASE_URL).context("Invalid Gemini base URL")?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("Gemini base URL cannot carry a path"))?
        .push("v1beta")
        .push("models")
        .push(&format!("{}:{}", cfg.model, action));
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("key", &cfg.api_key);
        if stream {
            query.append_pair("alt", "sse");
        }
    }
    Ok(url.to_string())
}

fn build_request(cfg: &ClientConfig, messages: &[Message], stream: bool) -> Result<HttpRequest> {
    Ok(HttpRequest::post(endpoint(cfg, stream)?, build_body(cfg, messages)))
}

fn candidate_texts(json: &Value) -> Vec<String> {
    json.pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn parse_reply(json: &Value, cfg: &ClientConfig) -> Result<ParsedReply> {
    let mut reply = ParsedReply::default();

    if let Some(candidates) = json.get("candidates") {
        if !candidates.is_array() {
            return Err(anyhow!("'candidates' is not an array"));
        }
        reply.content = candidate_texts(json).concat();
        reply.finish_reason = str_at(json, "/candidates/0/finishReason")
            .unwrap_or_default()
            .to_string();
    }

    reply.usage.input = u32_at(json, "/usageMetadata/promptTokenCount");
    reply.usage.output = u32_at(json, "/usageMetadata/candidatesTokenCount");
    reply.model = cfg.model.clone();
    Ok(reply)
}

/// Every text part of `candidates[0]`, one chunk each.
pub(crate) fn stream_deltas(event: &Value) -> Vec<String> {
    candidate_texts(event)
}

impl ProviderClient for GeminiClient {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    fn state(&self) -> &ClientState {
        &self.state
    }

    fn send(&self, messages: &[Message]) -> Response {
        run_send(
            &self.state,
            self.transport.as_ref(),
            Provider::Gemini,
            messages,
            |cfg, msgs| build_request(cfg, msgs, false),
            parse_reply,
        )
    }

    fn stream(&self, messages: &[Message], on_chunk: &mut dyn FnMut(&str)) {
        run_stream(
            &self.state,
            self.transport.as_ref(),
            Provider::Gemini,
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
