use crate::llm::models::claude::{build_body, parse_reply, stream_deltas, ClaudeClient, CLAUDE_DEFAULT_MODEL};
use crate::llm::models::provider_base::{ClientConfig, Message, ProviderClient};
use crate::llm::utils::transport::HttpMethod;
use crate::tests::support::mock_transport::MockTransport;
use serde_json::json;
use std::sync::Arc;

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> (Arc<MockTransport>, ClaudeClient) {
        let transport = Arc::new(MockTransport::new());
        let client = ClaudeClient::new(transport.clone());
        (transport, client)
    }

    #[test]
    fn build_body_moves_system_messages_into_system_field() {
        let mut cfg = ClientConfig::with_model("claude-x");
        cfg.system_prompt = "You are a reverser.".to_string();
        let messages = vec![Message::system("Prefer C names."), Message::user("hi")];

        let body = build_body(&cfg, &messages, false);
        assert_eq!(body["system"], "You are a reverser.\nPrefer C names.");
        assert_eq!(body["messages"], json!([{ "role": "user", "content": "hi" }]));
        assert_eq!(body["max_tokens"], 4096);
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn build_body_omits_system_when_empty_and_flags_stream() {
        let cfg = ClientConfig::with_model("claude-x");
        let body = build_body(&cfg, &[Message::user("hi")], true);
        assert!(body.get("system").is_none());
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn parse_reply_concatenates_text_blocks() {
        let cfg = ClientConfig::with_model("fallback");
        let json = json!({
            "model": "claude-sonnet-4-5-20250929",
            "content": [
                { "type": "text", "text": "Hello " },
                { "type": "tool_use", "id": "t1" },
                { "type": "text", "text": "world" }
            ],
            "stop_reason": "end_turn",
            "usage": { "input_tokens": 12, "output_tokens": 3 }
        });
        let reply = parse_reply(&json, &cfg).unwrap();
        assert_eq!(reply.content, "Hello world");
        assert_eq!(reply.finish_reason, "end_turn");
        assert_eq!(reply.usage.input, 12);
        assert_eq!(reply.usage.output, 3);
        assert_eq!(reply.model, "claude-sonnet-4-5-20250929");
    }

    #[test]
    fn stream_deltas_only_yields_text_deltas() {
        let text = json!({ "type": "content_block_delta", "delta": { "type": "text_delta", "text": "Hi" } });
        let json_delta = json!({ "type": "content_block_delta", "delta": { "type": "input_json_delta", "partial_json": "{" } });
        let start = json!({ "type": "message_start", "message": {} });
        assert_eq!(stream_deltas(&text), vec!["Hi".to_string()]);
        assert!(stream_deltas(&json_delta).is_empty());
        assert!(stream_deltas(&start).is_empty());
    }

    #[test]
    fn send_without_key_makes_no_request() {
        let (transport, client) = client();
        let r = client.send_text("hello");
        assert!(!r.success);
        assert_eq!(r.error, "API key not set");
        assert_eq!(transport.calls(), 0);
        assert!(!client.is_busy());
    }

    #[test]
    fn send_posts_messages_request_with_headers() {
        let (transport, client) = client();
        client.set_api_key("sk-ant");
        transport.reply(
            200,
            r#"{"content":[{"type":"text","text":"Hi there"}],"stop_reason":"end_turn","usage":{"input_tokens":5,"output_tokens":2}}"#,
        );

        let r = client.send_text("hello");
        assert!(r.success, "{}", r.error);
        assert_eq!(r.content, "Hi there");
        assert_eq!(r.model, CLAUDE_DEFAULT_MODEL);
        assert_eq!(r.usage.total(), 7);

        let req = transport.last_request();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "https://api.anthropic.com/v1/messages");
        assert_eq!(req.header_value("x-api-key"), Some("sk-ant"));
        assert_eq!(req.header_value("anthropic-version"), Some("2023-06-01"));
        assert_eq!(req.header_value("Content-Type"), Some("application/json"));
    }

    #[test]
    fn send_reports_error_envelope_message() {
        let (transport, client) = client();
        client.set_api_key("k");
        transport.reply(401, r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#);

        let r = client.send_text("hello");
        assert!(!r.success);
        assert_eq!(r.error, "invalid x-api-key");
    }

    #[test]
    fn send_reports_parse_errors() {
        let (transport, client) = client();
        client.set_api_key("k");
        transport.reply(200, "<html>oops</html>");

        let r = client.send_text("hello");
        assert!(!r.success);
        assert!(r.error.starts_with("Parse error:"), "{}", r.error);
    }

    #[test]
    fn base_url_override_accepts_bare_host() {
        let (transport, client) = client();
        client.set_api_key("k");
        client.set_base_url("claude-proxy.internal/");
        transport.reply(200, r#"{"content":[]}"#);

        let r = client.send_text("hello");
        assert!(r.success);
        assert_eq!(transport.last_request().url, "https://claude-proxy.internal/v1/messages");
    }

    #[test]
    fn stream_emits_text_until_done() {
        let (transport, client) = client();
        client.set_api_key("k");
        transport.stream_lines(&[
            "event: content_block_delta",
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#,
            "",
            "data: [DONE]",
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"late"}}"#,
        ]);

        let mut chunks = Vec::new();
        client.stream_text("hello", &mut |t| chunks.push(t.to_string()));
        assert_eq!(chunks, vec!["Hi".to_string()]);
        assert_eq!(transport.last_request().body.unwrap()["stream"], true);
        assert!(!client.is_busy());
    }

    #[test]
    fn stream_reassembles_utf8_split_across_buffers() {
        let (transport, client) = client();
        client.set_api_key("k");
        let line = "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"h\u{e9}\"}}\n";
        let bytes = line.as_bytes();
        let split = line.find('\u{e9}').unwrap() + 1;
        transport.push(crate::tests::support::mock_transport::Scripted::Stream(vec![
            bytes[..split].to_vec(),
            bytes[split..].to_vec(),
        ]));

        let mut chunks = Vec::new();
        client.stream_text("hello", &mut |t| chunks.push(t.to_string()));
        assert_eq!(chunks, vec!["h\u{e9}".to_string()]);
    }

    #[test]
    fn stream_with_http_error_emits_nothing() {
        let (transport, client) = client();
        client.set_api_key("k");
        transport.reply(529, r#"{"error":{"message":"Overloaded"}}"#);

        let mut calls = 0;
        client.stream_text("hello", &mut |_| calls += 1);
        assert_eq!(calls, 0);
        assert!(!client.is_busy());
    }
}
