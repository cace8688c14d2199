use crate::cons::provider_cons::Provider;
use crate::llm::models::provider_handle::{LlmManager, ProviderClient};
use crate::tests::support::mock_transport::{MockTransport, Scripted};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (Arc<MockTransport>, LlmManager) {
        let transport = Arc::new(MockTransport::new());
        let manager = LlmManager::with_transport(transport.clone());
        (transport, manager)
    }

    fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn default_provider_is_claude() {
        let (_, manager) = manager();
        assert_eq!(manager.get_provider(), Provider::Claude);
        assert_eq!(manager.active().provider(), Provider::Claude);
    }

    #[test]
    fn send_routes_to_selected_provider() {
        let (transport, manager) = manager();
        manager.gemini().set_api_key("g");
        manager.set_provider(Provider::Gemini);
        transport.reply(200, r#"{"candidates":[{"content":{"parts":[{"text":"from gemini"}]}}]}"#);

        let r = manager.send_text("hi");
        assert_eq!(r.provider, Provider::Gemini);
        assert_eq!(r.content, "from gemini");
        assert!(transport.last_request().url.starts_with("https://generativelanguage.googleapis.com/"));
    }

    #[test]
    fn keys_are_per_provider() {
        let (transport, manager) = manager();
        manager.claude().set_api_key("c");
        manager.set_provider(Provider::OpenAI);

        let r = manager.send_text("hi");
        assert_eq!(r.error, "API key not set");
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn every_provider_normalises_failures_the_same_way() {
        for provider in Provider::ALL {
            let (transport, manager) = manager();
            manager.set_provider(provider);

            let r = manager.send_text("hi");
            assert_eq!(r.error, "API key not set", "{}", provider);
            assert_eq!(transport.calls(), 0, "{}", provider);

            manager.client(provider).set_api_key("k");
            transport.reply(400, r#"{"error":{"message":"X"}}"#);
            let r = manager.send_text("hi");
            assert!(!r.success, "{}", provider);
            assert_eq!(r.error, "X", "{}", provider);

            transport.reply(200, "{\"truncated\": ");
            let r = manager.send_text("hi");
            assert!(!r.ok(), "{}", provider);
            assert!(r.error.starts_with("Parse error:"), "{}: {}", provider, r.error);
            assert_eq!(r.provider, provider);
        }
    }

    #[test]
    fn all_models_lists_static_catalogs_only() {
        let (transport, manager) = manager();
        let models = manager.all_models();
        assert_eq!(models.len(), 4 + 3 + 5);
        assert!(models.iter().all(|m| m.provider != Provider::OpenRouter));
        assert!(models.iter().any(|m| m.id == "gemini-1.5-pro" && m.context_window == 2_000_000));
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn analysis_helpers_wrap_code_in_c_fence() {
        let (transport, manager) = manager();
        manager.openai().set_api_key("k");
        manager.set_provider(Provider::OpenAI);
        transport.reply(200, r#"{"choices":[{"message":{"content":"sub_401000 -> parse_header"}}]}"#);

        let r = manager.suggest_name("int sub_401000() { return 0; }");
        assert!(r.success);

        let body = transport.last_request().body.unwrap();
        let last = body["messages"].as_array().unwrap().last().unwrap().clone();
        let content = last["content"].as_str().unwrap();
        assert!(content.ends_with("```c\nint sub_401000() { return 0; }\n```"), "{}", content);
    }

    #[test]
    fn busy_while_streaming_and_cleared_after() {
        let (transport, manager) = manager();
        manager.claude().set_api_key("k");
        transport.stream_lines(&[
            r#"data: {"type":"content_block_delta","delta":{"type":"text_delta","text":"x"}}"#,
            "data: [DONE]",
        ]);

        let mut busy_in_callback = false;
        let claude = manager.claude();
        claude.stream_text("hi", &mut |_| busy_in_callback = claude.is_busy());
        assert!(busy_in_callback);
        assert!(!manager.is_busy());
    }

    #[test]
    fn cancel_from_another_thread_stops_stream() {
        let (transport, manager) = manager();
        let manager = Arc::new(manager);
        manager.claude().set_api_key("k");
        let line = r#"data: {"type":"content_block_delta","delta":{"type":"text_delta","text":"."}}"#;
        transport.push(Scripted::Endless(format!("{}\n", line).into_bytes()));

        let chunks = Arc::new(AtomicUsize::new(0));
        let worker = {
            let manager = Arc::clone(&manager);
            let chunks = Arc::clone(&chunks);
            thread::spawn(move || {
                manager.stream_text("go", &mut |_| {
                    chunks.fetch_add(1, Ordering::SeqCst);
                });
            })
        };

        wait_until("first chunk", || chunks.load(Ordering::SeqCst) > 0);
        assert!(manager.is_busy());
        manager.cancel();
        worker.join().unwrap();

        assert!(!manager.is_busy());
        let seen = chunks.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(chunks.load(Ordering::SeqCst), seen);
        assert!(seen < 5_000);
    }

    #[test]
    fn overlapping_sends_on_one_client_are_serialised() {
        let (transport, manager) = manager();
        let manager = Arc::new(manager);
        manager.claude().set_api_key("k");
        transport.push(Scripted::Endless(b": keep-alive\n".to_vec()));
        transport.reply(200, r#"{"content":[{"type":"text","text":"second"}]}"#);

        let streamer = {
            let manager = Arc::clone(&manager);
            thread::spawn(move || manager.stream_text("first", &mut |_| {}))
        };
        wait_until("stream start", || manager.is_busy());

        let sender = {
            let manager = Arc::clone(&manager);
            thread::spawn(move || manager.send_text("second"))
        };
        thread::sleep(Duration::from_millis(30));
        assert_eq!(transport.calls(), 1, "second call must wait for the first");

        manager.cancel();
        streamer.join().unwrap();
        let r = sender.join().unwrap();
        assert!(r.success, "{}", r.error);
        assert_eq!(r.content, "second");
        assert_eq!(transport.calls(), 2);
    }

    #[test]
    fn cancel_reaches_stream_after_provider_switch() {
        let (transport, manager) = manager();
        let manager = Arc::new(manager);
        manager.claude().set_api_key("k");
        let line = r#"data: {"type":"content_block_delta","delta":{"type":"text_delta","text":"."}}"#;
        transport.push(Scripted::Endless(format!("{}\n", line).into_bytes()));

        let chunks = Arc::new(AtomicUsize::new(0));
        let worker = {
            let manager = Arc::clone(&manager);
            let chunks = Arc::clone(&chunks);
            thread::spawn(move || {
                manager.stream_text("go", &mut |_| {
                    chunks.fetch_add(1, Ordering::SeqCst);
                });
            })
        };
        wait_until("first chunk", || chunks.load(Ordering::SeqCst) > 0);

        manager.set_provider(Provider::Gemini);
        assert!(manager.is_busy());
        assert!(!manager.gemini().is_busy());

        manager.cancel();
        worker.join().unwrap();
        assert!(!manager.is_busy());
        assert!(!manager.claude().is_busy());
    }
}
