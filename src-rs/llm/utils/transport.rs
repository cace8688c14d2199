use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::io::Read;
use std::time::Duration;

use crate::cons::provider_cons::{CONNECT_TIMEOUT, READ_TIMEOUT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// A fully prepared provider call. Bodies are JSON because every provider
/// speaks JSON on the request side.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Some(body),
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

pub trait HttpTransport: Send + Sync {
    /// Performs the request and buffers the whole reply body.
    fn execute(&self, request: &HttpRequest) -> Result<HttpReply>;

    /// Performs the request and hands every received network buffer to
    /// `on_data` while the status is 200. Reading stops as soon as `on_data`
    /// returns `false`. For any other status the body is buffered into the
    /// returned reply and `on_data` is never called.
    fn execute_streaming(
        &self,
        request: &HttpRequest,
        on_data: &mut dyn FnMut(&[u8]) -> bool,
    ) -> Result<HttpReply>;
}

/// Blocking transport backed by `reqwest::blocking`. Must be driven from a
/// plain thread, never from inside an async runtime.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .user_agent("ida-re-llm/0.1.0")
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(READ_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("Failed to build HTTP client, using defaults: {}", e);
                reqwest::blocking::Client::new()
            });
        Self { client }
    }

    fn send(&self, request: &HttpRequest) -> Result<reqwest::blocking::Response> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        for (k, v) in &request.headers {
            builder = builder.header(k, v);
        }
        if let Some(body) = &request.body {
            builder = builder.body(serde_json::to_string(body).context("Failed to encode request body")?);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        // Gemini carries its key in the query string, so the URL never reaches error text.
        builder.send().map_err(|e| anyhow!("{}", e.without_url()))
    }
}

fn read_error(e: std::io::Error) -> anyhow::Error {
    let kind = e.kind();
    match e.into_inner().map(|inner| inner.downcast::<reqwest::Error>()) {
        Some(Ok(inner)) => anyhow!("Stream read error: {}", (*inner).without_url()),
        Some(Err(other)) => anyhow!("Stream read error: {}", other),
        None => anyhow!("Stream read error: {}", kind),
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport for ReqwestTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpReply> {
        let response = self.send(request)?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| anyhow!("Failed to read response body: {}", e.without_url()))?;
        Ok(HttpReply { status, body })
    }

    fn execute_streaming(
        &self,
        request: &HttpRequest,
        on_data: &mut dyn FnMut(&[u8]) -> bool,
    ) -> Result<HttpReply> {
        let mut response = self.send(request)?;
        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().unwrap_or_default();
            return Ok(HttpReply { status, body });
        }

        let mut buf = [0u8; 8192];
        loop {
            let n = response.read(&mut buf).map_err(read_error)?;
            if n == 0 {
                break;
            }
            if !on_data(&buf[..n]) {
                log::debug!("Stream reader stopped by consumer");
                break;
            }
        }
        // Dropping the response closes the connection.
        Ok(HttpReply {
            status,
            body: String::new(),
        })
    }
}
