//! Client for OpenAI-compatible `/chat/completions` endpoints

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, trace};

use crate::base::{
    ChatCompletion, ChatRequest, FragmentStream, LLMProvider, ProviderError, ProviderResult,
    ResponseFragment,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DONE_SENTINEL: &str = "[DONE]";

/// How the client authenticates
#[derive(Clone)]
pub enum Auth {
    /// `Authorization: Bearer <key>` (OpenAI)
    Bearer(String),
    /// `api-key: <key>` (Azure OpenAI)
    ApiKeyHeader(String),
    None,
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::Bearer(_) => f.write_str("Bearer(***)"),
            Auth::ApiKeyHeader(_) => f.write_str("ApiKeyHeader(***)"),
            Auth::None => f.write_str("None"),
        }
    }
}

/// OpenAI-compatible chat completion client
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    api_base: String,
    auth: Auth,
    query: Vec<(String, String)>,
}

impl OpenAiClient {
    pub fn new(api_base: impl Into<String>, auth: Auth) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            auth,
            query: Vec::new(),
        }
    }

    /// Add a query parameter to every request
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    fn apply_headers(&self, req_builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Auth::Bearer(key) => req_builder.header("Authorization", format!("Bearer {}", key)),
            Auth::ApiKeyHeader(key) => req_builder.header("api-key", key),
            Auth::None => req_builder,
        }
    }

    /// Send the request and check the status; transport failures become
    /// `Connection` errors naming the endpoint
    async fn send(&self, request: &ChatRequest, stream: bool) -> ProviderResult<Response> {
        let url = self.endpoint();
        debug!(
            "Sending {} chat request to {} with model {}",
            if stream { "streaming" } else { "single" },
            url,
            request.model()
        );

        let body = request.to_body(stream)?;
        let response = self
            .apply_headers(self.client.post(&url).json(&body))
            .send()
            .await
            .map_err(|e| transport_error(e, &url))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::ApiError(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }
        Ok(response)
    }
}

fn transport_error(err: reqwest::Error, url: &str) -> ProviderError {
    if err.is_connect() || err.is_timeout() {
        ProviderError::Connection {
            url: url.to_string(),
            source: err,
        }
    } else {
        ProviderError::HttpError(err)
    }
}

/// Drain complete server-sent events from `buffer`, returning their data
/// payloads. Bytes of an incomplete event stay in the buffer, so multi-byte
/// characters split across network chunks survive.
pub(crate) fn parse_sse_events(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut events = Vec::new();
    while let Some((pos, delimiter_len)) = find_event_end(buffer) {
        let raw: Vec<u8> = buffer.drain(..pos + delimiter_len).take(pos).collect();
        let raw = String::from_utf8_lossy(&raw);

        let data_lines: Vec<&str> = raw
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(str::trim)
            .collect();

        if !data_lines.is_empty() {
            events.push(data_lines.join("\n"));
        }
    }
    events
}

fn find_event_end(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    let crlf = buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|p| (p, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// State threaded through the fragment stream
struct SseState {
    response: Response,
    url: String,
    buffer: Vec<u8>,
    pending: VecDeque<String>,
    finished: bool,
}

impl SseState {
    async fn next_fragment(mut self) -> Option<(ProviderResult<ResponseFragment>, Self)> {
        loop {
            if let Some(payload) = self.pending.pop_front() {
                if payload == DONE_SENTINEL {
                    trace!("Stream finished");
                    return None;
                }
                let item = serde_json::from_str::<Value>(&payload)
                    .map(ResponseFragment::from_chunk)
                    .map_err(ProviderError::from);
                if item.is_err() {
                    self.finished = true;
                    self.pending.clear();
                }
                return Some((item, self));
            }

            if self.finished {
                return None;
            }

            match self.response.chunk().await {
                Ok(Some(bytes)) => {
                    self.buffer.extend_from_slice(&bytes);
                    self.pending.extend(parse_sse_events(&mut self.buffer));
                }
                Ok(None) => {
                    // Servers may close without a trailing blank line
                    self.buffer.extend_from_slice(b"\n\n");
                    self.pending.extend(parse_sse_events(&mut self.buffer));
                    self.finished = true;
                }
                Err(err) => {
                    self.finished = true;
                    let err = transport_error(err, &self.url);
                    return Some((Err(err), self));
                }
            }
        }
    }
}

#[async_trait]
impl LLMProvider for OpenAiClient {
    async fn chat(&self, request: &ChatRequest) -> ProviderResult<ChatCompletion> {
        let response = self.send(request, false).await?;
        let raw: Value = response
            .json()
            .await
            .map_err(|e| transport_error(e, &self.endpoint()))?;
        ChatCompletion::from_response(raw)
    }

    async fn chat_stream(&self, request: &ChatRequest) -> ProviderResult<FragmentStream> {
        let response = self.send(request, true).await?;
        let state = SseState {
            response,
            url: self.endpoint(),
            buffer: Vec::new(),
            pending: VecDeque::new(),
            finished: false,
        };
        Ok(Box::pin(futures::stream::unfold(
            state,
            SseState::next_fragment,
        )))
    }

    fn endpoint(&self) -> String {
        let mut url = format!("{}/chat/completions", self.api_base);
        for (i, (key, value)) in self.query.iter().enumerate() {
            url.push(if i == 0 { '?' } else { '&' });
            url.push_str(key);
            url.push('=');
            url.push_str(value);
        }
        url
    }
}
