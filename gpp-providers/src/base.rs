//! Base trait for chat completion providers

use async_trait::async_trait;
use futures::stream::{self, Stream};
use gpp_core::{Message, ParameterSet};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::pin::Pin;
use thiserror::Error;

/// Error type for provider operations
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{source} Can't connect to {url}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("No API key: set {env} or write the key to {}", path.display())]
    MissingCredential { env: String, path: PathBuf },
}

impl ProviderError {
    /// Endpoint that could not be reached, for connection failures
    pub fn unreachable_endpoint(&self) -> Option<&str> {
        match self {
            ProviderError::Connection { url, .. } => Some(url),
            _ => None,
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Lazy, finite sequence of streamed response pieces in arrival order
pub type FragmentStream = Pin<Box<dyn Stream<Item = ProviderResult<ResponseFragment>> + Send>>;

/// A chat completion request: the full conversation plus parameters
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub params: ParameterSet,
}

impl ChatRequest {
    /// Build a request; the parameters must name a model
    pub fn new(messages: Vec<Message>, params: ParameterSet) -> ProviderResult<Self> {
        if params.model().map(str::trim).unwrap_or("").is_empty() {
            return Err(ProviderError::ConfigError(
                "no model selected for the request".to_string(),
            ));
        }
        Ok(Self { messages, params })
    }

    pub fn model(&self) -> &str {
        self.params.model().unwrap_or_default()
    }

    /// JSON body for `/chat/completions`
    pub fn to_body(&self, stream: bool) -> ProviderResult<Value> {
        let mut body: Map<String, Value> = self.params.as_map().clone();
        body.insert("messages".to_string(), serde_json::to_value(&self.messages)?);
        body.insert("stream".to_string(), Value::Bool(stream));
        Ok(Value::Object(body))
    }
}

/// One streamed chunk: the parsed chunk object and its piece of text
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFragment {
    pub raw: Value,
    pub text: Option<String>,
}

impl ResponseFragment {
    /// Wrap a parsed `chat.completion.chunk` object
    pub fn from_chunk(raw: Value) -> Self {
        let text = raw
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
            .map(str::to_string);
        Self { raw, text }
    }

    /// Text of the fragment, ignoring fragments that carry none
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }
}

/// A complete, non-streamed response
#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletion {
    pub raw: Value,
    pub content: String,
}

impl ChatCompletion {
    /// Wrap a parsed `chat.completion` object
    pub fn from_response(raw: Value) -> ProviderResult<Self> {
        let message = raw
            .pointer("/choices/0/message")
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".to_string()))?;
        let content = message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(Self { raw, content })
    }
}

/// Trait for chat completion providers
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Send a chat completion request and wait for the whole answer
    async fn chat(&self, request: &ChatRequest) -> ProviderResult<ChatCompletion>;

    /// Send a streaming chat completion request.
    ///
    /// Default behavior falls back to non-streaming chat and yields the
    /// whole answer as one fragment.
    async fn chat_stream(&self, request: &ChatRequest) -> ProviderResult<FragmentStream> {
        let completion = self.chat(request).await?;
        let fragment = ResponseFragment {
            raw: completion.raw,
            text: Some(completion.content),
        };
        Ok(Box::pin(stream::iter(vec![Ok(fragment)])))
    }

    /// URL requests are sent to
    fn endpoint(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_requires_model() {
        let err = ChatRequest::new(vec![Message::user("hi")], ParameterSet::new()).unwrap_err();
        assert!(matches!(err, ProviderError::ConfigError(_)));
    }

    #[test]
    fn test_request_body_flattens_parameters() {
        let params = ParameterSet::new()
            .with("model", "gpt-4o")
            .with("temperature", 0.3)
            .with("seed", 1);
        let request = ChatRequest::new(
            vec![Message::system("sys"), Message::user("hei")],
            params,
        )
        .unwrap();

        let body = request.to_body(true).unwrap();
        assert_eq!(body["model"], json!("gpt-4o"));
        assert_eq!(body["temperature"], json!(0.3));
        assert_eq!(body["seed"], json!(1));
        assert_eq!(body["stream"], json!(true));
        assert_eq!(
            body["messages"],
            json!([
                {"role": "system", "content": "sys"},
                {"role": "user", "content": "hei"}
            ])
        );
    }

    #[test]
    fn test_fragment_text_extraction() {
        let with_text = ResponseFragment::from_chunk(json!({
            "choices": [{"index": 0, "delta": {"content": "Hei"}}]
        }));
        assert_eq!(with_text.text(), Some("Hei"));

        let role_only = ResponseFragment::from_chunk(json!({
            "choices": [{"index": 0, "delta": {"role": "assistant"}}]
        }));
        assert_eq!(role_only.text(), None);

        let empty = ResponseFragment::from_chunk(json!({
            "choices": [{"index": 0, "delta": {"content": ""}}]
        }));
        assert_eq!(empty.text(), None);

        let usage_only = ResponseFragment::from_chunk(json!({"choices": [], "usage": {}}));
        assert_eq!(usage_only.text(), None);
    }

    #[test]
    fn test_completion_parsing() {
        let completion = ChatCompletion::from_response(json!({
            "choices": [{"message": {"role": "assistant", "content": "Hallo"}}]
        }))
        .unwrap();
        assert_eq!(completion.content, "Hallo");

        assert!(ChatCompletion::from_response(json!({"choices": []})).is_err());
    }
}
