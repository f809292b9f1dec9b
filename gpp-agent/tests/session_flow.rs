use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use gpp_agent::{SessionError, SessionManager, SessionMode, TurnRequest};
use gpp_core::persona::DEFAULT_PERSONA_TEXT;
use gpp_core::{ChatStore, HistoryBrowser, Message, ParameterSet, PersonaResolver, Role};
use gpp_providers::{
    Auth, ChatCompletion, ChatRequest, FragmentStream, LLMProvider, OpenAiClient, ProviderResult,
    ResponseFragment,
};
use serde_json::json;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Answers every request with the same scripted pieces and remembers what
/// it was sent
struct ScriptedProvider {
    pieces: Vec<&'static str>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    fn new(pieces: Vec<&'static str>) -> Self {
        Self {
            pieces,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn last_request(&self) -> ChatRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn chat(&self, request: &ChatRequest) -> ProviderResult<ChatCompletion> {
        self.requests.lock().unwrap().push(request.clone());
        ChatCompletion::from_response(json!({
            "object": "chat.completion",
            "choices": [{"message": {"role": "assistant", "content": self.pieces.concat()}}]
        }))
    }

    async fn chat_stream(&self, request: &ChatRequest) -> ProviderResult<FragmentStream> {
        self.requests.lock().unwrap().push(request.clone());
        let fragments: Vec<ProviderResult<ResponseFragment>> = self
            .pieces
            .iter()
            .map(|piece| {
                Ok(ResponseFragment::from_chunk(json!({
                    "object": "chat.completion.chunk",
                    "choices": [{"index": 0, "delta": {"content": piece}}]
                })))
            })
            .collect();
        Ok(Box::pin(futures::stream::iter(fragments)))
    }

    fn endpoint(&self) -> String {
        "scripted://chat/completions".to_string()
    }
}

fn open_store(temp_dir: &TempDir) -> ChatStore {
    let ticks = Arc::new(AtomicI64::new(0));
    ChatStore::open(temp_dir.path()).unwrap().with_clock(move || {
        let n = ticks.fetch_add(1, Ordering::SeqCst);
        NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
            + Duration::minutes(n)
    })
}

fn builtin() -> ParameterSet {
    ParameterSet::new()
        .with("model", "gpt-4o")
        .with("max_tokens", 3072)
        .with("temperature", 0.3)
}

fn words(text: &str) -> Vec<String> {
    text.split(' ').map(String::from).collect()
}

#[tokio::test]
async fn streamed_turn_is_echoed_and_saved() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir);
    let personas = PersonaResolver::for_store(&store).unwrap();
    let manager = SessionManager::new(&store, &personas, builtin());
    let provider = ScriptedProvider::new(vec!["Hei", "", " på", " deg"]);

    let turn = manager
        .prepare(TurnRequest::new(words("si hei")), std::io::empty())
        .unwrap();
    let mut echoed = String::new();
    let completed = manager
        .run(&provider, turn, true, |f| {
            if let Some(text) = f.text() {
                echoed.push_str(text);
            }
        })
        .await
        .unwrap();

    assert_eq!(echoed, "Hei på deg");
    let saved = store.read(&completed.handle).unwrap();
    assert_eq!(saved.persona_name, "default");
    assert_eq!(saved.raw_responses.len(), 4);
    assert_eq!(
        saved.messages.last(),
        Some(&Message::assistant("Hei på deg"))
    );
    assert_eq!(
        saved.system_message().map(|m| m.content.as_str()),
        Some(DEFAULT_PERSONA_TEXT)
    );

    let request = provider.last_request();
    assert_eq!(request.model(), "gpt-4o");
    assert_eq!(request.messages.len(), 2);
}

#[tokio::test]
async fn marker_continues_newest_conversation() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir);
    let personas = PersonaResolver::for_store(&store).unwrap();
    let manager = SessionManager::new(&store, &personas, builtin());
    let provider = ScriptedProvider::new(vec!["Ikke ", "mye."]);

    let first = manager
        .prepare(TurnRequest::new(words("hei")), std::io::empty())
        .unwrap();
    let first = manager.run(&provider, first, false, |_| {}).await.unwrap();

    let turn = manager
        .prepare(TurnRequest::new(words("... hva skjer")), std::io::empty())
        .unwrap();
    assert_eq!(turn.mode(), SessionMode::Continue);
    let second = manager.run(&provider, turn, true, |_| {}).await.unwrap();

    assert_eq!(second.handle, first.handle);
    assert_eq!(store.list_records().unwrap().len(), 1);

    let saved = store.read(&second.handle).unwrap();
    assert!(saved.is_well_formed());
    let users: Vec<&str> = saved
        .messages
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(users, vec!["hei", "hva skjer"]);
    assert_eq!(saved.parameters, first.record.parameters);
    // One single-shot response plus two streamed chunks
    assert_eq!(saved.raw_responses.len(), 3);

    let request = provider.last_request();
    assert_eq!(request.messages.len(), 4);
}

#[tokio::test]
async fn recall_orders_newest_first() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir);
    let personas = PersonaResolver::for_store(&store).unwrap();
    let manager = SessionManager::new(&store, &personas, builtin());
    let provider = ScriptedProvider::new(vec!["ok"]);

    for question in ["første", "andre"] {
        let turn = manager
            .prepare(TurnRequest::new(words(question)), std::io::empty())
            .unwrap();
        manager.run(&provider, turn, false, |_| {}).await.unwrap();
    }

    let history = HistoryBrowser::new(&store);
    let (_, newest) = history.recall(1).unwrap();
    let (_, older) = history.recall(2).unwrap();
    assert_eq!(newest.first_of(Role::User).unwrap().content, "andre");
    assert_eq!(older.first_of(Role::User).unwrap().content, "første");
    assert!(history.recall(3).is_err());
}

#[tokio::test]
async fn connection_failure_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir);
    let personas = PersonaResolver::for_store(&store).unwrap();
    let manager = SessionManager::new(&store, &personas, builtin());
    let provider = OpenAiClient::new("http://127.0.0.1:1/v1", Auth::None);

    let turn = manager
        .prepare(TurnRequest::new(words("hallo")), std::io::empty())
        .unwrap();
    let err = manager
        .run(&provider, turn, true, |_| {})
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Provider(_)));
    assert!(err.is_resolution_failure());
    assert_eq!(
        err.unreachable_endpoint(),
        Some("http://127.0.0.1:1/v1/chat/completions")
    );
    assert!(store.list_records().unwrap().is_empty());
}
