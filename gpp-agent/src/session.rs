//! One question/answer turn, from choosing the conversation to saving it

use gpp_core::chat::params::keys;
use gpp_core::chat::DEFAULT_PERSONA;
use gpp_core::{
    merge, ChatStore, ConversationRecord, Message, ParameterSet, PersonaResolver, RecordHandle,
};
use gpp_providers::{ChatRequest, LLMProvider, ProviderError, ResponseFragment};
use std::io::Read;
use thiserror::Error;
use tracing::{debug, info};

use crate::aggregator::{aggregate_single, aggregate_stream, AggregatedResponse};

/// Error type for a session turn
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Core(#[from] gpp_core::Error),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Failed to read the question from stdin: {0}")]
    Stdin(#[source] std::io::Error),
}

impl SessionError {
    /// Endpoint that could not be reached, for connection failures
    pub fn unreachable_endpoint(&self) -> Option<&str> {
        match self {
            SessionError::Provider(e) => e.unreachable_endpoint(),
            _ => None,
        }
    }

    /// Failures caused by what the user asked for rather than by the
    /// system: unknown persona, nothing to continue or recall, unreachable
    /// server
    pub fn is_resolution_failure(&self) -> bool {
        matches!(
            self,
            SessionError::Core(
                gpp_core::Error::UnknownPersona { .. }
                    | gpp_core::Error::NoPriorConversation
                    | gpp_core::Error::OutOfRange { .. }
            )
        ) || self.unreachable_endpoint().is_some()
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Whether to start over or extend the newest conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    #[default]
    New,
    Continue,
}

/// What the user asked for on the command line
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub mode: SessionMode,
    pub persona: String,
    /// Parameters given explicitly; they beat every other source
    pub explicit: ParameterSet,
    /// Question words; empty means the question comes from stdin
    pub question: Vec<String>,
}

impl TurnRequest {
    pub fn new(question: Vec<String>) -> Self {
        Self {
            mode: SessionMode::New,
            persona: DEFAULT_PERSONA.to_string(),
            explicit: ParameterSet::new(),
            question,
        }
    }

    pub fn with_mode(mut self, mode: SessionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    pub fn with_explicit(mut self, explicit: ParameterSet) -> Self {
        self.explicit = explicit;
        self
    }
}

/// A conversation with the user's message appended, waiting for the answer
#[derive(Debug, Clone)]
pub struct PendingTurn {
    /// Record being continued; `None` for a new conversation
    pub handle: Option<RecordHandle>,
    pub record: ConversationRecord,
    /// Effective parameters for the API call
    pub params: ParameterSet,
    /// A persona was requested that differs from the continued record's
    pub persona_mismatch: bool,
}

impl PendingTurn {
    pub fn mode(&self) -> SessionMode {
        if self.handle.is_some() {
            SessionMode::Continue
        } else {
            SessionMode::New
        }
    }

    pub fn model(&self) -> &str {
        self.params.model().unwrap_or_default()
    }
}

/// A saved turn
#[derive(Debug, Clone)]
pub struct CompletedTurn {
    pub handle: RecordHandle,
    pub record: ConversationRecord,
    pub response: AggregatedResponse,
}

/// Drives a turn through the chat store, persona resolver and provider
pub struct SessionManager<'a> {
    store: &'a ChatStore,
    personas: &'a PersonaResolver,
    builtin: ParameterSet,
}

impl<'a> SessionManager<'a> {
    pub fn new(store: &'a ChatStore, personas: &'a PersonaResolver, builtin: ParameterSet) -> Self {
        Self {
            store,
            personas,
            builtin,
        }
    }

    /// Pick or build the conversation and append the user's message.
    ///
    /// `stdin` is read only when the request carries no question text.
    pub fn prepare<R: Read>(&self, request: TurnRequest, stdin: R) -> SessionResult<PendingTurn> {
        let TurnRequest {
            mut mode,
            persona,
            explicit,
            mut question,
        } = request;

        if let Some(first) = question.first_mut() {
            if let Some(rest) = strip_continuation_marker(first).map(str::to_string) {
                debug!("Continuation marker on question");
                mode = SessionMode::Continue;
                *first = rest;
                if first.is_empty() {
                    question.remove(0);
                }
            }
        }

        let mut turn = match mode {
            SessionMode::New => self.start_new(&persona, &explicit)?,
            SessionMode::Continue => self.continue_newest(&persona, &explicit)?,
        };

        let content = if question.is_empty() {
            read_question(stdin)?
        } else {
            question.join(" ")
        };
        turn.record.push(Message::user(content));
        Ok(turn)
    }

    fn start_new(&self, persona: &str, explicit: &ParameterSet) -> SessionResult<PendingTurn> {
        let resolved = self.personas.resolve(persona)?;
        let params = merge(
            explicit,
            &resolved.embedded_defaults,
            &ParameterSet::new(),
            &self.builtin,
        );

        let mut record = ConversationRecord::new(persona, params.clone());
        if let Some(system) = resolved.to_message() {
            record.push(system);
        }
        info!("Starting new conversation with system {:?}", persona);

        Ok(PendingTurn {
            handle: None,
            record,
            params,
            persona_mismatch: false,
        })
    }

    fn continue_newest(&self, persona: &str, explicit: &ParameterSet) -> SessionResult<PendingTurn> {
        let handle = self
            .store
            .newest()?
            .ok_or(gpp_core::Error::NoPriorConversation)?;
        let record = self.store.read(&handle)?;

        let persona_mismatch = persona != record.persona_name;
        if persona_mismatch {
            info!(
                "Requested system {:?} but conversation {} uses {:?}",
                persona, handle, record.persona_name
            );
        }

        let mut continuation = record.parameters.clone();
        if !continuation.contains(keys::MODEL) {
            // Records from before parameters were stored used this model
            continuation.set(keys::MODEL, record.model());
        }
        let params = merge(explicit, &ParameterSet::new(), &continuation, &self.builtin);
        info!("Continuing conversation {}", handle);

        Ok(PendingTurn {
            handle: Some(handle),
            record,
            params,
            persona_mismatch,
        })
    }

    /// Send the conversation, fold the answer and save the record.
    ///
    /// With `stream` set, `tap` sees every fragment as it arrives. Nothing is
    /// written unless the whole answer was received.
    pub async fn run<P, F>(
        &self,
        provider: &P,
        turn: PendingTurn,
        stream: bool,
        tap: F,
    ) -> SessionResult<CompletedTurn>
    where
        P: LLMProvider + ?Sized,
        F: FnMut(&ResponseFragment),
    {
        let request = ChatRequest::new(turn.record.messages.clone(), turn.params.clone())?;
        let response = if stream {
            let fragments = provider.chat_stream(&request).await?;
            aggregate_stream(fragments, tap).await?
        } else {
            aggregate_single(provider.chat(&request).await?)
        };
        self.complete(turn, response)
    }

    /// Append the assistant's answer and persist the conversation
    pub fn complete(
        &self,
        turn: PendingTurn,
        response: AggregatedResponse,
    ) -> SessionResult<CompletedTurn> {
        let PendingTurn {
            handle, mut record, ..
        } = turn;

        record.push(Message::assistant(response.content.clone()));
        record
            .raw_responses
            .extend(response.raw_responses.iter().cloned());
        debug_assert!(
            record.is_turn_complete(),
            "conversation out of order: {:?}",
            record.messages
        );

        let handle = self.store.write(handle.as_ref(), &record)?;
        debug!("Conversation {} now has {} messages", handle, record.messages.len());

        Ok(CompletedTurn {
            handle,
            record,
            response,
        })
    }
}

/// Leading dots (and the whitespace after them) on the first question word
/// force a continuation. Returns the word without the marker.
fn strip_continuation_marker(word: &str) -> Option<&str> {
    let rest = word.trim_start_matches('.');
    if rest.len() == word.len() {
        return None;
    }
    Some(rest.trim_start())
}

fn read_question<R: Read>(mut stdin: R) -> SessionResult<String> {
    let mut content = String::new();
    stdin
        .read_to_string(&mut content)
        .map_err(SessionError::Stdin)?;
    Ok(content)
}
