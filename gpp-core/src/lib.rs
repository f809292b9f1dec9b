//! Core types for gpp
//!
//! Conversation records and their on-disk store, personas, parameter
//! merging, history browsing, configuration and logging. Everything here is
//! independent of the generation API.

pub mod chat;
pub mod config;
pub mod error;
pub mod history;
pub mod logging;
pub mod persona;

pub use chat::{
    merge, ChatStore, ConversationRecord, Message, ParameterSet, RecordHandle, Role,
};
pub use error::{Error, Result};
pub use history::{HistoryBrowser, RecordSummary};
pub use persona::{PersonaResolver, ResolvedPersona};
