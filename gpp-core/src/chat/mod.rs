//! Conversation records and their storage
//!
//! Records are stored one JSON file per conversation and are read back
//! into the single current [`ConversationRecord`] shape regardless of
//! which file layout wrote them.

pub mod params;
pub mod record;
pub mod store;

pub use params::{merge, ParameterSet};
pub use record::{ConversationRecord, Message, Role, DEFAULT_PERSONA, LEGACY_MODEL};
pub use store::{ChatStore, RecordHandle};
