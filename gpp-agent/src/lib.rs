//! Conversation turns for gpp
//!
//! [`SessionManager`] decides between a new and a continued conversation,
//! sends it to a provider and saves the result; the aggregator folds the
//! provider's answer into the assistant message.

pub mod aggregator;
pub mod session;

pub use aggregator::{aggregate_single, aggregate_stream, AggregatedResponse};
pub use session::{
    CompletedTurn, PendingTurn, SessionError, SessionManager, SessionMode, SessionResult,
    TurnRequest,
};
