//! Error types for gpp

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for gpp core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// No conversation record at the requested location
    #[error("Not found: {0}")]
    NotFound(String),

    /// Stored record is neither the current nor a legacy shape
    #[error("Corrupt chat record {}: {reason}", path.display())]
    CorruptRecord { path: PathBuf, reason: String },

    /// Persona name is not inline text and has no file in the persona directory
    #[error("Unknown system {name:?}. Try one of these: {} or 'none'", quoted_list(available))]
    UnknownPersona { name: String, available: Vec<String> },

    /// Persona starts with a parameter prologue that is not a JSON object
    #[error("Malformed parameter prologue in system {name:?}: {reason}")]
    MalformedPersona { name: String, reason: String },

    /// Continuation requested but the store holds no conversation
    #[error("No previous conversation to continue")]
    NoPriorConversation,

    /// Recall position beyond the number of stored conversations
    #[error("No conversation #{requested}; only {available} stored")]
    OutOfRange { requested: usize, available: usize },
}

/// A specialized Result type for gpp core operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

fn quoted_list(names: &[String]) -> String {
    names
        .iter()
        .map(|name| format!("'{}'", name))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_persona_lists_alternatives() {
        let err = Error::UnknownPersona {
            name: "pirate".to_string(),
            available: vec!["default".to_string(), "poet".to_string()],
        };
        let text = err.to_string();
        assert!(text.contains("\"pirate\""));
        assert!(text.contains("'default', 'poet' or 'none'"));
    }

    #[test]
    fn test_out_of_range_message() {
        let err = Error::OutOfRange {
            requested: 4,
            available: 2,
        };
        assert_eq!(err.to_string(), "No conversation #4; only 2 stored");
    }
}
