//! System personas
//!
//! A persona is the system message a new conversation starts with. It is
//! either looked up by name in the persona directory or given inline. Its
//! text may begin with a JSON object of default generation parameters:
//!
//! ```text
//! {"model": "gpt-4-turbo", "temperature": 0.0}
//! You answer in haiku.
//! ```

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::chat::{ChatStore, Message, ParameterSet, DEFAULT_PERSONA};
use crate::error::{Error, Result};

/// Persona name meaning "no system message at all"
pub const NO_PERSONA: &str = "none";

/// Text seeded into the `default` persona when it does not exist
pub const DEFAULT_PERSONA_TEXT: &str = "Du er en ekspert som er sikker i din sak og hjelper til med å forklare hvordan \
ting henger sammen. Fortrinnsvis ønsker du å svare kort og presist på norsk.";

/// Outcome of resolving a persona name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedPersona {
    /// System message to open the conversation with; `None` adds nothing
    pub system_message: Option<String>,
    /// Parameters from the persona's prologue
    pub embedded_defaults: ParameterSet,
}

impl ResolvedPersona {
    pub fn to_message(&self) -> Option<Message> {
        self.system_message.as_deref().map(Message::system)
    }
}

/// Resolves persona names against a persona directory
#[derive(Debug, Clone)]
pub struct PersonaResolver {
    dir: PathBuf,
}

impl PersonaResolver {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Resolver over the store's persona directory, with `default` seeded
    pub fn for_store(store: &ChatStore) -> Result<Self> {
        let resolver = Self::new(store.personas_dir());
        resolver.ensure_default()?;
        Ok(resolver)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the built-in `default` persona unless one already exists
    pub fn ensure_default(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(DEFAULT_PERSONA);
        if !path.exists() {
            info!("Seeding default persona at {}", path.display());
            fs::write(&path, DEFAULT_PERSONA_TEXT)?;
        }
        Ok(())
    }

    /// Names of the persona files, sorted
    pub fn available(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Turn a persona name (or inline persona text) into a system message
    /// and the defaults embedded in it
    pub fn resolve(&self, name: &str) -> Result<ResolvedPersona> {
        if name == NO_PERSONA {
            return Ok(ResolvedPersona::default());
        }

        let text = if name.chars().any(char::is_whitespace) {
            name.to_string()
        } else {
            self.read_persona_file(name)?
        };

        if !text.starts_with('{') {
            return Ok(ResolvedPersona {
                system_message: Some(text),
                embedded_defaults: ParameterSet::new(),
            });
        }

        let (defaults, rest) = split_prologue(&text).map_err(|reason| Error::MalformedPersona {
            name: name.to_string(),
            reason,
        })?;
        debug!(
            "Persona {:?} carries {} default parameter(s)",
            name,
            defaults.len()
        );
        Ok(ResolvedPersona {
            system_message: Some(rest.to_string()),
            embedded_defaults: defaults,
        })
    }

    fn read_persona_file(&self, name: &str) -> Result<String> {
        let unknown = || -> Result<String> {
            Err(Error::UnknownPersona {
                name: name.to_string(),
                available: self.available()?,
            })
        };

        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            return unknown();
        }
        let path = self.dir.join(name);
        if !path.is_file() {
            return unknown();
        }
        Ok(fs::read_to_string(&path)?)
    }
}

/// Split a leading JSON object off `text`.
///
/// The longest valid JSON value at the start of `text` is decoded; it must
/// be an object. Returns the object and the remaining text with leading
/// whitespace removed.
pub fn split_prologue(text: &str) -> std::result::Result<(ParameterSet, &str), String> {
    let mut values = serde_json::Deserializer::from_str(text).into_iter::<Value>();
    match values.next() {
        Some(Ok(Value::Object(map))) => {
            let consumed = values.byte_offset();
            Ok((ParameterSet::from_map(map), text[consumed..].trim_start()))
        }
        Some(Ok(other)) => Err(format!("expected a JSON object, found {}", json_kind(&other))),
        Some(Err(e)) => Err(e.to_string()),
        None => Err("missing parameter object".to_string()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
