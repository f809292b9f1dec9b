//! On-disk chat store
//!
//! One JSON file per conversation under `<root>/chats`, named after the
//! local creation time (`chat-YYYYMMDDTHHMMSS.json`) so that sorting the
//! names sorts the conversations.

use chrono::{Local, NaiveDateTime};
use serde::Deserialize;
use serde_json::Value;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::params::ParameterSet;
use super::record::{ConversationRecord, Message, DEFAULT_PERSONA};
use crate::error::{Error, Result};

const FILE_PREFIX: &str = "chat-";
const FILE_SUFFIX: &str = ".json";
const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Name of a stored conversation, ordered by creation time
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordHandle {
    stem: String,
    created_at: NaiveDateTime,
}

impl RecordHandle {
    /// Handle for a conversation created at `created_at` (second resolution)
    pub fn from_timestamp(created_at: NaiveDateTime) -> Self {
        let stem = format!("{}{}", FILE_PREFIX, created_at.format(STAMP_FORMAT));
        // Re-parse so sub-second precision does not leak into comparisons
        Self::from_stem(&stem).unwrap_or(Self { stem, created_at })
    }

    /// Parse a file name such as `chat-20240315T093000.json`
    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::from_stem(name.strip_suffix(FILE_SUFFIX)?)
    }

    fn from_stem(stem: &str) -> Option<Self> {
        let stamp = stem.strip_prefix(FILE_PREFIX)?;
        let created_at = NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()?;
        Some(Self {
            stem: stem.to_string(),
            created_at,
        })
    }

    pub fn created_at(&self) -> NaiveDateTime {
        self.created_at
    }

    pub fn file_name(&self) -> String {
        format!("{}{}", self.stem, FILE_SUFFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.stem
    }
}

impl std::fmt::Display for RecordHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.stem)
    }
}

/// Every shape a chat file has had on disk.
///
/// Only [`ChatStore::read`] sees this; the rest of the code works on
/// [`ConversationRecord`].
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRecord {
    /// Oldest files: just the message list
    Bare(Vec<Message>),
    Current(CurrentShape),
    /// Files that recorded only the model, not the full parameter set
    ModelOnly(ModelOnlyShape),
}

#[derive(Deserialize)]
struct CurrentShape {
    #[serde(default = "default_persona")]
    system: String,
    params: ParameterSet,
    messages: Vec<Message>,
    #[serde(default)]
    resp: Vec<Value>,
}

#[derive(Deserialize)]
struct ModelOnlyShape {
    #[serde(default = "default_persona")]
    system: String,
    model: String,
    messages: Vec<Message>,
    #[serde(default)]
    resp: Vec<Value>,
}

fn default_persona() -> String {
    DEFAULT_PERSONA.to_string()
}

impl From<StoredRecord> for ConversationRecord {
    fn from(stored: StoredRecord) -> Self {
        match stored {
            StoredRecord::Bare(messages) => ConversationRecord {
                persona_name: default_persona(),
                parameters: ParameterSet::new(),
                messages,
                raw_responses: Vec::new(),
            },
            StoredRecord::Current(shape) => ConversationRecord {
                persona_name: shape.system,
                parameters: shape.params,
                messages: shape.messages,
                raw_responses: shape.resp,
            },
            StoredRecord::ModelOnly(shape) => ConversationRecord {
                persona_name: shape.system,
                parameters: ParameterSet::new().with(super::params::keys::MODEL, shape.model),
                messages: shape.messages,
                raw_responses: shape.resp,
            },
        }
    }
}

type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Reads and writes conversation records below a per-user root directory
#[derive(Clone)]
pub struct ChatStore {
    root: PathBuf,
    chats_dir: PathBuf,
    personas_dir: PathBuf,
    clock: Clock,
}

impl std::fmt::Debug for ChatStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStore")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl ChatStore {
    /// Open the store at `root`, creating the chat and persona directories
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let chats_dir = root.join("chats");
        let personas_dir = root.join("system");
        fs::create_dir_all(&chats_dir)?;
        fs::create_dir_all(&personas_dir)?;

        Ok(Self {
            root,
            chats_dir,
            personas_dir,
            clock: Arc::new(|| Local::now().naive_local()),
        })
    }

    /// Replace the clock used to name new records
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> NaiveDateTime + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn chats_dir(&self) -> &Path {
        &self.chats_dir
    }

    pub fn personas_dir(&self) -> &Path {
        &self.personas_dir
    }

    pub fn path_of(&self, handle: &RecordHandle) -> PathBuf {
        self.chats_dir.join(handle.file_name())
    }

    /// All stored records, newest first
    pub fn list_records(&self) -> Result<Vec<RecordHandle>> {
        let entries = match fs::read_dir(&self.chats_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut handles = Vec::new();
        for entry in entries {
            let entry = entry?;
            if let Some(handle) = entry.file_name().to_str().and_then(RecordHandle::from_file_name)
            {
                handles.push(handle);
            }
        }

        handles.sort_by(|a, b| b.cmp(a));
        Ok(handles)
    }

    /// The most recently created record, if any
    pub fn newest(&self) -> Result<Option<RecordHandle>> {
        Ok(self.list_records()?.into_iter().next())
    }

    /// Load a record, upgrading older file shapes
    pub fn read(&self, handle: &RecordHandle) -> Result<ConversationRecord> {
        let path = self.path_of(handle);
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("chat record {}", path.display())));
            }
            Err(e) => return Err(e.into()),
        };

        let value: Value = serde_json::from_slice(&content).map_err(|e| Error::CorruptRecord {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let stored: StoredRecord =
            serde_json::from_value(value).map_err(|_| Error::CorruptRecord {
                path: path.clone(),
                reason: "not a chat record or a message list".to_string(),
            })?;

        if !matches!(stored, StoredRecord::Current(_)) {
            debug!("Upgrading legacy chat record {}", handle);
        }
        Ok(stored.into())
    }

    /// Persist a record.
    ///
    /// With no handle a new one is allocated from the clock. The file is
    /// replaced atomically, so readers see either the old or the new
    /// content.
    pub fn write(
        &self,
        handle: Option<&RecordHandle>,
        record: &ConversationRecord,
    ) -> Result<RecordHandle> {
        let handle = match handle {
            Some(handle) => handle.clone(),
            None => self.allocate_handle(),
        };

        let content = serde_json::to_string_pretty(record)?;
        let path = self.path_of(&handle);
        write_atomic(&path, content.as_bytes())?;
        debug!("Saved chat record {}", path.display());
        Ok(handle)
    }

    fn allocate_handle(&self) -> RecordHandle {
        let handle = RecordHandle::from_timestamp((self.clock)());
        if self.path_of(&handle).exists() {
            warn!("Chat record {} already exists and will be replaced", handle);
        }
        handle
    }
}

/// Replace `path` with `contents` via a temporary sibling file and rename
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    write_atomic_with(path, |file| file.write_all(contents))
}

pub(crate) fn write_atomic_with<F>(path: &Path, fill: F) -> std::io::Result<()>
where
    F: FnOnce(&mut File) -> std::io::Result<()>,
{
    let parent = path
        .parent()
        .ok_or_else(|| std::io::Error::other("path has no parent"))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("record");
    let tmp_path = parent.join(format!(".{}.tmp-{}", file_name, std::process::id()));

    let result = (|| {
        let mut file = File::create(&tmp_path)?;
        fill(&mut file)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
