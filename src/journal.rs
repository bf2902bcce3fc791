//! Append-only JSONL session journal.
//!
//! A journal file starts with one `session_meta` header line and then holds
//! one message per line, timestamped at write time. Appends never rewrite
//! earlier lines; each write is a single whole-line `write`, so concurrent
//! readers always observe a consistent prefix.

use crate::types::Message;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Header record identifying a session journal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionMeta {
    /// Always `"session_meta"`.
    #[serde(rename = "type")]
    pub record_type: String,
    /// Session id (UUID v4).
    pub id: String,
    /// Working directory the session was created in.
    pub cwd: String,
    /// Model id the session was created with.
    pub model: String,
    /// Creation timestamp, ISO-8601.
    pub created: String,
    /// Version of the binary that wrote the journal.
    pub heddle_version: String,
    /// Any additional fields, preserved round-trip.
    #[serde(default, flatten, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl SessionMeta {
    /// Build a header for a new session, stamped now.
    pub fn new(id: impl Into<String>, cwd: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            record_type: "session_meta".to_string(),
            id: id.into(),
            cwd: cwd.into(),
            model: model.into(),
            created: Utc::now().to_rfc3339(),
            heddle_version: env!("CARGO_PKG_VERSION").to_string(),
            extra: BTreeMap::new(),
        }
    }
}

/// Writer handle for one journal file.
#[derive(Debug, Clone)]
pub struct SessionJournal {
    path: PathBuf,
}

impl SessionJournal {
    /// Open a journal at `path`, creating the parent directory and the file
    /// when absent.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, String> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                format!("failed to create session directory {}: {e}", parent.display())
            })?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| format!("failed to open session journal {}: {e}", path.display()))?;
        Ok(Self { path })
    }

    /// Journal file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the `session_meta` header line.
    pub fn write_session_meta(&self, meta: &SessionMeta) -> Result<(), String> {
        let line = serde_json::to_string(meta)
            .map_err(|e| format!("failed to serialize session meta: {e}"))?;
        self.append_line(&line)
    }

    /// Append one message line, stamped with the current time.
    pub fn append_message(&self, message: &Message) -> Result<(), String> {
        let mut value = serde_json::to_value(message)
            .map_err(|e| format!("failed to serialize message: {e}"))?;
        if let Some(object) = value.as_object_mut() {
            object.insert(
                "timestamp".to_string(),
                Value::String(Utc::now().to_rfc3339()),
            );
        }
        let line = value.to_string();
        self.append_line(&line)
    }

    fn append_line(&self, line: &str) -> Result<(), String> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| format!("failed to open session journal {}: {e}", self.path.display()))?;
        // One write call per line keeps concurrent readers on line boundaries.
        file.write_all(format!("{line}\n").as_bytes())
            .map_err(|e| format!("failed to append to {}: {e}", self.path.display()))
    }
}

/// Load every message from a journal, skipping the header.
///
/// A missing file is an empty session. Unparseable lines are skipped so one
/// corrupt record cannot make an entire session unreadable.
pub fn load_session(path: &Path) -> Result<Vec<Message>, String> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(format!("failed to read {}: {err}", path.display())),
    };

    let mut messages = Vec::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(err) => {
                debug!(%err, "skipping unparseable journal line");
                continue;
            }
        };
        if value.get("type").and_then(Value::as_str) == Some("session_meta") {
            continue;
        }
        match serde_json::from_value::<Message>(value) {
            Ok(message) => messages.push(message),
            Err(err) => debug!(%err, "skipping non-message journal line"),
        }
    }
    Ok(messages)
}

/// Parse the header line of a journal.
///
/// Returns `None` when the file is missing, empty, or its first line is not
/// a `session_meta` record.
pub fn load_session_meta(path: &Path) -> Option<SessionMeta> {
    let raw = std::fs::read_to_string(path).ok()?;
    let first = raw.lines().next()?;
    let meta: SessionMeta = serde_json::from_str(first).ok()?;
    if meta.record_type != "session_meta" {
        return None;
    }
    Some(meta)
}
