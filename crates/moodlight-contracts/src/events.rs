use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

const ENVELOPE_KEYS: [&str; 4] = ["type", "session_id", "turn_id", "ts"];

#[derive(Serialize)]
struct TurnEvent<'a> {
    #[serde(rename = "type")]
    event_type: &'a str,
    session_id: &'a str,
    turn_id: &'a str,
    ts: String,
    #[serde(flatten)]
    payload: EventPayload,
}

/// Append-only `events.jsonl` journal of chat turns.
///
/// Every line starts with `type`, `session_id`, `turn_id` and `ts`. Payload
/// entries under those names are discarded.
#[derive(Debug)]
pub struct TurnJournal {
    path: PathBuf,
    session_id: String,
    file: Mutex<Option<File>>,
}

impl TurnJournal {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            session_id: session_id.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Appends one event and returns it as written.
    pub fn record(
        &self,
        turn_id: &str,
        event_type: &str,
        mut payload: EventPayload,
    ) -> anyhow::Result<Value> {
        payload.retain(|key, _| !ENVELOPE_KEYS.contains(&key.as_str()));
        let event = serde_json::to_value(TurnEvent {
            event_type,
            session_id: &self.session_id,
            turn_id,
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            payload,
        })?;
        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');

        let mut slot = self
            .file
            .lock()
            .map_err(|_| anyhow!("turn journal lock poisoned"))?;
        if slot.is_none() {
            *slot = Some(self.open()?);
        }
        if let Some(file) = slot.as_mut() {
            file.write_all(&line)
                .with_context(|| format!("failed appending to {}", self.path.display()))?;
        }
        Ok(event)
    }

    fn open(&self) -> anyhow::Result<File> {
        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))
    }
}
