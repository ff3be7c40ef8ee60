use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use serde_json::{Map, Value};

use crate::jobs::now_utc_iso;

pub type EventPayload = Map<String, Value>;

/// Append-only writer for a job's `events.jsonl`.
///
/// Every line carries `type`, `job_id` and `ts`; the caller payload is merged
/// last and may override them. Clones share one file lock, so the driver and
/// anything it hands the writer to append whole lines.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    job_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, job_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                job_id: job_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn job_id(&self) -> &str {
        &self.inner.job_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let event = self.envelope(event_type, payload);
        self.append_line(&event)?;
        Ok(Value::Object(event))
    }

    /// Like [`EventWriter::emit`] for `json!` payloads; non-object values
    /// are recorded under `value`.
    pub fn emit_json(&self, event_type: &str, payload: Value) -> anyhow::Result<Value> {
        let payload = match payload {
            Value::Object(map) => map,
            Value::Null => EventPayload::new(),
            other => EventPayload::from_iter([("value".to_string(), other)]),
        };
        self.emit(event_type, payload)
    }

    fn envelope(&self, event_type: &str, payload: EventPayload) -> Map<String, Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert("job_id".to_string(), Value::String(self.inner.job_id.clone()));
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        event.extend(payload);
        event
    }

    fn append_line(&self, event: &Map<String, Value>) -> anyhow::Result<()> {
        let path = &self.inner.path;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .with_context(|| format!("failed to append to {}", path.display()))
    }

    /// Reads back every event type written so far, in order.
    pub fn event_types(&self) -> anyhow::Result<Vec<String>> {
        if !self.inner.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.inner.path)?;
        Ok(raw
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|row| row.get("type").and_then(Value::as_str).map(str::to_string))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;

    use super::*;

    #[test]
    fn emit_writes_job_scoped_jsonl_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "job-42");

        let mut payload = EventPayload::new();
        payload.insert("shot_id".to_string(), Value::String("hero_facade".to_string()));
        let emitted = writer.emit("shot_started", payload)?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        let parsed: Value = serde_json::from_str(line)?;

        assert_eq!(parsed, emitted);
        assert_eq!(parsed["type"], Value::String("shot_started".to_string()));
        assert_eq!(parsed["job_id"], Value::String("job-42".to_string()));
        assert_eq!(parsed["shot_id"], Value::String("hero_facade".to_string()));

        let ts = parsed["ts"].as_str().unwrap_or("");
        DateTime::parse_from_rfc3339(ts)?;
        Ok(())
    }

    #[test]
    fn json_payloads_merge_and_override_defaults() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl"), "job-42");

        let emitted = writer.emit_json(
            "attempt_finished",
            serde_json::json!({ "job_id": "other", "attempt": 2 }),
        )?;
        assert_eq!(emitted["job_id"], Value::String("other".to_string()));
        assert_eq!(emitted["attempt"], Value::from(2));

        let scalar = writer.emit_json("note", Value::from(7))?;
        assert_eq!(scalar["value"], Value::from(7));
        Ok(())
    }

    #[test]
    fn event_types_follow_write_order() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("nested").join("events.jsonl"), "job-42");
        assert!(writer.event_types()?.is_empty());

        writer.emit("job_started", EventPayload::new())?;
        writer.clone().emit("job_finished", EventPayload::new())?;

        assert_eq!(writer.event_types()?, vec!["job_started", "job_finished"]);
        Ok(())
    }
}
