use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde_json::{Map, Value};

use super::status::JobStatus;
use super::{now_utc_iso, read_json_object, write_json_object};

/// Partial status record merged into the job's status document.
///
/// Absent fields keep their stored value. `extra` carries job-specific
/// metadata (prompt, parsed brief, flow type, ...).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u64>,
    pub current_image: Option<u64>,
    pub total_image: Option<u64>,
    pub message: Option<String>,
    pub extra: Map<String, Value>,
}

impl StatusUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn progress(mut self, progress: u64) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn current_image(mut self, current: u64) -> Self {
        self.current_image = Some(current);
        self
    }

    pub fn total_image(mut self, total: u64) -> Self {
        self.total_image = Some(total);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn field(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    fn into_patch(self) -> Map<String, Value> {
        let mut patch = self.extra;
        if let Some(status) = self.status {
            patch.insert(
                "status".to_string(),
                Value::String(status.as_str().to_string()),
            );
        }
        if let Some(progress) = self.progress {
            patch.insert("progress".to_string(), Value::Number(progress.into()));
        }
        if let Some(current) = self.current_image {
            patch.insert("current_image".to_string(), Value::Number(current.into()));
        }
        if let Some(total) = self.total_image {
            patch.insert("total_image".to_string(), Value::Number(total.into()));
        }
        if let Some(message) = self.message {
            patch.insert("message".to_string(), Value::String(message));
        }
        patch
    }
}

/// Merge-update store behind `status.json`, the document pollers read.
///
/// Every write re-reads the document, merges the patch key by key, keeps
/// `progress` from ever decreasing, rejects illegal status edges and stamps
/// `updated_at`.
#[derive(Debug, Clone)]
pub struct JobState {
    path: PathBuf,
    snapshot: Map<String, Value>,
}

impl JobState {
    pub fn open(path: impl Into<PathBuf>, job_id: &str) -> anyhow::Result<Self> {
        let path = path.into();
        if path.exists() {
            let Some(existing) = read_json_object(&path) else {
                bail!("status document unreadable: {}", path.display());
            };
            return Ok(Self {
                path,
                snapshot: existing,
            });
        }

        let now = now_utc_iso();
        let mut snapshot = Map::new();
        snapshot.insert("job_id".to_string(), Value::String(job_id.to_string()));
        snapshot.insert(
            "status".to_string(),
            Value::String(JobStatus::Created.as_str().to_string()),
        );
        snapshot.insert("progress".to_string(), Value::Number(0.into()));
        snapshot.insert("current_image".to_string(), Value::Number(0.into()));
        snapshot.insert("total_image".to_string(), Value::Number(0.into()));
        snapshot.insert("message".to_string(), Value::String("Job created".to_string()));
        snapshot.insert("images".to_string(), Value::Array(Vec::new()));
        snapshot.insert("created_at".to_string(), Value::String(now.clone()));
        snapshot.insert("updated_at".to_string(), Value::String(now));
        write_json_object(&path, &snapshot)
            .with_context(|| format!("failed to create {}", path.display()))?;
        Ok(Self { path, snapshot })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> &Map<String, Value> {
        &self.snapshot
    }

    pub fn status(&self) -> anyhow::Result<JobStatus> {
        stored_status(&self.snapshot)
    }

    pub fn progress(&self) -> u64 {
        stored_progress(&self.snapshot)
    }

    pub fn message(&self) -> &str {
        self.snapshot
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    pub fn update(&mut self, update: StatusUpdate) -> anyhow::Result<()> {
        let mut patch = update.into_patch();
        let mut current = read_json_object(&self.path).unwrap_or_else(|| self.snapshot.clone());

        if let Some(next) = patch.get("status").and_then(Value::as_str) {
            let next = next.parse::<JobStatus>()?;
            let from = stored_status(&current)?;
            if !from.can_transition_to(next) {
                bail!("illegal job status transition {from} -> {next}");
            }
        }
        if let Some(progress) = patch.get("progress").and_then(Value::as_u64) {
            let floor = stored_progress(&current);
            patch.insert(
                "progress".to_string(),
                Value::Number(progress.max(floor).into()),
            );
        }

        for (key, value) in patch {
            current.insert(key, value);
        }
        self.commit(current)
    }

    /// Replaces the externally visible image list with the manifest's.
    pub fn mirror_images(&mut self, images: Vec<Value>) -> anyhow::Result<()> {
        let mut current = read_json_object(&self.path).unwrap_or_else(|| self.snapshot.clone());
        current.insert("images".to_string(), Value::Array(images));
        self.commit(current)
    }

    fn commit(&mut self, mut document: Map<String, Value>) -> anyhow::Result<()> {
        document.insert("updated_at".to_string(), Value::String(now_utc_iso()));
        write_json_object(&self.path, &document)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        self.snapshot = document;
        Ok(())
    }
}

fn stored_status(document: &Map<String, Value>) -> anyhow::Result<JobStatus> {
    document
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("created")
        .parse()
}

fn stored_progress(document: &Map<String, Value>) -> u64 {
    document
        .get("progress")
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{JobState, StatusUpdate};
    use crate::jobs::JobStatus;

    #[test]
    fn open_writes_created_document_once() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("status.json");
        let mut state = JobState::open(&path, "job-1")?;
        assert_eq!(state.status()?, JobStatus::Created);
        state.update(StatusUpdate::with_status(JobStatus::Parsing).progress(2))?;

        let reopened = JobState::open(&path, "job-1")?;
        assert_eq!(reopened.status()?, JobStatus::Parsing);
        assert_eq!(reopened.snapshot()["job_id"], json!("job-1"));
        Ok(())
    }

    #[test]
    fn open_refuses_to_replace_a_corrupt_document() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("status.json");
        std::fs::write(&path, "{\"status\": \"generating\", \"progress\": 40")?;

        assert!(JobState::open(&path, "job-1").is_err());
        let raw = std::fs::read_to_string(&path)?;
        assert!(raw.contains("\"progress\": 40"));
        Ok(())
    }

    #[test]
    fn update_merges_and_preserves_absent_keys() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut state = JobState::open(temp.path().join("status.json"), "job-1")?;
        state.update(
            StatusUpdate::with_status(JobStatus::Parsing)
                .total_image(18)
                .message("Analyzing project description...")
                .field("prompt", json!("two storey dual occ")),
        )?;
        state.update(StatusUpdate::new().message("Project parsed"))?;

        let doc = state.snapshot();
        assert_eq!(doc["status"], json!("parsing"));
        assert_eq!(doc["total_image"], json!(18));
        assert_eq!(doc["prompt"], json!("two storey dual occ"));
        assert_eq!(doc["message"], json!("Project parsed"));
        assert!(doc.get("updated_at").and_then(Value::as_str).is_some());
        Ok(())
    }

    #[test]
    fn progress_never_decreases() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut state = JobState::open(temp.path().join("status.json"), "job-1")?;
        state.update(StatusUpdate::with_status(JobStatus::GeneratingHero).progress(10))?;
        state.update(StatusUpdate::with_status(JobStatus::AwaitingApproval).progress(10))?;
        state.update(StatusUpdate::with_status(JobStatus::Parsing).progress(2))?;
        assert_eq!(state.progress(), 10);
        state.update(StatusUpdate::new().progress(250))?;
        assert_eq!(state.progress(), 100);
        Ok(())
    }

    #[test]
    fn illegal_transition_is_rejected_and_nothing_written() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut state = JobState::open(temp.path().join("status.json"), "job-1")?;
        state.update(StatusUpdate::with_status(JobStatus::Error).message("boom"))?;

        let err = state
            .update(StatusUpdate::with_status(JobStatus::Generating))
            .expect_err("terminal state must not move");
        assert!(err.to_string().contains("error -> generating"));
        assert_eq!(state.status()?, JobStatus::Error);
        assert_eq!(state.message(), "boom");
        Ok(())
    }

    #[test]
    fn mirror_images_replaces_list() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut state = JobState::open(temp.path().join("status.json"), "job-1")?;
        state.mirror_images(vec![json!({"id": "a"}), json!({"id": "b"})])?;
        state.mirror_images(vec![json!({"id": "a"})])?;
        assert_eq!(state.snapshot()["images"], json!([{"id": "a"}]));
        Ok(())
    }
}
