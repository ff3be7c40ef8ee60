use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde_json::{Map, Value};

use super::manifest::{Manifest, ManifestKind, ShotResult};
use super::state::{JobState, StatusUpdate};

pub const STATUS_FILE: &str = "status.json";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const EVENTS_FILE: &str = "events.jsonl";
pub const SUMMARY_FILE: &str = "summary.json";

/// Single writer for one job's durable state.
///
/// Owns the status document and the manifest, both keyed by the job
/// directory. Every manifest mutation is followed by a refresh of the
/// status document's `images` list so pollers read one consistent view.
#[derive(Debug)]
pub struct JobStore {
    job_id: String,
    dir: PathBuf,
    state: JobState,
    manifest: Option<Manifest>,
}

impl JobStore {
    pub fn open(dir: impl Into<PathBuf>, job_id: &str) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create job dir {}", dir.display()))?;
        let state = JobState::open(dir.join(STATUS_FILE), job_id)?;
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest = if manifest_path.exists() {
            let manifest = Manifest::load(&manifest_path)?;
            if manifest.job_id != job_id {
                bail!(
                    "manifest at {} belongs to job {}, not {}",
                    manifest_path.display(),
                    manifest.job_id,
                    job_id
                );
            }
            Some(manifest)
        } else {
            None
        };

        Ok(Self {
            job_id: job_id.to_string(),
            dir,
            state,
            manifest,
        })
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    pub fn events_path(&self) -> PathBuf {
        self.dir.join(EVENTS_FILE)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir.join(SUMMARY_FILE)
    }

    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    pub fn image_url(&self, filename: &str) -> String {
        format!("/api/images/{}/{}", self.job_id, filename)
    }

    /// Id for the next appended entry: `{job_id}_{n}`, 1-based.
    pub fn next_result_id(&self) -> String {
        let count = self.manifest.as_ref().map(|m| m.images.len()).unwrap_or(0);
        format!("{}_{}", self.job_id, count + 1)
    }

    pub fn update_status(&mut self, update: StatusUpdate) -> anyhow::Result<()> {
        self.state.update(update)
    }

    /// Starts a fresh manifest, replacing whatever was stored before.
    pub fn start_manifest(
        &mut self,
        kind: ManifestKind,
        metadata: Map<String, Value>,
    ) -> anyhow::Result<()> {
        let mut manifest = Manifest::new(self.dir.join(MANIFEST_FILE), &self.job_id, kind);
        manifest.metadata = metadata;
        manifest.save()?;
        let images = manifest.image_values();
        self.manifest = Some(manifest);
        self.state.mirror_images(images)
    }

    pub fn set_manifest_meta(&mut self, key: &str, value: Value) -> anyhow::Result<()> {
        let manifest = self.manifest_mut()?;
        manifest.set_meta(key, value);
        manifest.save()
    }

    pub fn append_result(&mut self, result: ShotResult) -> anyhow::Result<()> {
        let manifest = self.manifest_mut()?;
        manifest.append(result)?;
        manifest.save()?;
        let images = manifest.image_values();
        self.state.mirror_images(images)
    }

    pub fn replace_result(&mut self, result: ShotResult) -> anyhow::Result<ShotResult> {
        let manifest = self.manifest_mut()?;
        let stored = manifest.replace(result)?.clone();
        manifest.save()?;
        let images = manifest.image_values();
        self.state.mirror_images(images)?;
        Ok(stored)
    }

    fn manifest_mut(&mut self) -> anyhow::Result<&mut Manifest> {
        let job_id = self.job_id.clone();
        self.manifest
            .as_mut()
            .with_context(|| format!("job {job_id} has no manifest yet"))
    }
}
