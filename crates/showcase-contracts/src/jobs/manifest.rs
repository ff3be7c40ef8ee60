use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{now_utc_iso, read_json_object, write_json_object};
use crate::shots::ShotCategory;

/// Durable outcome of one shot's refinement loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotResult {
    pub id: String,
    pub shot_id: String,
    pub filename: String,
    pub url: String,
    pub category: ShotCategory,
    pub name: String,
    #[serde(default)]
    pub is_hero: bool,
    pub score: u32,
    pub attempts: u32,
    #[serde(default)]
    pub low_confidence: bool,
    #[serde(default)]
    pub breakdown: IndexMap<String, u32>,
    pub aspect_ratio: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regenerated_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestKind {
    ProjectShowcase,
    InspirationShowcase,
}

impl ManifestKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::ProjectShowcase => "project_showcase",
            Self::InspirationShowcase => "inspiration_showcase",
        }
    }

    fn parse(raw: &str) -> Self {
        if raw == "inspiration_showcase" {
            Self::InspirationShowcase
        } else {
            Self::ProjectShowcase
        }
    }
}

const RESERVED_KEYS: [&str; 5] = ["job_id", "type", "created_at", "updated_at", "images"];

/// Ordered record of every stored shot for one job, one entry per shot id.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub path: PathBuf,
    pub job_id: String,
    pub kind: ManifestKind,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub metadata: Map<String, Value>,
    pub images: Vec<ShotResult>,
}

impl Manifest {
    pub fn new(path: impl Into<PathBuf>, job_id: impl Into<String>, kind: ManifestKind) -> Self {
        Self {
            path: path.into(),
            job_id: job_id.into(),
            kind,
            created_at: now_utc_iso(),
            updated_at: None,
            metadata: Map::new(),
            images: Vec::new(),
        }
    }

    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let Some(obj) = read_json_object(&path) else {
            bail!("manifest not found or unreadable: {}", path.display());
        };

        let job_id = obj
            .get("job_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .with_context(|| format!("manifest {} has no job_id", path.display()))?;
        let mut manifest = Self::new(
            path.clone(),
            job_id,
            ManifestKind::parse(obj.get("type").and_then(Value::as_str).unwrap_or("")),
        );
        if let Some(created_at) = obj.get("created_at").and_then(Value::as_str) {
            manifest.created_at = created_at.to_string();
        }
        manifest.updated_at = obj
            .get("updated_at")
            .and_then(Value::as_str)
            .map(str::to_string);

        for (key, value) in &obj {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                manifest.metadata.insert(key.clone(), value.clone());
            }
        }
        if let Some(images) = obj.get("images").and_then(Value::as_array) {
            for item in images {
                let parsed = serde_json::from_value::<ShotResult>(item.clone())
                    .with_context(|| format!("malformed image entry in {}", path.display()))?;
                manifest.images.push(parsed);
            }
        }
        Ok(manifest)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set_meta(&mut self, key: &str, value: Value) {
        self.metadata.insert(key.to_string(), value);
    }

    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn hero(&self) -> Option<&ShotResult> {
        self.images.iter().find(|entry| entry.is_hero)
    }

    pub fn get(&self, shot_id: &str) -> Option<&ShotResult> {
        self.images.iter().find(|entry| entry.shot_id == shot_id)
    }

    pub fn contains(&self, shot_id: &str) -> bool {
        self.get(shot_id).is_some()
    }

    pub fn append(&mut self, result: ShotResult) -> anyhow::Result<()> {
        if self.contains(&result.shot_id) {
            bail!(
                "manifest for job {} already holds shot '{}'",
                self.job_id,
                result.shot_id
            );
        }
        self.images.push(result);
        self.updated_at = Some(now_utc_iso());
        Ok(())
    }

    /// Swaps the content of the entry for `result.shot_id` in place, keeping
    /// the original entry id. Returns the stored entry.
    pub fn replace(&mut self, mut result: ShotResult) -> anyhow::Result<&ShotResult> {
        let Some(index) = self
            .images
            .iter()
            .position(|entry| entry.shot_id == result.shot_id)
        else {
            bail!(
                "manifest for job {} has no shot '{}' to replace",
                self.job_id,
                result.shot_id
            );
        };
        result.id = self.images[index].id.clone();
        self.images[index] = result;
        self.updated_at = Some(now_utc_iso());
        Ok(&self.images[index])
    }

    pub fn image_values(&self) -> Vec<Value> {
        self.images
            .iter()
            .map(|entry| serde_json::to_value(entry).unwrap_or(Value::Null))
            .collect()
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let mut payload = Map::new();
        payload.insert("job_id".to_string(), Value::String(self.job_id.clone()));
        payload.insert(
            "type".to_string(),
            Value::String(self.kind.as_str().to_string()),
        );
        payload.insert(
            "created_at".to_string(),
            Value::String(self.created_at.clone()),
        );
        if let Some(updated_at) = &self.updated_at {
            payload.insert("updated_at".to_string(), Value::String(updated_at.clone()));
        }
        for (key, value) in &self.metadata {
            payload.insert(key.clone(), value.clone());
        }
        payload.insert("images".to_string(), Value::Array(self.image_values()));

        write_json_object(&self.path, &payload)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}
