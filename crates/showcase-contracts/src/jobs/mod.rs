mod manifest;
mod report;
mod state;
mod status;
mod store;

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub use manifest::{Manifest, ManifestKind, ShotResult};
pub use report::{write_report, JobReport};
pub use state::{JobState, StatusUpdate};
pub use status::JobStatus;
pub use store::{JobStore, EVENTS_FILE, MANIFEST_FILE, STATUS_FILE, SUMMARY_FILE};

pub(crate) fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

pub(crate) fn read_json_object(path: &Path) -> Option<Map<String, Value>> {
    let raw = std::fs::read_to_string(path).ok()?;
    let parsed: Value = serde_json::from_str(&raw).ok()?;
    parsed.as_object().cloned()
}

pub(crate) fn write_json_object(path: &Path, payload: &Map<String, Value>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(
        path,
        serde_json::to_string_pretty(&Value::Object(payload.clone()))?,
    )?;
    Ok(())
}
