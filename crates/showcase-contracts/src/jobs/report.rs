use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{now_utc_iso, write_json_object};

/// End-of-job rollup written next to the manifest as `summary.json`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub total_shots: u64,
    pub produced: Vec<String>,
    pub low_confidence: Vec<String>,
    pub skipped: Vec<String>,
}

impl JobReport {
    pub fn produced_count(&self) -> usize {
        self.produced.len()
    }
}

/// Writes the report plus counts and a timestamp; `extra` keys win.
pub fn write_report(
    path: &Path,
    report: &JobReport,
    extra: Option<&Map<String, Value>>,
) -> anyhow::Result<()> {
    let mut payload = match serde_json::to_value(report)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    payload.insert(
        "counts".to_string(),
        json!({
            "produced": report.produced_count(),
            "low_confidence": report.low_confidence.len(),
            "skipped": report.skipped.len(),
        }),
    );
    payload.insert("ts".to_string(), Value::String(now_utc_iso()));
    if let Some(extra) = extra {
        payload.extend(extra.clone());
    }
    write_json_object(path, &payload)
        .with_context(|| format!("failed to write job report {}", path.display()))
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::{write_report, JobReport};

    #[test]
    fn write_report_generates_expected_payload() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("summary.json");
        let report = JobReport {
            job_id: "job-9".to_string(),
            started_at: "2026-10-19T00:00:00+00:00".to_string(),
            finished_at: "2026-10-19T00:20:00+00:00".to_string(),
            total_shots: 3,
            produced: vec!["hero_facade".to_string(), "context_street".to_string()],
            low_confidence: vec!["context_street".to_string()],
            skipped: vec!["spatial_volume".to_string()],
        };
        let mut extra = Map::new();
        extra.insert("model".to_string(), json!("dryrun"));
        write_report(&path, &report, Some(&extra))?;

        let parsed: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        assert_eq!(parsed["job_id"], json!("job-9"));
        assert_eq!(parsed["skipped"][0], json!("spatial_volume"));
        assert_eq!(parsed["model"], json!("dryrun"));
        assert_eq!(parsed["counts"]["low_confidence"], json!(1));
        assert!(parsed.get("ts").and_then(Value::as_str).is_some());
        assert_eq!(report.produced_count(), 2);
        Ok(())
    }
}
