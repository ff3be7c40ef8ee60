use std::fmt;

use anyhow::{bail, Context};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const MAX_SCORE: u32 = 100;
pub const CRITERION_MAX: u32 = 20;
/// A criterion scoring below this (80% of `CRITERION_MAX`) gets a fix directive.
pub const WEAK_CRITERION_BELOW: u32 = 16;

/// Which rubric the judge scores a candidate against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationProfile {
    /// Same building as the reference: silhouette, style, materials, openings, proportions.
    Exterior,
    /// Style and quality coherence with the exterior reference and the project brief.
    Interior,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Criterion {
    pub key: &'static str,
    pub label: &'static str,
    pub checks: &'static str,
}

const EXTERIOR_CRITERIA: [Criterion; 5] = [
    Criterion {
        key: "building_shape",
        label: "BUILDING_SHAPE",
        checks: "Does the silhouette and overall form match?",
    },
    Criterion {
        key: "architectural_style",
        label: "ARCHITECTURAL_STYLE",
        checks: "Is the design language consistent?",
    },
    Criterion {
        key: "materials_facade",
        label: "MATERIALS_FACADE",
        checks: "Are materials, colours, and textures the same?",
    },
    Criterion {
        key: "windows_openings",
        label: "WINDOWS_OPENINGS",
        checks: "Do window patterns and placements match?",
    },
    Criterion {
        key: "proportions",
        label: "PROPORTIONS",
        checks: "Are scale and dimensional relationships correct?",
    },
];

const INTERIOR_CRITERIA: [Criterion; 5] = [
    Criterion {
        key: "interior_style_consistency",
        label: "INTERIOR_STYLE_CONSISTENCY",
        checks: "Does the interior style match the exterior's architectural language?",
    },
    Criterion {
        key: "material_finish_quality",
        label: "MATERIAL_FINISH_QUALITY",
        checks: "Do materials and finishes match the stated finish level?",
    },
    Criterion {
        key: "lighting_appropriateness",
        label: "LIGHTING_APPROPRIATENESS",
        checks: "Is the lighting photorealistic with natural light handled realistically?",
    },
    Criterion {
        key: "spatial_quality",
        label: "SPATIAL_QUALITY",
        checks: "Do room proportions and ceiling heights suit the project type?",
    },
    Criterion {
        key: "project_context_match",
        label: "PROJECT_CONTEXT_MATCH",
        checks: "Does this interior belong to this building and market level?",
    },
];

impl VerificationProfile {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exterior => "exterior",
            Self::Interior => "interior",
        }
    }

    pub fn criteria(self) -> &'static [Criterion] {
        match self {
            Self::Exterior => &EXTERIOR_CRITERIA,
            Self::Interior => &INTERIOR_CRITERIA,
        }
    }
}

impl fmt::Display for VerificationProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured judgment of one candidate.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Verdict {
    pub score: u32,
    #[serde(default)]
    pub breakdown: IndexMap<String, u32>,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl Verdict {
    /// Criteria below 80% of their maximum, in breakdown order.
    pub fn weak_criteria(&self) -> Vec<(&str, u32)> {
        self.breakdown
            .iter()
            .filter(|(_, score)| **score < WEAK_CRITERION_BELOW)
            .map(|(key, score)| (key.as_str(), *score))
            .collect()
    }
}

/// Parses a judge's raw reply into a [`Verdict`].
///
/// `total_score` falls back to the breakdown sum when absent.
pub fn parse_verdict(raw: &str) -> anyhow::Result<Verdict> {
    let obj = lenient_json_object(raw).context("judge returned an unusable verdict")?;

    let mut breakdown = IndexMap::new();
    if let Some(rows) = obj.get("breakdown").and_then(Value::as_object) {
        for (key, value) in rows {
            if let Some(score) = value_as_score(value) {
                breakdown.insert(key.clone(), score.min(CRITERION_MAX));
            }
        }
    }

    let score = match obj.get("total_score").and_then(value_as_score) {
        Some(score) => score,
        None if !breakdown.is_empty() => breakdown.values().sum(),
        None => bail!("judge verdict has neither total_score nor breakdown"),
    }
    .min(MAX_SCORE);

    Ok(Verdict {
        score,
        breakdown,
        issues: string_list(obj.get("issues")),
        suggestions: string_list(obj.get("suggestions")),
    })
}

/// Reads a model reply as one JSON object: code fences are stripped and a
/// top-level array yields its first element.
pub fn lenient_json_object(raw: &str) -> anyhow::Result<Map<String, Value>> {
    let parsed: Value = serde_json::from_str(strip_code_fence(raw))?;
    let parsed = match parsed {
        Value::Array(mut rows) if !rows.is_empty() => rows.swap_remove(0),
        other => other,
    };
    match parsed {
        Value::Object(obj) => Ok(obj),
        _ => bail!("expected a JSON object"),
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

pub(crate) fn value_as_score(value: &Value) -> Option<u32> {
    let parsed = match value {
        Value::Number(num) => num.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    if !parsed.is_finite() {
        return None;
    }
    Some(parsed.round().max(0.0) as u32)
}

pub(crate) fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|row| !row.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{parse_verdict, VerificationProfile, MAX_SCORE};

    #[test]
    fn both_rubrics_are_five_by_twenty() {
        for profile in [VerificationProfile::Exterior, VerificationProfile::Interior] {
            assert_eq!(profile.criteria().len(), 5);
            assert_eq!(profile.criteria().len() as u32 * super::CRITERION_MAX, MAX_SCORE);
        }
        assert_eq!(VerificationProfile::Interior.criteria()[0].key, "interior_style_consistency");
    }

    #[test]
    fn parses_fenced_verdict() -> anyhow::Result<()> {
        let raw = "```json\n{\"total_score\": 72, \"breakdown\": {\"building_shape\": 18, \"proportions\": 12.4},\n\"issues\": [\"roof pitch too shallow\", \"\"], \"suggestions\": [\"steepen roof\"]}\n```";
        let verdict = parse_verdict(raw)?;
        assert_eq!(verdict.score, 72);
        assert_eq!(verdict.breakdown["proportions"], 12);
        assert_eq!(verdict.issues, vec!["roof pitch too shallow"]);
        assert_eq!(verdict.weak_criteria(), vec![("proportions", 12)]);
        Ok(())
    }

    #[test]
    fn array_reply_and_missing_total_use_breakdown_sum() -> anyhow::Result<()> {
        let verdict = parse_verdict(r#"[{"breakdown": {"a": 20, "b": 19, "c": 30}}]"#)?;
        assert_eq!(verdict.score, 59);
        assert!(verdict.issues.is_empty());
        Ok(())
    }

    #[test]
    fn unusable_replies_are_errors() {
        assert!(parse_verdict("the building looks great").is_err());
        assert!(parse_verdict("{\"issues\": []}").is_err());
        assert!(parse_verdict("42").is_err());
    }

    #[test]
    fn scores_are_clamped() -> anyhow::Result<()> {
        let verdict = parse_verdict(r#"{"total_score": "140", "breakdown": {"x": -3}}"#)?;
        assert_eq!(verdict.score, MAX_SCORE);
        assert_eq!(verdict.breakdown["x"], 0);
        Ok(())
    }
}
