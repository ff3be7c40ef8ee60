use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::verify::{lenient_json_object, string_list, value_as_score};

pub const DEFAULT_SUBURB: &str = "balwyn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    #[default]
    DualOccupancy,
    Townhouses,
    Apartments,
}

impl ProjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DualOccupancy => "dual_occupancy",
            Self::Townhouses => "townhouses",
            Self::Apartments => "apartments",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::DualOccupancy => "Dual Occupancy",
            Self::Townhouses => "Townhouses",
            Self::Apartments => "Apartments",
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectType {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "dual_occupancy" | "dual_occ" | "duplex" => Ok(Self::DualOccupancy),
            "townhouses" | "townhouse" => Ok(Self::Townhouses),
            "apartments" | "apartment" => Ok(Self::Apartments),
            _ => bail!("unknown project type '{raw}'"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishLevel {
    Standard,
    #[default]
    Premium,
    Luxury,
}

impl FinishLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Premium => "premium",
            Self::Luxury => "luxury",
        }
    }

    fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "standard" => Self::Standard,
            "luxury" => Self::Luxury,
            _ => Self::Premium,
        }
    }
}

impl fmt::Display for FinishLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured attributes of the development described in a job request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectBrief {
    pub project_type: ProjectType,
    pub suburb: Option<String>,
    pub num_units: u32,
    pub storeys: u32,
    pub style_keywords: Vec<String>,
    pub materials: Vec<String>,
    pub special_features: Vec<String>,
    pub finish_level: FinishLevel,
    pub summary: String,
}

impl ProjectBrief {
    /// Brief used when the analyst cannot parse the request.
    pub fn fallback(prompt: &str) -> Self {
        let lowered = prompt.to_ascii_lowercase();
        let project_type = if lowered.contains("apartment") {
            ProjectType::Apartments
        } else if lowered.contains("townhouse") {
            ProjectType::Townhouses
        } else {
            ProjectType::DualOccupancy
        };
        let finish_level = if ["luxury", "high-end", "high end"]
            .iter()
            .any(|word| lowered.contains(word))
        {
            FinishLevel::Luxury
        } else if ["affordable", "basic"].iter().any(|word| lowered.contains(word)) {
            FinishLevel::Standard
        } else {
            FinishLevel::Premium
        };

        Self {
            project_type,
            suburb: None,
            num_units: 2,
            storeys: 2,
            style_keywords: vec!["modern".to_string(), "contemporary".to_string()],
            materials: vec!["brick".to_string(), "render".to_string()],
            special_features: Vec::new(),
            finish_level,
            summary: prompt.trim().to_string(),
        }
    }

    /// Parses an analyst reply. Missing or null fields take the fallback values.
    pub fn from_analyst_reply(raw: &str, prompt: &str) -> anyhow::Result<Self> {
        let obj = lenient_json_object(raw).context("project analyst returned an unusable brief")?;
        Ok(Self::from_object(&obj, prompt))
    }

    fn from_object(obj: &Map<String, Value>, prompt: &str) -> Self {
        let defaults = Self::fallback(prompt);
        let text = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty() && *value != "null")
                .map(str::to_string)
        };
        let count = |key: &str, default: u32| {
            obj.get(key)
                .and_then(value_as_score)
                .filter(|value| *value > 0)
                .unwrap_or(default)
        };
        let list = |key: &str, default: Vec<String>| {
            if obj.get(key).is_some_and(Value::is_array) {
                string_list(obj.get(key))
            } else {
                default
            }
        };

        Self {
            project_type: text("project_type")
                .and_then(|raw| raw.parse().ok())
                .unwrap_or_default(),
            suburb: text("suburb").map(|raw| raw.to_ascii_lowercase()),
            num_units: count("num_units", defaults.num_units),
            storeys: count("storeys", defaults.storeys),
            style_keywords: list("style_keywords", defaults.style_keywords),
            materials: list("materials", defaults.materials),
            special_features: list("special_features", defaults.special_features),
            finish_level: text("finish_level")
                .map(|raw| FinishLevel::parse_lenient(&raw))
                .unwrap_or_default(),
            summary: text("summary").unwrap_or(defaults.summary),
        }
    }

    pub fn apply(&mut self, overrides: &BriefOverrides) {
        if let Some(project_type) = overrides.project_type {
            self.project_type = project_type;
        }
        if let Some(suburb) = overrides
            .suburb
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            self.suburb = Some(suburb.to_ascii_lowercase());
        }
    }

    pub fn suburb_or_default(&self) -> &str {
        self.suburb.as_deref().unwrap_or(DEFAULT_SUBURB)
    }

    pub fn is_multi_unit(&self) -> bool {
        match self.project_type {
            ProjectType::Apartments => true,
            ProjectType::Townhouses => self.num_units >= 3,
            ProjectType::DualOccupancy => false,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Caller-supplied values that win over whatever the analyst parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BriefOverrides {
    pub project_type: Option<ProjectType>,
    pub suburb: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::{BriefOverrides, FinishLevel, ProjectBrief, ProjectType};

    #[test]
    fn parses_fenced_array_reply() -> anyhow::Result<()> {
        let raw = "```json\n[{\"project_type\": \"townhouses\", \"suburb\": \"Kew\", \"num_units\": 3,\
                   \"storeys\": null, \"style_keywords\": [\"brutalist\"], \"materials\": [\"concrete\"],\
                   \"finish_level\": \"luxury\", \"summary\": \"Three concrete townhouses\"}]\n```";
        let brief = ProjectBrief::from_analyst_reply(raw, "three townhouses in kew")?;
        assert_eq!(brief.project_type, ProjectType::Townhouses);
        assert_eq!(brief.suburb.as_deref(), Some("kew"));
        assert_eq!(brief.num_units, 3);
        assert_eq!(brief.storeys, 2);
        assert_eq!(brief.materials, vec!["concrete"]);
        assert!(brief.special_features.is_empty());
        assert_eq!(brief.finish_level, FinishLevel::Luxury);
        assert!(brief.is_multi_unit());
        Ok(())
    }

    #[test]
    fn unknown_values_fall_back() -> anyhow::Result<()> {
        let brief = ProjectBrief::from_analyst_reply(
            r#"{"project_type": "castle", "suburb": null, "finish_level": "gold"}"#,
            "something grand",
        )?;
        assert_eq!(brief.project_type, ProjectType::DualOccupancy);
        assert_eq!(brief.suburb_or_default(), "balwyn");
        assert_eq!(brief.finish_level, FinishLevel::Premium);
        assert_eq!(brief.summary, "something grand");
        assert_eq!(brief.style_keywords, vec!["modern", "contemporary"]);
        assert!(ProjectBrief::from_analyst_reply("no json here", "x").is_err());
        Ok(())
    }

    #[test]
    fn fallback_reads_keywords() {
        let brief = ProjectBrief::fallback("Luxury apartment block near the park");
        assert_eq!(brief.project_type, ProjectType::Apartments);
        assert_eq!(brief.finish_level, FinishLevel::Luxury);
        assert_eq!(brief.num_units, 2);

        let plain = ProjectBrief::fallback("two homes on a corner block");
        assert_eq!(plain.project_type, ProjectType::DualOccupancy);
        assert!(!plain.is_multi_unit());
    }

    #[test]
    fn overrides_replace_parsed_values() -> anyhow::Result<()> {
        let mut brief = ProjectBrief::fallback("two homes");
        brief.apply(&BriefOverrides {
            project_type: Some("apartment".parse()?),
            suburb: Some("  Brighton ".to_string()),
        });
        assert_eq!(brief.project_type, ProjectType::Apartments);
        assert_eq!(brief.suburb_or_default(), "brighton");

        brief.apply(&BriefOverrides {
            project_type: None,
            suburb: Some(String::new()),
        });
        assert_eq!(brief.suburb_or_default(), "brighton");
        assert!("villa".parse::<ProjectType>().is_err());
        Ok(())
    }
}
