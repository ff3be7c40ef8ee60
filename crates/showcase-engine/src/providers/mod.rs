mod dryrun;
mod gemini;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde_json::{Map, Value};
use showcase_contracts::brief::ProjectBrief;
use showcase_contracts::shots::ShotSpec;
use showcase_contracts::verify::{VerificationProfile, Verdict};

use crate::config::{EngineSettings, ProviderKind};

pub use dryrun::DryrunProvider;
pub use gemini::GeminiProvider;

/// Encoded image bytes plus their mime type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImageData {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        Ok(Self::new(bytes, mime_for_path(path).unwrap_or("image/png")))
    }

    /// File extension matching the mime type; png when unknown.
    pub fn extension(&self) -> &'static str {
        let lowered = self.mime_type.to_ascii_lowercase();
        if lowered.contains("jpeg") || lowered.contains("jpg") {
            "jpg"
        } else if lowered.contains("webp") {
            "webp"
        } else {
            "png"
        }
    }
}

pub struct SynthesisRequest<'a> {
    pub instruction: &'a str,
    pub reference: Option<&'a ImageData>,
    pub aspect_ratio: &'a str,
}

pub struct JudgeRequest<'a> {
    pub reference: &'a ImageData,
    pub candidate: &'a ImageData,
    pub profile: VerificationProfile,
    pub shot: &'a ShotSpec,
    pub brief: &'a ProjectBrief,
}

/// Produces an image from an instruction. `Ok(None)` means the model answered
/// without an image.
pub trait ImageSynthesizer: Send + Sync {
    fn name(&self) -> &str;
    fn synthesize(&self, request: &SynthesisRequest<'_>) -> anyhow::Result<Option<ImageData>>;
}

/// Scores a candidate against the reference under one rubric.
pub trait ConsistencyJudge: Send + Sync {
    fn judge(&self, request: &JudgeRequest<'_>) -> anyhow::Result<Verdict>;
}

/// Text and vision analysis around the loop: request parsing and reference descriptions.
pub trait ProjectAnalyst: Send + Sync {
    fn parse_brief(&self, prompt: &str) -> anyhow::Result<ProjectBrief>;
    fn describe_reference(&self, image: &ImageData) -> anyhow::Result<String>;
    fn analyze_inspiration(&self, image: &ImageData) -> anyhow::Result<Map<String, Value>>;
}

/// The external capabilities a job runs against, injected into the engine.
#[derive(Clone)]
pub struct Capabilities {
    pub synthesizer: Arc<dyn ImageSynthesizer>,
    pub judge: Arc<dyn ConsistencyJudge>,
    pub analyst: Arc<dyn ProjectAnalyst>,
}

impl Capabilities {
    pub fn from_settings(settings: &EngineSettings) -> anyhow::Result<Self> {
        match settings.provider {
            ProviderKind::Dryrun => Ok(Self::dryrun()),
            ProviderKind::Gemini => {
                let provider = Arc::new(GeminiProvider::new(settings)?);
                Ok(Self {
                    synthesizer: provider.clone(),
                    judge: provider.clone(),
                    analyst: provider,
                })
            }
        }
    }

    pub fn dryrun() -> Self {
        let provider = Arc::new(DryrunProvider);
        Self {
            synthesizer: provider.clone(),
            judge: provider.clone(),
            analyst: provider,
        }
    }

    pub fn synthesizer_name(&self) -> &str {
        self.synthesizer.name()
    }
}

pub(crate) fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// Default style analysis used when the inspiration image cannot be analysed.
pub fn default_style_analysis() -> Map<String, Value> {
    let value = serde_json::json!({
        "architectural_style": {
            "primary": "Contemporary",
            "design_philosophy": "Clean lines and quality materials"
        },
        "materials": {
            "primary_material": "Quality facade materials",
            "secondary_material": "Complementary accents"
        },
        "design_elements": {
            "roof_form": "Contemporary",
            "key_features": ["Quality detailing"]
        },
        "colour_scheme": {
            "dominant_colours": ["Neutral tones"],
            "temperature": "Neutral"
        },
        "distinctive_features": ["Professional architectural quality"],
        "style_summary": "A contemporary design with quality materials and clean architectural lines."
    });
    value.as_object().cloned().unwrap_or_default()
}
