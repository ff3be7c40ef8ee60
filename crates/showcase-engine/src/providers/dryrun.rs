use std::io::Cursor;

use anyhow::Context;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use showcase_contracts::brief::ProjectBrief;
use showcase_contracts::verify::{Verdict, CRITERION_MAX};

use super::{
    default_style_analysis, ConsistencyJudge, ImageData, ImageSynthesizer, JudgeRequest,
    ProjectAnalyst, SynthesisRequest,
};

const DRYRUN_LONG_EDGE: u32 = 256;

/// Offline provider: solid-colour images keyed by the instruction, and a
/// judge whose scores are a pure function of the candidate bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryrunProvider;

impl ImageSynthesizer for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn synthesize(&self, request: &SynthesisRequest<'_>) -> anyhow::Result<Option<ImageData>> {
        let (width, height) = dims_for_ratio(request.aspect_ratio);
        let (r, g, b) = color_from_prompt(request.instruction);
        let mut image = RgbImage::new(width, height);
        for pixel in image.pixels_mut() {
            *pixel = Rgb([r, g, b]);
        }
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .context("dryrun image encode failed")?;
        Ok(Some(ImageData::new(bytes, "image/png")))
    }
}

impl ConsistencyJudge for DryrunProvider {
    fn judge(&self, request: &JudgeRequest<'_>) -> anyhow::Result<Verdict> {
        let mut hasher = Sha256::new();
        hasher.update(&request.reference.bytes);
        hasher.update(&request.candidate.bytes);
        hasher.update(request.profile.as_str().as_bytes());
        let digest = hasher.finalize();

        let mut breakdown = IndexMap::new();
        let mut issues = Vec::new();
        for (idx, criterion) in request.profile.criteria().iter().enumerate() {
            let score = (CRITERION_MAX - 8) + u32::from(digest[idx]) % 9;
            if score < 16 {
                issues.push(format!(
                    "{} drifts from the reference",
                    criterion.key.replace('_', " ")
                ));
            }
            breakdown.insert(criterion.key.to_string(), score);
        }
        let score = breakdown.values().sum();
        Ok(Verdict {
            score,
            breakdown,
            issues,
            suggestions: Vec::new(),
        })
    }
}

impl ProjectAnalyst for DryrunProvider {
    fn parse_brief(&self, prompt: &str) -> anyhow::Result<ProjectBrief> {
        Ok(ProjectBrief::fallback(prompt))
    }

    fn describe_reference(&self, image: &ImageData) -> anyhow::Result<String> {
        let digest = Sha256::digest(&image.bytes);
        Ok(format!(
            "Dryrun reference {} ({} bytes, {})",
            hex::encode(&digest[..4]),
            image.bytes.len(),
            image.mime_type
        ))
    }

    fn analyze_inspiration(&self, image: &ImageData) -> anyhow::Result<Map<String, Value>> {
        let mut analysis = default_style_analysis();
        analysis.insert(
            "source".to_string(),
            json!({ "provider": "dryrun", "bytes": image.bytes.len() }),
        );
        Ok(analysis)
    }
}

fn dims_for_ratio(ratio: &str) -> (u32, u32) {
    let parsed = ratio
        .split_once(':')
        .and_then(|(w, h)| Some((w.trim().parse::<u32>().ok()?, h.trim().parse::<u32>().ok()?)))
        .filter(|(w, h)| *w > 0 && *h > 0);
    let Some((w, h)) = parsed else {
        return (DRYRUN_LONG_EDGE, DRYRUN_LONG_EDGE);
    };
    if w >= h {
        (DRYRUN_LONG_EDGE, (DRYRUN_LONG_EDGE * h / w).max(1))
    } else {
        ((DRYRUN_LONG_EDGE * w / h).max(1), DRYRUN_LONG_EDGE)
    }
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let digest = Sha256::digest(prompt.as_bytes());
    (digest[0], digest[1], digest[2])
}

#[cfg(test)]
mod tests {
    use showcase_contracts::brief::ProjectBrief;
    use showcase_contracts::shots::catalog;
    use showcase_contracts::verify::VerificationProfile;

    use super::{dims_for_ratio, DryrunProvider};
    use crate::providers::{ConsistencyJudge, ImageSynthesizer, JudgeRequest, SynthesisRequest};

    #[test]
    fn synthesizes_png_sized_to_ratio() -> anyhow::Result<()> {
        let provider = DryrunProvider;
        let image = provider
            .synthesize(&SynthesisRequest {
                instruction: "facade",
                reference: None,
                aspect_ratio: "3:4",
            })?
            .ok_or_else(|| anyhow::anyhow!("no image"))?;
        assert_eq!(image.mime_type, "image/png");
        let decoded = image::load_from_memory(&image.bytes)?;
        assert_eq!((decoded.width(), decoded.height()), (192, 256));
        assert_eq!(dims_for_ratio("16:9"), (256, 144));
        assert_eq!(dims_for_ratio("wide"), (256, 256));
        Ok(())
    }

    #[test]
    fn judge_is_deterministic_and_in_range() -> anyhow::Result<()> {
        let provider = DryrunProvider;
        let hero = provider
            .synthesize(&SynthesisRequest {
                instruction: "hero",
                reference: None,
                aspect_ratio: "16:9",
            })?
            .ok_or_else(|| anyhow::anyhow!("no image"))?;
        let brief = ProjectBrief::fallback("two homes");
        let shot = catalog::hero();
        let request = JudgeRequest {
            reference: &hero,
            candidate: &hero,
            profile: VerificationProfile::Interior,
            shot: &shot,
            brief: &brief,
        };
        let first = provider.judge(&request)?;
        let second = provider.judge(&request)?;
        assert_eq!(first, second);
        assert_eq!(first.breakdown.len(), 5);
        assert!(first.breakdown.contains_key("spatial_quality"));
        assert!((60..=100).contains(&first.score));
        Ok(())
    }
}
