use anyhow::bail;
use indexmap::IndexMap;
use showcase_contracts::brief::ProjectBrief;
use showcase_contracts::shots::ShotSpec;
use showcase_contracts::verify::{Verdict, CRITERION_MAX, MAX_SCORE};

use crate::error_chain_text;
use crate::prompts::with_fixing_feedback;
use crate::providers::{ConsistencyJudge, ImageData, ImageSynthesizer, JudgeRequest, SynthesisRequest};

const ERROR_TEXT_LIMIT: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    pub max_attempts: u32,
    /// A score must be strictly greater than this to pass.
    pub acceptance_threshold: u32,
}

impl LoopSettings {
    pub fn new(max_attempts: u32, acceptance_threshold: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            acceptance_threshold: acceptance_threshold.min(MAX_SCORE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Accepted,
    BelowThreshold,
    NoImage,
    SynthesisFailed(String),
    JudgeFailed(String),
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::BelowThreshold => "below_threshold",
            Self::NoImage => "no_image",
            Self::SynthesisFailed(_) => "synthesis_failed",
            Self::JudgeFailed(_) => "judge_failed",
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::SynthesisFailed(err) | Self::JudgeFailed(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub attempt: u32,
    /// Absent when no image was produced.
    pub score: Option<u32>,
    pub outcome: AttemptOutcome,
}

/// The best-scoring image retained across a shot's attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinedShot {
    pub image: ImageData,
    pub score: u32,
    pub breakdown: IndexMap<String, u32>,
    pub attempts: u32,
    pub low_confidence: bool,
    pub history: Vec<AttemptRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShotOutcome {
    Produced(RefinedShot),
    /// No attempt produced an image with a positive judged score.
    Skipped {
        attempts: u32,
        history: Vec<AttemptRecord>,
    },
}

/// Hooks for progress reporting while a shot is refined.
pub trait LoopObserver {
    fn judging(&mut self, _shot: &ShotSpec, _attempt: u32) {}
    fn attempt_finished(&mut self, _shot: &ShotSpec, _record: &AttemptRecord) {}
}

pub struct NoopObserver;

impl LoopObserver for NoopObserver {}

/// Everything one shot's loop needs besides the capabilities.
pub struct ShotContext<'a> {
    pub shot: &'a ShotSpec,
    pub base_instruction: &'a str,
    /// Hero image for variations; optional for the hero itself.
    pub reference: Option<&'a ImageData>,
    pub brief: &'a ProjectBrief,
}

struct Candidate {
    image: ImageData,
    score: u32,
    breakdown: IndexMap<String, u32>,
}

/// Synthesize, judge and refine one shot until it passes or the budget runs out.
pub struct RefinementLoop<'a> {
    synthesizer: &'a dyn ImageSynthesizer,
    judge: &'a dyn ConsistencyJudge,
    settings: LoopSettings,
}

impl<'a> RefinementLoop<'a> {
    pub fn new(
        synthesizer: &'a dyn ImageSynthesizer,
        judge: &'a dyn ConsistencyJudge,
        settings: LoopSettings,
    ) -> Self {
        Self {
            synthesizer,
            judge,
            settings,
        }
    }

    pub fn settings(&self) -> LoopSettings {
        self.settings
    }

    /// Runs the loop. Per-attempt failures become data; only a variation
    /// without a reference image is an error.
    pub fn run(
        &self,
        ctx: &ShotContext<'_>,
        observer: &mut dyn LoopObserver,
    ) -> anyhow::Result<ShotOutcome> {
        let shot = ctx.shot;
        if !shot.is_hero && ctx.reference.is_none() {
            bail!("shot '{}' needs the hero image as reference", shot.shot_id);
        }

        let threshold = self.settings.acceptance_threshold;
        let mut best: Option<Candidate> = None;
        let mut feedback: Option<String> = None;
        let mut history = Vec::new();
        let mut attempts = 0;

        for attempt in 1..=self.settings.max_attempts {
            attempts = attempt;
            let instruction = with_fixing_feedback(ctx.base_instruction, feedback.as_deref());
            let synthesized = self.synthesizer.synthesize(&SynthesisRequest {
                instruction: &instruction,
                reference: ctx.reference,
                aspect_ratio: &shot.aspect_ratio,
            });
            let image = match synthesized {
                Ok(Some(image)) => image,
                Ok(None) => {
                    record(&mut history, observer, shot, attempt, None, AttemptOutcome::NoImage);
                    continue;
                }
                Err(err) => {
                    let outcome =
                        AttemptOutcome::SynthesisFailed(error_chain_text(&err, ERROR_TEXT_LIMIT));
                    record(&mut history, observer, shot, attempt, None, outcome);
                    continue;
                }
            };

            if shot.is_hero {
                record(
                    &mut history,
                    observer,
                    shot,
                    attempt,
                    Some(MAX_SCORE),
                    AttemptOutcome::Accepted,
                );
                return Ok(ShotOutcome::Produced(RefinedShot {
                    image,
                    score: MAX_SCORE,
                    breakdown: IndexMap::new(),
                    attempts,
                    low_confidence: false,
                    history,
                }));
            }

            observer.judging(shot, attempt);
            let judged = match ctx.reference {
                Some(reference) => self.judge.judge(&JudgeRequest {
                    reference,
                    candidate: &image,
                    profile: shot.profile,
                    shot,
                    brief: ctx.brief,
                }),
                None => bail!("shot '{}' lost its reference image", shot.shot_id),
            };
            let (verdict, judge_error) = match judged {
                Ok(verdict) => (Some(verdict), None),
                Err(err) => (None, Some(error_chain_text(&err, ERROR_TEXT_LIMIT))),
            };
            let score = verdict.as_ref().map(|v| v.score.min(MAX_SCORE)).unwrap_or(0);

            // Unjudged or zero-scored images never become the retained candidate.
            let best_score = best.as_ref().map_or(0, |current| current.score);
            if let Some(judged) = verdict.as_ref().filter(|_| score > best_score) {
                best = Some(Candidate {
                    image,
                    score,
                    breakdown: judged.breakdown.clone(),
                });
            }

            if score > threshold {
                record(
                    &mut history,
                    observer,
                    shot,
                    attempt,
                    Some(score),
                    AttemptOutcome::Accepted,
                );
                break;
            }

            let outcome = match judge_error {
                Some(err) => AttemptOutcome::JudgeFailed(err),
                None => AttemptOutcome::BelowThreshold,
            };
            record(&mut history, observer, shot, attempt, Some(score), outcome);
            feedback = verdict.as_ref().and_then(build_fixing_feedback);
        }

        Ok(match best {
            Some(candidate) => ShotOutcome::Produced(RefinedShot {
                low_confidence: candidate.score <= threshold,
                image: candidate.image,
                score: candidate.score,
                breakdown: candidate.breakdown,
                attempts,
                history,
            }),
            None => ShotOutcome::Skipped { attempts, history },
        })
    }
}

fn record(
    history: &mut Vec<AttemptRecord>,
    observer: &mut dyn LoopObserver,
    shot: &ShotSpec,
    attempt: u32,
    score: Option<u32>,
    outcome: AttemptOutcome,
) {
    let entry = AttemptRecord {
        attempt,
        score,
        outcome,
    };
    observer.attempt_finished(shot, &entry);
    history.push(entry);
}

/// Fixing directives from one critique: every criterion under 80% of its
/// maximum, then every issue and suggestion verbatim. `None` when the
/// critique holds nothing to act on.
pub fn build_fixing_feedback(verdict: &Verdict) -> Option<String> {
    let mut lines = Vec::new();
    for (criterion, score) in verdict.weak_criteria() {
        lines.push(format!(
            "<fix criterion='{criterion}' score='{score}/{CRITERION_MAX}'>Improve this aspect significantly</fix>"
        ));
    }
    for issue in &verdict.issues {
        lines.push(format!("<issue>{issue}</issue>"));
    }
    for suggestion in &verdict.suggestions {
        lines.push(format!("<suggestion>{suggestion}</suggestion>"));
    }
    if lines.is_empty() {
        return None;
    }
    Some(format!("<fixes_required>\n{}\n</fixes_required>", lines.join("\n")))
}
