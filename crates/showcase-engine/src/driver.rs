use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use showcase_contracts::brief::{BriefOverrides, ProjectBrief};
use showcase_contracts::events::EventWriter;
use showcase_contracts::jobs::{
    write_report, JobReport, JobStatus, JobStore, ManifestKind, ShotResult, StatusUpdate,
};
use showcase_contracts::shots::{catalog, ShotPlan, ShotSpec};

use crate::config::EngineSettings;
use crate::prompts;
use crate::providers::{default_style_analysis, mime_for_path, Capabilities, ImageData};
use crate::refine::{AttemptRecord, LoopObserver, LoopSettings, RefinementLoop, ShotContext, ShotOutcome};
use crate::{error_chain_text, now_utc_iso};

const GENERIC_REFERENCE_DESCRIPTION: &str =
    "Modern residential building with quality architectural detailing";
const ERROR_TEXT_LIMIT: usize = 400;

#[derive(Debug, Clone, Default)]
pub struct ProjectRequest {
    pub prompt: String,
    pub overrides: BriefOverrides,
    /// Pre-approved hero image; hero synthesis is skipped when set.
    pub from_hero: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct InspirationRequest {
    pub inspiration: PathBuf,
    pub prompt: Option<String>,
    pub overrides: BriefOverrides,
    /// Reviewer feedback on a previous hero.
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub job_id: String,
    pub status: JobStatus,
    pub message: String,
    pub results: Vec<ShotResult>,
    pub low_confidence: Vec<String>,
    pub skipped: Vec<String>,
}

impl JobOutcome {
    fn new(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            status: JobStatus::Created,
            message: String::new(),
            results: Vec::new(),
            low_confidence: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

/// Drives showcase jobs: plan, hero, variations, persistence.
pub struct ShowcaseEngine {
    capabilities: Capabilities,
    settings: EngineSettings,
    jobs_root: PathBuf,
    cancel: Arc<AtomicBool>,
}

impl ShowcaseEngine {
    pub fn new(
        capabilities: Capabilities,
        settings: EngineSettings,
        jobs_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            capabilities,
            settings,
            jobs_root: jobs_root.into(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shares an externally owned cancel flag, checked between shots.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.jobs_root.join(job_id)
    }

    fn loop_settings(&self) -> LoopSettings {
        LoopSettings::new(self.settings.max_attempts, self.settings.acceptance_threshold)
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn generate_project(
        &self,
        job_id: &str,
        request: &ProjectRequest,
    ) -> anyhow::Result<JobOutcome> {
        let mut run = JobRun::open(&self.job_dir(job_id), job_id)?;
        let result = self.run_project(&mut run, request);
        run.fail_on_error(result)
    }

    fn run_project(&self, run: &mut JobRun, request: &ProjectRequest) -> anyhow::Result<JobOutcome> {
        let started_at = now_utc_iso();
        let carried = run.carried_inspiration();
        let prompt = if request.prompt.trim().is_empty() {
            carried.prompt.clone().unwrap_or_default()
        } else {
            request.prompt.trim().to_string()
        };

        run.emit(
            "job_started",
            json!({
                "flow": "project",
                "prompt": prompt,
                "provider": self.capabilities.synthesizer_name(),
                "threshold": self.settings.acceptance_threshold,
                "max_attempts": self.settings.max_attempts,
                "from_hero": request.from_hero.as_ref().map(|p| p.display().to_string()),
            }),
        )?;
        run.store.update_status(
            StatusUpdate::with_status(JobStatus::Parsing)
                .progress(2)
                .message("Parsing project requirements...")
                .field("flow_type", json!("project"))
                .field("prompt", json!(prompt)),
        )?;

        let brief = self.resolve_brief(run, &prompt, &request.overrides)?;
        let plan = ShotPlan::for_brief(&brief)?;
        let total = plan.len() as u64;
        run.emit(
            "plan_built",
            json!({ "total": total, "shot_ids": plan.shot_ids(), "multi_unit": brief.is_multi_unit() }),
        )?;

        let mut metadata = Map::new();
        metadata.insert("prompt".to_string(), json!(prompt));
        metadata.insert("brief".to_string(), brief.to_value());
        metadata.insert("suburb".to_string(), json!(brief.suburb_or_default()));
        metadata.insert("model".to_string(), json!(self.settings.image_model));
        metadata.insert("total_shots".to_string(), json!(total));
        if let Some(inspiration) = carried.inspiration {
            metadata.insert("inspiration".to_string(), inspiration);
        }
        run.store.start_manifest(ManifestKind::ProjectShowcase, metadata)?;

        let mut outcome = JobOutcome::new(run.store.job_id());
        let hero_shot = plan.hero();
        let hero = match &request.from_hero {
            Some(path) => self.adopt_hero(run, hero_shot, path, total)?,
            None => {
                run.store.update_status(
                    StatusUpdate::with_status(JobStatus::GeneratingHero)
                        .progress(5)
                        .current_image(1)
                        .total_image(total)
                        .message(format!("Generating {} (hero image)...", hero_shot.name)),
                )?;
                let instruction = prompts::hero_instruction(&prompt, &brief, hero_shot);
                self.synthesize_hero(run, hero_shot, &instruction, None, &brief)?
            }
        };
        outcome.results.push(hero.result.clone());
        run.emit(
            "hero_ready",
            json!({ "shot_id": hero_shot.shot_id, "filename": hero.result.filename }),
        )?;

        let description = match self.capabilities.analyst.describe_reference(&hero.image) {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            _ => GENERIC_REFERENCE_DESCRIPTION.to_string(),
        };
        run.store
            .set_manifest_meta("reference_description", json!(description))?;

        for (index, shot) in plan.variations().iter().enumerate() {
            if self.cancelled() {
                return run.cancel(outcome);
            }
            let completed = index as u64 + 1;
            run.store.update_status(
                StatusUpdate::with_status(JobStatus::Generating)
                    .progress(completed * 100 / total)
                    .current_image(completed + 1)
                    .total_image(total)
                    .message(format!("Generating {}...", shot.name))
                    .field("current_shot", json!(shot.shot_id)),
            )?;
            run.emit(
                "shot_started",
                json!({ "shot_id": shot.shot_id, "profile": shot.profile, "index": completed + 1, "total": total }),
            )?;

            let instruction = prompts::variation_instruction(shot, &brief, &description);
            let ctx = ShotContext {
                shot,
                base_instruction: &instruction,
                reference: Some(&hero.image),
                brief: &brief,
            };
            match self.refine(run, &ctx, true)? {
                ShotOutcome::Produced(refined) => {
                    let filename = run.write_image(shot, &refined.image)?;
                    let result = run.new_result(
                        shot,
                        filename,
                        refined.score,
                        refined.attempts,
                        refined.low_confidence,
                        refined.breakdown,
                    );
                    run.store.append_result(result.clone())?;
                    let event = if refined.low_confidence {
                        outcome.low_confidence.push(shot.shot_id.clone());
                        "shot_low_confidence"
                    } else {
                        "shot_accepted"
                    };
                    run.emit(
                        event,
                        json!({ "shot_id": shot.shot_id, "score": result.score, "attempts": result.attempts, "filename": result.filename }),
                    )?;
                    outcome.results.push(result);
                }
                ShotOutcome::Skipped { attempts, .. } => {
                    run.emit(
                        "shot_skipped",
                        json!({ "shot_id": shot.shot_id, "attempts": attempts }),
                    )?;
                    outcome.skipped.push(shot.shot_id.clone());
                }
            }
        }

        let message = format!(
            "Generated {} of {} images ({} low confidence, {} skipped)",
            outcome.results.len(),
            total,
            outcome.low_confidence.len(),
            outcome.skipped.len()
        );
        run.store.update_status(
            StatusUpdate::with_status(JobStatus::Complete)
                .progress(100)
                .current_image(total)
                .total_image(total)
                .message(message.clone()),
        )?;

        let report = JobReport {
            job_id: run.store.job_id().to_string(),
            started_at,
            finished_at: now_utc_iso(),
            total_shots: total,
            produced: outcome.results.iter().map(|r| r.shot_id.clone()).collect(),
            low_confidence: outcome.low_confidence.clone(),
            skipped: outcome.skipped.clone(),
        };
        let mut extra = Map::new();
        extra.insert("provider".to_string(), json!(self.capabilities.synthesizer_name()));
        extra.insert("threshold".to_string(), json!(self.settings.acceptance_threshold));
        extra.insert("max_attempts".to_string(), json!(self.settings.max_attempts));
        write_report(&run.store.summary_path(), &report, Some(&extra))?;
        run.emit(
            "job_finished",
            json!({
                "produced": report.produced_count(),
                "low_confidence": report.low_confidence,
                "skipped": report.skipped,
            }),
        )?;

        outcome.status = JobStatus::Complete;
        outcome.message = message;
        Ok(outcome)
    }

    /// Regenerates one stored shot against the job's hero, replacing its
    /// manifest entry in place. Job status is left untouched.
    pub fn regenerate_shot(&self, job_id: &str, shot_id: &str) -> anyhow::Result<ShotResult> {
        let mut run = JobRun::open(&self.job_dir(job_id), job_id)?;
        let Some(manifest) = run.store.manifest() else {
            bail!("job {job_id} has no manifest to regenerate from");
        };
        if manifest.kind != ManifestKind::ProjectShowcase {
            bail!("job {job_id} has no project showcase yet; approve its hero first");
        }
        let Some(hero_entry) = manifest.hero() else {
            bail!("job {job_id} has no hero image in its manifest");
        };
        if hero_entry.shot_id == shot_id {
            bail!("the hero shot cannot be regenerated; start a new job from an approved hero");
        }
        let Some(shot) = catalog::find(shot_id) else {
            bail!("unknown shot '{shot_id}'");
        };

        let hero_path = run.store.file_path(&hero_entry.filename);
        let hero_image = ImageData::from_path(&hero_path)
            .with_context(|| format!("hero image missing for job {job_id}"))?;
        let prompt = manifest
            .meta("prompt")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let brief = manifest
            .meta("brief")
            .cloned()
            .and_then(|value| serde_json::from_value::<ProjectBrief>(value).ok())
            .unwrap_or_else(|| ProjectBrief::fallback(&prompt));
        let stored_description = manifest
            .meta("reference_description")
            .and_then(Value::as_str)
            .map(str::to_string);
        let description = match stored_description {
            Some(text) => text,
            None => self
                .capabilities
                .analyst
                .describe_reference(&hero_image)
                .unwrap_or_else(|_| GENERIC_REFERENCE_DESCRIPTION.to_string()),
        };

        run.emit("shot_started", json!({ "shot_id": shot_id, "regeneration": true }))?;
        let instruction = prompts::variation_instruction(&shot, &brief, &description);
        let ctx = ShotContext {
            shot: &shot,
            base_instruction: &instruction,
            reference: Some(&hero_image),
            brief: &brief,
        };
        let refined = match self.refine(&mut run, &ctx, false)? {
            ShotOutcome::Produced(refined) => refined,
            ShotOutcome::Skipped { attempts, .. } => {
                run.emit(
                    "shot_skipped",
                    json!({ "shot_id": shot_id, "attempts": attempts, "regeneration": true }),
                )?;
                bail!("no image was generated for '{shot_id}' after {attempts} attempts");
            }
        };

        let filename = run.write_image(&shot, &refined.image)?;
        let mut result = run.new_result(
            &shot,
            filename,
            refined.score,
            refined.attempts,
            refined.low_confidence,
            refined.breakdown,
        );
        result.regenerated_at = Some(now_utc_iso());
        let replaces = run.store.manifest().is_some_and(|m| m.contains(shot_id));
        let stored = if replaces {
            run.store.replace_result(result)?
        } else {
            run.store.append_result(result.clone())?;
            result
        };
        run.emit(
            "shot_regenerated",
            json!({
                "shot_id": shot_id,
                "id": stored.id,
                "score": stored.score,
                "attempts": stored.attempts,
                "low_confidence": stored.low_confidence,
                "replaced": replaces,
            }),
        )?;
        Ok(stored)
    }

    /// Synthesizes a hero styled after an inspiration image and parks the job
    /// in `awaiting_approval`.
    pub fn generate_inspiration_hero(
        &self,
        job_id: &str,
        request: &InspirationRequest,
    ) -> anyhow::Result<ShotResult> {
        let mut run = JobRun::open(&self.job_dir(job_id), job_id)?;
        let result = self.run_inspiration(&mut run, request);
        run.fail_on_error(result)
    }

    fn run_inspiration(
        &self,
        run: &mut JobRun,
        request: &InspirationRequest,
    ) -> anyhow::Result<ShotResult> {
        let prompt = request.prompt.as_deref().unwrap_or_default().trim().to_string();
        let feedback = request
            .feedback
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty());
        run.emit(
            "job_started",
            json!({
                "flow": "inspiration",
                "prompt": prompt,
                "inspiration": request.inspiration.display().to_string(),
                "feedback": feedback,
                "provider": self.capabilities.synthesizer_name(),
            }),
        )?;
        run.store.update_status(
            StatusUpdate::with_status(JobStatus::Parsing)
                .progress(2)
                .message(if feedback.is_some() {
                    "Regenerating hero with feedback..."
                } else {
                    "Analyzing inspiration style..."
                })
                .field("flow_type", json!("inspiration")),
        )?;

        let inspiration = match ImageData::from_path(&request.inspiration) {
            Ok(image) => image,
            Err(err) => {
                let message = format!(
                    "Inspiration image not found: {}",
                    request.inspiration.display()
                );
                run.fail(&message)?;
                return Err(err.context(message));
            }
        };
        let style_analysis = match self.capabilities.analyst.analyze_inspiration(&inspiration) {
            Ok(analysis) => analysis,
            Err(err) => {
                run.emit(
                    "brief_fallback",
                    json!({ "stage": "style_analysis", "error": error_chain_text(&err, ERROR_TEXT_LIMIT) }),
                )?;
                default_style_analysis()
            }
        };
        let brief = self.resolve_brief(run, &prompt, &request.overrides)?;
        let total = ShotPlan::for_brief(&brief)?.len() as u64;

        let hero_shot = catalog::hero();
        run.store.update_status(
            StatusUpdate::with_status(JobStatus::GeneratingHero)
                .progress(5)
                .current_image(1)
                .total_image(total)
                .message("Generating hero image from inspiration..."),
        )?;
        let mut instruction =
            prompts::inspiration_hero_instruction(&style_analysis, &prompt, &brief, &hero_shot);
        if let Some(feedback) = feedback {
            instruction = prompts::with_user_feedback(&instruction, feedback);
        }

        let ctx = ShotContext {
            shot: &hero_shot,
            base_instruction: &instruction,
            reference: Some(&inspiration),
            brief: &brief,
        };
        let refined = match self.refine(run, &ctx, false)? {
            ShotOutcome::Produced(refined) => refined,
            ShotOutcome::Skipped { .. } => {
                run.fail("Failed to generate hero image from inspiration")?;
                bail!("hero synthesis produced no image");
            }
        };
        let hero_filename = run.write_image(&hero_shot, &refined.image)?;
        let inspiration_filename = format!(
            "inspiration_{}.{}",
            file_stamp(),
            inspiration.extension()
        );
        std::fs::write(run.store.file_path(&inspiration_filename), &inspiration.bytes)
            .with_context(|| format!("failed to copy inspiration into job {}", run.store.job_id()))?;

        let inspiration_meta = json!({
            "filename": inspiration_filename,
            "url": run.store.image_url(&inspiration_filename),
            "style_analysis": style_analysis,
        });
        let mut metadata = Map::new();
        metadata.insert("flow_type".to_string(), json!("inspiration"));
        metadata.insert("prompt".to_string(), json!(prompt));
        metadata.insert("brief".to_string(), brief.to_value());
        metadata.insert("suburb".to_string(), json!(brief.suburb_or_default()));
        metadata.insert("model".to_string(), json!(self.settings.image_model));
        metadata.insert("inspiration".to_string(), inspiration_meta.clone());
        if let Some(feedback) = feedback {
            metadata.insert("feedback".to_string(), json!(feedback));
        }
        run.store
            .start_manifest(ManifestKind::InspirationShowcase, metadata)?;
        let hero = run.new_result(
            &hero_shot,
            hero_filename,
            refined.score,
            refined.attempts,
            false,
            IndexMap::new(),
        );
        run.store.append_result(hero.clone())?;

        run.store.update_status(
            StatusUpdate::with_status(JobStatus::AwaitingApproval)
                .progress(10)
                .current_image(1)
                .total_image(total)
                .message("Hero generated from inspiration - please review and approve")
                .field("inspiration", inspiration_meta)
                .field("hero", json!({ "filename": hero.filename, "url": hero.url }))
                .field("brief", brief.to_value()),
        )?;
        run.emit(
            "hero_ready",
            json!({ "shot_id": hero.shot_id, "filename": hero.filename, "attempts": hero.attempts }),
        )?;
        run.emit("job_awaiting_approval", json!({ "hero": hero.filename }))?;
        Ok(hero)
    }

    /// Continues an inspiration job from its stored hero.
    pub fn approve_inspiration_hero(
        &self,
        job_id: &str,
        overrides: BriefOverrides,
    ) -> anyhow::Result<JobOutcome> {
        let dir = self.job_dir(job_id);
        let store = JobStore::open(&dir, job_id)?;
        if store.state().status()? != JobStatus::AwaitingApproval {
            bail!("job {job_id} is not awaiting approval");
        }
        let Some(hero) = store.manifest().and_then(|m| m.hero()) else {
            bail!("job {job_id} has no hero to approve");
        };
        let request = ProjectRequest {
            prompt: String::new(),
            overrides,
            from_hero: Some(store.file_path(&hero.filename)),
        };
        self.generate_project(job_id, &request)
    }

    fn resolve_brief(
        &self,
        run: &JobRun,
        prompt: &str,
        overrides: &BriefOverrides,
    ) -> anyhow::Result<ProjectBrief> {
        let mut brief = match self.capabilities.analyst.parse_brief(prompt) {
            Ok(brief) => brief,
            Err(err) => {
                run.emit(
                    "brief_fallback",
                    json!({ "stage": "brief", "error": error_chain_text(&err, ERROR_TEXT_LIMIT) }),
                )?;
                ProjectBrief::fallback(prompt)
            }
        };
        brief.apply(overrides);
        run.emit("brief_parsed", json!({ "brief": brief.to_value() }))?;
        Ok(brief)
    }

    fn synthesize_hero(
        &self,
        run: &mut JobRun,
        hero_shot: &ShotSpec,
        instruction: &str,
        reference: Option<&ImageData>,
        brief: &ProjectBrief,
    ) -> anyhow::Result<StoredHero> {
        let ctx = ShotContext {
            shot: hero_shot,
            base_instruction: instruction,
            reference,
            brief,
        };
        let refined = match self.refine(run, &ctx, false)? {
            ShotOutcome::Produced(refined) => refined,
            ShotOutcome::Skipped { .. } => {
                run.fail("Failed to generate hero image")?;
                bail!("hero synthesis produced no image");
            }
        };
        let filename = run.write_image(hero_shot, &refined.image)?;
        let result = run.new_result(
            hero_shot,
            filename,
            refined.score,
            refined.attempts,
            false,
            IndexMap::new(),
        );
        run.store.append_result(result.clone())?;
        Ok(StoredHero {
            image: refined.image,
            result,
        })
    }

    fn adopt_hero(
        &self,
        run: &mut JobRun,
        hero_shot: &ShotSpec,
        path: &Path,
        total: u64,
    ) -> anyhow::Result<StoredHero> {
        run.store.update_status(
            StatusUpdate::with_status(JobStatus::GeneratingHero)
                .progress(10)
                .current_image(1)
                .total_image(total)
                .message("Using approved hero image..."),
        )?;
        let image = match ImageData::from_path(path) {
            Ok(image) => image,
            Err(err) => {
                let message = format!("Approved hero image not found: {}", path.display());
                run.fail(&message)?;
                return Err(err.context(message));
            }
        };

        let in_job_dir = path
            .parent()
            .and_then(|parent| parent.canonicalize().ok())
            .zip(run.store.dir().canonicalize().ok())
            .is_some_and(|(parent, dir)| parent == dir);
        let filename = match path.file_name().and_then(|name| name.to_str()) {
            Some(name) if in_job_dir => name.to_string(),
            _ => {
                let ext = mime_for_path(path)
                    .map(|mime| ImageData::new(Vec::new(), mime).extension())
                    .unwrap_or("png");
                let filename = format!("{}_{}.{}", hero_shot.shot_id, file_stamp(), ext);
                std::fs::write(run.store.file_path(&filename), &image.bytes)
                    .with_context(|| format!("failed to copy hero {}", path.display()))?;
                filename
            }
        };

        let result = run.new_result(hero_shot, filename, 100, 1, false, IndexMap::new());
        run.store.append_result(result.clone())?;
        Ok(StoredHero { image, result })
    }

    fn refine(
        &self,
        run: &mut JobRun,
        ctx: &ShotContext<'_>,
        track_status: bool,
    ) -> anyhow::Result<ShotOutcome> {
        let refinement = RefinementLoop::new(
            self.capabilities.synthesizer.as_ref(),
            self.capabilities.judge.as_ref(),
            self.loop_settings(),
        );
        let mut observer = JobObserver {
            run,
            track_status,
            failure: None,
        };
        let outcome = refinement.run(ctx, &mut observer)?;
        if let Some(err) = observer.failure {
            return Err(err);
        }
        Ok(outcome)
    }
}

struct StoredHero {
    image: ImageData,
    result: ShotResult,
}

#[derive(Default)]
struct CarriedInspiration {
    prompt: Option<String>,
    inspiration: Option<Value>,
}

/// One job's store and event stream for the duration of a driver call.
struct JobRun {
    store: JobStore,
    events: EventWriter,
}

impl JobRun {
    fn open(dir: &Path, job_id: &str) -> anyhow::Result<Self> {
        let store = JobStore::open(dir, job_id)?;
        let events = EventWriter::new(store.events_path(), job_id);
        Ok(Self { store, events })
    }

    fn emit(&self, event_type: &str, payload: Value) -> anyhow::Result<()> {
        self.events.emit_json(event_type, payload).map(|_| ())
    }

    fn carried_inspiration(&self) -> CarriedInspiration {
        let Some(manifest) = self.store.manifest() else {
            return CarriedInspiration::default();
        };
        CarriedInspiration {
            prompt: manifest
                .meta("prompt")
                .and_then(Value::as_str)
                .map(str::to_string)
                .filter(|text| !text.is_empty()),
            inspiration: manifest.meta("inspiration").cloned(),
        }
    }

    fn write_image(&self, shot: &ShotSpec, image: &ImageData) -> anyhow::Result<String> {
        let filename = format!("{}_{}.{}", shot.shot_id, file_stamp(), image.extension());
        let path = self.store.file_path(&filename);
        std::fs::write(&path, &image.bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(filename)
    }

    fn new_result(
        &self,
        shot: &ShotSpec,
        filename: String,
        score: u32,
        attempts: u32,
        low_confidence: bool,
        breakdown: IndexMap<String, u32>,
    ) -> ShotResult {
        ShotResult {
            id: self.store.next_result_id(),
            shot_id: shot.shot_id.clone(),
            url: self.store.image_url(&filename),
            filename,
            category: shot.category,
            name: shot.name.clone(),
            is_hero: shot.is_hero,
            score,
            attempts,
            low_confidence,
            breakdown,
            aspect_ratio: shot.aspect_ratio.clone(),
            created_at: now_utc_iso(),
            regenerated_at: None,
        }
    }

    fn fail(&mut self, message: &str) -> anyhow::Result<()> {
        self.store
            .update_status(StatusUpdate::with_status(JobStatus::Error).message(message))?;
        self.emit("job_failed", json!({ "message": message }))
    }

    fn cancel(&mut self, mut outcome: JobOutcome) -> anyhow::Result<JobOutcome> {
        self.store.update_status(
            StatusUpdate::with_status(JobStatus::Error).message("Job cancelled"),
        )?;
        self.emit(
            "job_cancelled",
            json!({ "produced": outcome.results.len() }),
        )?;
        outcome.status = JobStatus::Error;
        outcome.message = "Job cancelled".to_string();
        Ok(outcome)
    }

    /// Marks the job failed when an unexpected error escapes a flow.
    fn fail_on_error<T>(&mut self, result: anyhow::Result<T>) -> anyhow::Result<T> {
        if let Err(err) = &result {
            let already_terminal = self
                .store
                .state()
                .status()
                .map(JobStatus::is_terminal)
                .unwrap_or(true);
            if !already_terminal {
                let _ = self.fail(&error_chain_text(err, ERROR_TEXT_LIMIT));
            }
        }
        result
    }
}

/// Reports attempts as events and, during variations, flips status to verifying.
struct JobObserver<'r> {
    run: &'r mut JobRun,
    track_status: bool,
    failure: Option<anyhow::Error>,
}

impl JobObserver<'_> {
    fn keep_first(&mut self, result: anyhow::Result<()>) {
        if let Err(err) = result {
            self.failure.get_or_insert(err);
        }
    }
}

impl LoopObserver for JobObserver<'_> {
    fn judging(&mut self, shot: &ShotSpec, _attempt: u32) {
        if !self.track_status {
            return;
        }
        let result = self.run.store.update_status(
            StatusUpdate::with_status(JobStatus::Verifying)
                .message(format!("Verifying {}...", shot.name)),
        );
        self.keep_first(result);
    }

    fn attempt_finished(&mut self, shot: &ShotSpec, record: &AttemptRecord) {
        let result = self.run.emit(
            "attempt_finished",
            json!({
                "shot_id": shot.shot_id,
                "attempt": record.attempt,
                "score": record.score,
                "outcome": record.outcome.as_str(),
                "error": record.outcome.error(),
            }),
        );
        self.keep_first(result);
    }
}

fn file_stamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use serde_json::{json, Map, Value};
    use showcase_contracts::brief::{BriefOverrides, ProjectBrief, ProjectType};
    use showcase_contracts::events::EventWriter;
    use showcase_contracts::jobs::{JobStatus, Manifest, ManifestKind};
    use showcase_contracts::verify::{VerificationProfile, Verdict};

    use super::{InspirationRequest, ProjectRequest, ShowcaseEngine};
    use crate::config::EngineSettings;
    use crate::providers::{
        Capabilities, ConsistencyJudge, ImageData, ImageSynthesizer, JudgeRequest,
        ProjectAnalyst, SynthesisRequest,
    };

    /// Counts calls; fails every call whose instruction contains a marker.
    struct CountingSynth {
        calls: Mutex<u32>,
        fail_marker: Option<&'static str>,
        cancel_after: Option<(u32, Arc<AtomicBool>)>,
    }

    impl CountingSynth {
        fn new() -> Self {
            Self {
                calls: Mutex::new(0),
                fail_marker: None,
                cancel_after: None,
            }
        }
    }

    impl ImageSynthesizer for CountingSynth {
        fn name(&self) -> &str {
            "counting"
        }

        fn synthesize(&self, request: &SynthesisRequest<'_>) -> anyhow::Result<Option<ImageData>> {
            let call = match self.calls.lock() {
                Ok(mut calls) => {
                    *calls += 1;
                    *calls
                }
                Err(_) => anyhow::bail!("poisoned"),
            };
            if let Some((after, flag)) = &self.cancel_after {
                if call >= *after {
                    flag.store(true, Ordering::SeqCst);
                }
            }
            if self
                .fail_marker
                .is_some_and(|marker| request.instruction.contains(marker))
            {
                return Ok(None);
            }
            Ok(Some(ImageData::new(call.to_be_bytes().to_vec(), "image/png")))
        }
    }

    /// Scores from a per-shot script, falling back to a fixed score.
    struct ShotJudge {
        default_score: u32,
        scripted: Mutex<Vec<(String, VecDeque<u32>)>>,
        calls: Mutex<Vec<(String, VerificationProfile)>>,
    }

    impl ShotJudge {
        fn passing() -> Self {
            Self::scoring(95)
        }

        fn scoring(default_score: u32) -> Self {
            Self {
                default_score,
                scripted: Mutex::new(Vec::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn script(self, shot_id: &str, scores: &[u32]) -> Self {
            if let Ok(mut rows) = self.scripted.lock() {
                rows.push((shot_id.to_string(), scores.iter().copied().collect()));
            }
            self
        }

        fn calls(&self) -> Vec<(String, VerificationProfile)> {
            self.calls.lock().map(|rows| rows.clone()).unwrap_or_default()
        }
    }

    impl ConsistencyJudge for ShotJudge {
        fn judge(&self, request: &JudgeRequest<'_>) -> anyhow::Result<Verdict> {
            if let Ok(mut rows) = self.calls.lock() {
                rows.push((request.shot.shot_id.clone(), request.profile));
            }
            let scripted = self.scripted.lock().ok().and_then(|mut rows| {
                rows.iter_mut()
                    .find(|(id, _)| *id == request.shot.shot_id)
                    .and_then(|(_, scores)| scores.pop_front())
            });
            Ok(Verdict {
                score: scripted.unwrap_or(self.default_score),
                ..Verdict::default()
            })
        }
    }

    struct FixedAnalyst {
        brief: Option<ProjectBrief>,
    }

    impl ProjectAnalyst for FixedAnalyst {
        fn parse_brief(&self, prompt: &str) -> anyhow::Result<ProjectBrief> {
            match &self.brief {
                Some(brief) => Ok(brief.clone()),
                None => anyhow::bail!("analyst offline for '{prompt}'"),
            }
        }

        fn describe_reference(&self, _image: &ImageData) -> anyhow::Result<String> {
            Ok("two-storey brick pair with timber screens".to_string())
        }

        fn analyze_inspiration(&self, _image: &ImageData) -> anyhow::Result<Map<String, Value>> {
            anyhow::bail!("vision offline")
        }
    }

    struct OfflineJudge;

    impl ConsistencyJudge for OfflineJudge {
        fn judge(&self, _request: &JudgeRequest<'_>) -> anyhow::Result<Verdict> {
            anyhow::bail!("vision model unavailable")
        }
    }

    /// Records the stored progress each time an image is requested.
    struct ProgressRecorder {
        status_path: PathBuf,
        seen: Mutex<Vec<u64>>,
    }

    impl ProgressRecorder {
        fn new(status_path: PathBuf) -> Self {
            Self {
                status_path,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn observe(&self) -> anyhow::Result<u64> {
            let raw = std::fs::read_to_string(&self.status_path)?;
            let doc: Value = serde_json::from_str(&raw)?;
            let progress = doc["progress"].as_u64().unwrap_or(0);
            let mut seen = self.seen.lock().map_err(|_| anyhow::anyhow!("poisoned"))?;
            seen.push(progress);
            Ok(seen.len() as u64)
        }

        fn seen(&self) -> Vec<u64> {
            self.seen.lock().map(|rows| rows.clone()).unwrap_or_default()
        }
    }

    impl ImageSynthesizer for ProgressRecorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn synthesize(&self, _request: &SynthesisRequest<'_>) -> anyhow::Result<Option<ImageData>> {
            let count = self.observe()?;
            Ok(Some(ImageData::new(count.to_be_bytes().to_vec(), "image/png")))
        }
    }

    fn engine_with(
        root: &std::path::Path,
        synth: Arc<dyn ImageSynthesizer>,
        judge: Arc<dyn ConsistencyJudge>,
        brief: Option<ProjectBrief>,
    ) -> ShowcaseEngine {
        let capabilities = Capabilities {
            synthesizer: synth,
            judge,
            analyst: Arc::new(FixedAnalyst { brief }),
        };
        let settings = EngineSettings::default()
            .with_threshold(80)
            .with_max_attempts(3);
        ShowcaseEngine::new(capabilities, settings, root)
    }

    fn events(engine: &ShowcaseEngine, job_id: &str) -> anyhow::Result<Vec<String>> {
        EventWriter::new(engine.job_dir(job_id).join("events.jsonl"), job_id).event_types()
    }

    fn status_doc(engine: &ShowcaseEngine, job_id: &str) -> anyhow::Result<Value> {
        let raw = std::fs::read_to_string(engine.job_dir(job_id).join("status.json"))?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn request(prompt: &str) -> ProjectRequest {
        ProjectRequest {
            prompt: prompt.to_string(),
            ..ProjectRequest::default()
        }
    }

    #[test]
    fn project_job_produces_the_full_showcase() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let synth = Arc::new(CountingSynth::new());
        let judge = Arc::new(ShotJudge::passing().script("context_street", &[50, 60, 70]));
        let engine = engine_with(temp.path(), synth, judge.clone(), None);

        let outcome = engine.generate_project("job-1", &request("two modern homes"))?;
        assert_eq!(outcome.status, JobStatus::Complete);
        assert_eq!(outcome.results.len(), 18);
        assert_eq!(outcome.low_confidence, vec!["context_street"]);
        assert!(outcome.skipped.is_empty());

        let manifest = Manifest::load(engine.job_dir("job-1").join("manifest.json"))?;
        assert_eq!(manifest.kind, ManifestKind::ProjectShowcase);
        assert_eq!(manifest.images.len(), 18);
        assert_eq!(manifest.images[0].id, "job-1_1");
        assert!(manifest.images[0].is_hero);
        assert_eq!(manifest.images[0].score, 100);
        let street = manifest.get("context_street").ok_or_else(|| anyhow::anyhow!("missing"))?;
        assert_eq!((street.score, street.attempts, street.low_confidence), (70, 3, true));
        assert!(engine.job_dir("job-1").join(&street.filename).exists());

        let status = status_doc(&engine, "job-1")?;
        assert_eq!(status["status"], json!("complete"));
        assert_eq!(status["progress"], json!(100));
        assert_eq!(status["images"].as_array().map(Vec::len), Some(18));

        let interior: Vec<_> = judge
            .calls()
            .into_iter()
            .filter(|(id, _)| id.starts_with("interior_"))
            .collect();
        assert!(!interior.is_empty());
        assert!(interior.iter().all(|(_, p)| *p == VerificationProfile::Interior));

        let types = events(&engine, "job-1")?;
        assert_eq!(types.first().map(String::as_str), Some("job_started"));
        assert!(types.contains(&"brief_fallback".to_string()));
        assert!(types.contains(&"shot_low_confidence".to_string()));
        assert_eq!(types.last().map(String::as_str), Some("job_finished"));
        assert!(engine.job_dir("job-1").join("summary.json").exists());
        Ok(())
    }

    #[test]
    fn multi_unit_brief_adds_supplements_and_skips_failed_shots() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut brief = ProjectBrief::fallback("apartments");
        brief.project_type = ProjectType::Apartments;
        let synth = Arc::new(CountingSynth {
            fail_marker: Some("Staircase and Void"),
            ..CountingSynth::new()
        });
        let engine = engine_with(temp.path(), synth, Arc::new(ShotJudge::passing()), Some(brief));

        let outcome = engine.generate_project("job-2", &request("apartment block"))?;
        assert_eq!(outcome.results.len(), 19);
        assert_eq!(outcome.skipped, vec!["spatial_staircase"]);

        let manifest = Manifest::load(engine.job_dir("job-2").join("manifest.json"))?;
        assert!(!manifest.contains("spatial_staircase"));
        assert_eq!(
            manifest.images.last().map(|r| r.shot_id.as_str()),
            Some("multi_shared_spaces")
        );
        assert!(events(&engine, "job-2")?.contains(&"shot_skipped".to_string()));
        Ok(())
    }

    #[test]
    fn hero_failure_fails_the_job_before_any_variation() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let synth = Arc::new(CountingSynth {
            fail_marker: Some("hero image"),
            ..CountingSynth::new()
        });
        let judge = Arc::new(ShotJudge::passing());
        let engine = engine_with(temp.path(), synth.clone(), judge.clone(), None);

        assert!(engine.generate_project("job-3", &request("two homes")).is_err());
        let status = status_doc(&engine, "job-3")?;
        assert_eq!(status["status"], json!("error"));
        assert_eq!(status["message"], json!("Failed to generate hero image"));
        assert_eq!(synth.calls.lock().map(|c| *c).unwrap_or(0), 3);
        assert!(judge.calls().is_empty());
        assert!(events(&engine, "job-3")?.contains(&"job_failed".to_string()));
        Ok(())
    }

    #[test]
    fn regeneration_replaces_in_place() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let judge = Arc::new(ShotJudge::passing().script("feature_entry", &[40, 40, 40, 92]));
        let engine = engine_with(temp.path(), Arc::new(CountingSynth::new()), judge, None);
        engine.generate_project("job-4", &request("two homes"))?;

        let before = Manifest::load(engine.job_dir("job-4").join("manifest.json"))?;
        let original = before.get("feature_entry").cloned().ok_or_else(|| anyhow::anyhow!("missing"))?;
        assert!(original.low_confidence);

        let stored = engine.regenerate_shot("job-4", "feature_entry")?;
        assert_eq!(stored.id, original.id);
        assert_eq!(stored.score, 92);
        assert!(!stored.low_confidence);
        assert!(stored.regenerated_at.is_some());

        let after = Manifest::load(engine.job_dir("job-4").join("manifest.json"))?;
        assert_eq!(after.images.len(), before.images.len());
        let position = |m: &Manifest| m.images.iter().position(|r| r.shot_id == "feature_entry");
        assert_eq!(position(&after), position(&before));

        let status = status_doc(&engine, "job-4")?;
        assert_eq!(status["status"], json!("complete"));
        let mirrored = status["images"]
            .as_array()
            .and_then(|rows| rows.iter().find(|row| row["shot_id"] == json!("feature_entry")))
            .cloned()
            .unwrap_or(Value::Null);
        assert_eq!(mirrored["score"], json!(92));

        assert!(engine.regenerate_shot("job-4", "hero_facade").is_err());
        assert!(engine.regenerate_shot("job-4", "not_a_shot").is_err());
        assert!(events(&engine, "job-4")?.contains(&"shot_regenerated".to_string()));
        Ok(())
    }

    #[test]
    fn cancellation_stops_between_shots() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let flag = Arc::new(AtomicBool::new(false));
        let synth = Arc::new(CountingSynth {
            cancel_after: Some((3, flag.clone())),
            ..CountingSynth::new()
        });
        let engine = engine_with(temp.path(), synth, Arc::new(ShotJudge::passing()), None)
            .with_cancel_flag(flag);

        let outcome = engine.generate_project("job-5", &request("two homes"))?;
        assert_eq!(outcome.status, JobStatus::Error);
        assert_eq!(outcome.results.len(), 3);

        let status = status_doc(&engine, "job-5")?;
        assert_eq!(status["status"], json!("error"));
        assert_eq!(status["message"], json!("Job cancelled"));
        assert!(events(&engine, "job-5")?.contains(&"job_cancelled".to_string()));
        Ok(())
    }

    #[test]
    fn inspiration_hero_waits_for_approval_then_continues() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let inspiration = temp.path().join("inspo.jpg");
        std::fs::write(&inspiration, b"jpeg")?;
        let judge = Arc::new(ShotJudge::passing());
        let engine = engine_with(temp.path(), Arc::new(CountingSynth::new()), judge, None);

        let hero = engine.generate_inspiration_hero(
            "job-6",
            &InspirationRequest {
                inspiration: inspiration.clone(),
                prompt: Some("warm timber townhouses".to_string()),
                overrides: BriefOverrides {
                    project_type: None,
                    suburb: Some("Kew".to_string()),
                },
                feedback: None,
            },
        )?;
        assert!(hero.is_hero);
        let status = status_doc(&engine, "job-6")?;
        assert_eq!(status["status"], json!("awaiting_approval"));
        assert_eq!(status["progress"], json!(10));

        let manifest = Manifest::load(engine.job_dir("job-6").join("manifest.json"))?;
        assert_eq!(manifest.kind, ManifestKind::InspirationShowcase);
        assert_eq!(manifest.meta("suburb"), Some(&json!("kew")));
        let copied = manifest.meta("inspiration").and_then(|v| v["filename"].as_str()).unwrap_or("");
        assert!(engine.job_dir("job-6").join(copied).exists());

        let retry = engine.generate_inspiration_hero(
            "job-6",
            &InspirationRequest {
                inspiration,
                prompt: Some("warm timber townhouses".to_string()),
                overrides: BriefOverrides::default(),
                feedback: Some("darker roof".to_string()),
            },
        )?;
        assert_eq!(retry.id, "job-6_1");

        let outcome = engine.approve_inspiration_hero("job-6", BriefOverrides::default())?;
        assert_eq!(outcome.status, JobStatus::Complete);
        assert_eq!(outcome.results[0].filename, retry.filename);
        let finished = Manifest::load(engine.job_dir("job-6").join("manifest.json"))?;
        assert_eq!(finished.kind, ManifestKind::ProjectShowcase);
        assert!(finished.meta("inspiration").is_some());
        assert_eq!(finished.meta("prompt"), Some(&json!("warm timber townhouses")));

        let types = events(&engine, "job-6")?;
        assert!(types.contains(&"job_awaiting_approval".to_string()));
        assert_eq!(types.last().map(String::as_str), Some("job_finished"));
        Ok(())
    }

    #[test]
    fn missing_pre_approved_hero_is_fatal() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let engine = engine_with(
            temp.path(),
            Arc::new(CountingSynth::new()),
            Arc::new(ShotJudge::passing()),
            None,
        );
        let request = ProjectRequest {
            prompt: "two homes".to_string(),
            overrides: BriefOverrides::default(),
            from_hero: Some(temp.path().join("nope.png")),
        };
        assert!(engine.generate_project("job-7", &request).is_err());
        let status = status_doc(&engine, "job-7")?;
        assert_eq!(status["status"], json!("error"));
        assert!(status["message"]
            .as_str()
            .is_some_and(|m| m.starts_with("Approved hero image not found")));
        Ok(())
    }

    #[test]
    fn progress_never_decreases_across_approval() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let status_path = temp.path().join("job-8").join("status.json");
        let recorder = Arc::new(ProgressRecorder::new(status_path.clone()));
        let engine = engine_with(
            temp.path(),
            recorder.clone(),
            Arc::new(ShotJudge::passing()),
            None,
        );
        let inspiration = temp.path().join("inspo.png");
        std::fs::write(&inspiration, b"png")?;
        let mut request = InspirationRequest {
            inspiration,
            prompt: Some("two homes".to_string()),
            ..InspirationRequest::default()
        };

        engine.generate_inspiration_hero("job-8", &request)?;
        recorder.observe()?;
        request.feedback = Some("lighter brick".to_string());
        engine.generate_inspiration_hero("job-8", &request)?;
        recorder.observe()?;
        engine.approve_inspiration_hero("job-8", BriefOverrides::default())?;
        recorder.observe()?;

        let seen = recorder.seen();
        assert_eq!(seen.len(), 2 + 17 + 3);
        assert_eq!(seen.first(), Some(&5));
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]), "{seen:?}");
        assert_eq!(&seen[1..5], &[10, 10, 10, 10]);

        assert!(engine.generate_project("job-8", &self::request("again")).is_err());
        Ok(())
    }

    #[test]
    fn regeneration_requires_a_project_showcase() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let inspiration = temp.path().join("inspo.png");
        std::fs::write(&inspiration, b"png")?;
        let engine = engine_with(
            temp.path(),
            Arc::new(CountingSynth::new()),
            Arc::new(ShotJudge::passing()),
            None,
        );
        engine.generate_inspiration_hero(
            "job-9",
            &InspirationRequest {
                inspiration,
                ..InspirationRequest::default()
            },
        )?;

        assert!(engine.regenerate_shot("job-9", "feature_entry").is_err());
        let manifest = Manifest::load(engine.job_dir("job-9").join("manifest.json"))?;
        assert_eq!(manifest.kind, ManifestKind::InspirationShowcase);
        assert_eq!(manifest.images.len(), 1);
        Ok(())
    }

    #[test]
    fn unjudged_regeneration_leaves_the_stored_entry() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let engine = engine_with(
            temp.path(),
            Arc::new(CountingSynth::new()),
            Arc::new(ShotJudge::passing()),
            None,
        );
        engine.generate_project("job-10", &request("two homes"))?;
        let before = Manifest::load(engine.job_dir("job-10").join("manifest.json"))?;

        let offline = engine_with(
            temp.path(),
            Arc::new(CountingSynth::new()),
            Arc::new(OfflineJudge),
            None,
        );
        assert!(offline.regenerate_shot("job-10", "feature_entry").is_err());

        let after = Manifest::load(engine.job_dir("job-10").join("manifest.json"))?;
        assert_eq!(after.get("feature_entry"), before.get("feature_entry"));
        assert!(events(&engine, "job-10")?.contains(&"shot_skipped".to_string()));
        Ok(())
    }

    #[test]
    fn unjudged_variations_are_skipped() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let engine = engine_with(
            temp.path(),
            Arc::new(CountingSynth::new()),
            Arc::new(OfflineJudge),
            None,
        );
        let outcome = engine.generate_project("job-11", &request("two homes"))?;
        assert_eq!(outcome.status, JobStatus::Complete);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.skipped.len(), 17);
        Ok(())
    }
}
