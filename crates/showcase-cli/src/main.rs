use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use showcase_contracts::brief::{BriefOverrides, ProjectType};
use showcase_contracts::jobs::{JobStatus, Manifest, ShotResult, MANIFEST_FILE, STATUS_FILE};
use showcase_engine::providers::Capabilities;
use showcase_engine::{
    EngineSettings, InspirationRequest, JobOutcome, ProjectRequest, ProviderKind, ShowcaseEngine,
};

#[derive(Debug, Parser)]
#[command(name = "showcase", version, about = "Architectural showcase image jobs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a full showcase from a text brief.
    Project(ProjectArgs),
    /// Generate a hero styled after an inspiration image.
    Inspire(InspireArgs),
    /// Continue an inspiration job from its approved hero.
    Approve(ApproveArgs),
    /// Regenerate one shot of an existing job.
    Regenerate(RegenerateArgs),
    /// Print a job's status document.
    Status(StatusArgs),
}

#[derive(Debug, Args)]
struct EngineArgs {
    #[arg(long, default_value = "jobs")]
    jobs_dir: PathBuf,
    #[arg(long)]
    provider: Option<ProviderKind>,
    #[arg(long)]
    threshold: Option<u32>,
    #[arg(long)]
    attempts: Option<u32>,
}

#[derive(Debug, Args)]
struct BriefArgs {
    #[arg(long)]
    project_type: Option<ProjectType>,
    #[arg(long)]
    suburb: Option<String>,
}

impl BriefArgs {
    fn overrides(&self) -> BriefOverrides {
        BriefOverrides {
            project_type: self.project_type,
            suburb: self.suburb.clone(),
        }
    }
}

#[derive(Debug, Parser)]
struct ProjectArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    job_id: Option<String>,
    #[arg(long)]
    from_hero: Option<PathBuf>,
    #[command(flatten)]
    brief: BriefArgs,
    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Debug, Parser)]
struct InspireArgs {
    #[arg(long)]
    inspiration: PathBuf,
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long)]
    feedback: Option<String>,
    #[arg(long)]
    job_id: Option<String>,
    #[command(flatten)]
    brief: BriefArgs,
    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Debug, Parser)]
struct ApproveArgs {
    #[arg(long)]
    job_id: String,
    #[command(flatten)]
    brief: BriefArgs,
    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Debug, Parser)]
struct RegenerateArgs {
    #[arg(long)]
    job_id: String,
    #[arg(long)]
    shot_id: String,
    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Debug, Parser)]
struct StatusArgs {
    #[arg(long)]
    job_id: String,
    #[arg(long, default_value = "jobs")]
    jobs_dir: PathBuf,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("showcase error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Project(args) => run_project(args),
        Command::Inspire(args) => run_inspire(args),
        Command::Approve(args) => run_approve(args),
        Command::Regenerate(args) => run_regenerate(args),
        Command::Status(args) => run_status(args),
    }
}

fn build_engine(args: &EngineArgs) -> Result<ShowcaseEngine> {
    let mut settings = EngineSettings::from_env();
    if let Some(provider) = args.provider {
        settings = settings.with_provider(provider);
    }
    if let Some(threshold) = args.threshold {
        settings = settings.with_threshold(threshold);
    }
    if let Some(attempts) = args.attempts {
        settings = settings.with_max_attempts(attempts);
    }
    let capabilities = Capabilities::from_settings(&settings)?;
    Ok(ShowcaseEngine::new(capabilities, settings, &args.jobs_dir))
}

fn job_id_or_new(job_id: Option<String>) -> String {
    job_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn run_project(args: ProjectArgs) -> Result<i32> {
    if args.prompt.trim().is_empty() {
        bail!("--prompt must not be empty");
    }
    let engine = build_engine(&args.engine)?;
    let job_id = job_id_or_new(args.job_id);
    println!("Job {job_id}: {}", engine.job_dir(&job_id).display());
    let request = ProjectRequest {
        prompt: args.prompt,
        overrides: args.brief.overrides(),
        from_hero: args.from_hero,
    };
    let outcome = engine.generate_project(&job_id, &request)?;
    print_outcome(&outcome);
    Ok(exit_code(&outcome))
}

fn run_inspire(args: InspireArgs) -> Result<i32> {
    let engine = build_engine(&args.engine)?;
    let job_id = job_id_or_new(args.job_id);
    println!("Job {job_id}: {}", engine.job_dir(&job_id).display());
    let request = InspirationRequest {
        inspiration: args.inspiration,
        prompt: args.prompt,
        overrides: args.brief.overrides(),
        feedback: args.feedback,
    };
    let hero = engine.generate_inspiration_hero(&job_id, &request)?;
    print_result(&engine.job_dir(&job_id), &hero);
    println!("Hero awaiting approval. Run `showcase approve --job-id {job_id}` to continue.");
    Ok(0)
}

fn run_approve(args: ApproveArgs) -> Result<i32> {
    let engine = build_engine(&args.engine)?;
    let outcome = engine.approve_inspiration_hero(&args.job_id, args.brief.overrides())?;
    print_outcome(&outcome);
    Ok(exit_code(&outcome))
}

fn run_regenerate(args: RegenerateArgs) -> Result<i32> {
    let engine = build_engine(&args.engine)?;
    let result = engine.regenerate_shot(&args.job_id, &args.shot_id)?;
    print_result(&engine.job_dir(&args.job_id), &result);
    Ok(0)
}

fn run_status(args: StatusArgs) -> Result<i32> {
    let dir = args.jobs_dir.join(&args.job_id);
    let status_path = dir.join(STATUS_FILE);
    if !status_path.exists() {
        bail!("no job {} under {}", args.job_id, args.jobs_dir.display());
    }
    let raw = std::fs::read_to_string(&status_path)
        .with_context(|| format!("failed to read {}", status_path.display()))?;
    let status: Value = serde_json::from_str(&raw)
        .with_context(|| format!("invalid status document {}", status_path.display()))?;
    println!(
        "{} [{}%] {}",
        status.get("status").and_then(Value::as_str).unwrap_or("unknown"),
        status.get("progress").and_then(Value::as_u64).unwrap_or(0),
        status.get("message").and_then(Value::as_str).unwrap_or("")
    );

    let manifest_path = dir.join(MANIFEST_FILE);
    if manifest_path.exists() {
        let manifest = Manifest::load(&manifest_path)?;
        for result in &manifest.images {
            print_result(&dir, result);
        }
    }
    Ok(0)
}

fn print_outcome(outcome: &JobOutcome) {
    println!("{}: {}", outcome.status, outcome.message);
    for result in &outcome.results {
        let flag = if result.low_confidence { " (low confidence)" } else { "" };
        println!(
            "  {:<22} score {:>3} after {} attempt(s){flag}",
            result.shot_id, result.score, result.attempts
        );
    }
    for shot_id in &outcome.skipped {
        println!("  {shot_id:<22} skipped");
    }
}

fn print_result(dir: &Path, result: &ShotResult) {
    let flag = if result.low_confidence { " (low confidence)" } else { "" };
    println!(
        "{} score {} attempts {}{flag}: {}",
        result.shot_id,
        result.score,
        result.attempts,
        dir.join(&result.filename).display()
    );
}

fn exit_code(outcome: &JobOutcome) -> i32 {
    match outcome.status {
        JobStatus::Complete => 0,
        _ => 1,
    }
}
