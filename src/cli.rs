use crate::{
    charts::ProjectCharts,
    chunk_plan::ChunkPlan,
    config::Config,
    dataset::{Dataset, SortKey, sort_stats},
    engine::ollama::OllamaEngine,
    export::{ExportIndex, write_exports},
    html::{ReportInputs, build_html_report},
    pipeline::{Pipeline, RunOutcome},
    progress::{CancelToken, ProgressEvent, ProgressState},
    report::{JobMeta, JobReport, RunStatus},
    util::{ensure_dir, hash_file, now_rfc3339, sha256_hex},
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "bug-digest")]
#[command(about = "Summarize issue-tracker bug reports per project and component with a local LLM")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./bug-digest.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check the model server and list its models.
    Doctor {},
    /// List projects in the input with report and component counts.
    Projects {
        #[arg(long)]
        input: PathBuf,
        /// reports | components | name
        #[arg(long, default_value = "reports")]
        sort_by: String,
        #[arg(long)]
        ascending: bool,
    },
    /// Show the summarization tasks and chunking without calling the model.
    Plan {
        #[arg(long)]
        input: PathBuf,
        #[command(flatten)]
        select: Selection,
    },
    Run {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out_dir: Option<PathBuf>,
        #[command(flatten)]
        select: Selection,
    },
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct Selection {
    /// Only process these projects (repeatable).
    #[arg(long = "project")]
    pub projects: Vec<String>,
    /// Records per chunk, or "all" to send each group in one prompt.
    #[arg(long)]
    pub chunk_size: Option<String>,
    /// Model name on the completion server.
    #[arg(long)]
    pub model: Option<String>,
}

impl Selection {
    pub fn apply(&self, cfg: &mut Config) -> Result<()> {
        if let Some(raw) = self.chunk_size.as_deref() {
            let raw = raw.trim();
            if raw.eq_ignore_ascii_case("all") {
                cfg.chunking.mode = "all".into();
            } else {
                let n: usize = raw
                    .parse()
                    .with_context(|| format!("invalid --chunk-size: {raw}"))?;
                cfg.chunking.mode = "fixed".into();
                cfg.chunking.chunk_size = n;
            }
        }
        if let Some(model) = &self.model {
            cfg.llm.model = model.clone();
        }
        cfg.validate()
    }
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg = match resolve_config_path(args.config.as_deref()) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };

    match &args.cmd {
        Command::Doctor {} => {
            let log_path = resolve_log_path(&cfg, None);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            doctor(&cfg)
        }
        Command::Projects {
            input,
            sort_by,
            ascending,
        } => {
            let log_path = resolve_log_path(&cfg, None);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            projects(&cfg, input, sort_by, *ascending)
        }
        Command::Plan { input, select } => {
            let log_path = resolve_log_path(&cfg, None);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            let mut cfg = cfg.clone();
            select.apply(&mut cfg)?;
            plan(&cfg, input, &select.projects)
        }
        Command::Run {
            input,
            out_dir,
            select,
        } => {
            let mut cfg = cfg.clone();
            select.apply(&mut cfg)?;
            run(&args, &cfg, input, out_dir.as_deref(), &select.projects)
        }
    }
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    ["bug-digest.toml", "bug-digest.example.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn doctor(cfg: &Config) -> Result<()> {
    let engine = OllamaEngine::new(cfg)?;
    let models = engine
        .list_models()
        .with_context(|| format!("failed to reach model server at {}", cfg.llm.base_url))?;
    let available = models.iter().any(|m| m.id() == engine.model());
    if !available {
        warn!("configured model {} is not on the server", engine.model());
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "base_url": cfg.llm.base_url,
            "model": engine.model(),
            "model_available": available,
            "models": models
                .iter()
                .map(|m| serde_json::json!({"name": m.id(), "size": m.size_gb()}))
                .collect::<Vec<_>>(),
        }))?
    );
    Ok(())
}

fn projects(cfg: &Config, input: &Path, sort_by: &str, ascending: bool) -> Result<()> {
    let key = SortKey::parse(sort_by)
        .ok_or_else(|| anyhow!("unknown --sort-by: {sort_by} (reports|components|name)"))?;
    let ds = Dataset::load(cfg, input)?;
    let mut stats = ds.project_stats();
    sort_stats(&mut stats, key, !ascending);
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn plan(cfg: &Config, input: &Path, selected: &[String]) -> Result<()> {
    let ds = load_selected(cfg, input, selected)?;
    let index = ds.index();
    let plan = ChunkPlan::from_index(cfg, &index);
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn load_selected(cfg: &Config, input: &Path, selected: &[String]) -> Result<Dataset> {
    let mut ds = Dataset::load(cfg, input)?;
    for name in selected {
        if !ds.records.iter().any(|r| &r.project == name) {
            warn!("selected project not found in input: {name}");
        }
    }
    ds.retain_projects(selected);
    if ds.records.is_empty() {
        return Err(anyhow!("no reports to process after project selection"));
    }
    Ok(ds)
}

fn run(
    args: &Args,
    cfg: &Config,
    input: &Path,
    out_override: Option<&Path>,
    selected: &[String],
) -> Result<()> {
    validate_input(input)?;

    let cfg_norm = cfg.normalized_for_hash();
    let cfg_hash = sha256_hex(cfg_norm.as_bytes());
    let input_hash =
        hash_file(input).with_context(|| format!("hashing input: {}", input.display()))?;
    let mut selection = selected.to_vec();
    selection.sort();
    let job_id = sha256_hex(format!("{}:{}:{}", cfg_hash, input_hash, selection.join(",")).as_bytes());
    let job_id = &job_id[..16];

    let out_root = out_override
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.paths.out_dir));
    let job_dir = out_root.join(job_id);

    if job_dir.exists() && !cfg.global.overwrite {
        return Err(anyhow!(
            "job_dir already exists and overwrite=false: {}",
            job_dir.display()
        ));
    }

    ensure_dir(&job_dir)?;
    ensure_dir(&job_dir.join("logs"))?;

    let log_path = resolve_log_path(cfg, Some(&job_dir));
    let _guard = init_logging(args, cfg, log_path.as_deref())?;

    info!("job_id={job_id} out={}", job_dir.display());

    if cfg.debug.dump_effective_config {
        let raw = toml::to_string(cfg).unwrap_or_default();
        std::fs::write(job_dir.join("effective-config.toml"), raw)?;
    }

    let started = now_rfc3339();
    let ds = load_selected(cfg, input, selected)?;
    let index = ds.index();
    info!(
        "{} reports across {} projects, {} summary tasks",
        ds.records.len(),
        index.projects.len(),
        index.total_tasks()
    );

    let exports = if cfg.output.write_exports {
        write_exports(&index, &job_dir)?
    } else {
        ExportIndex::default()
    };

    let mut charts = HashMap::new();
    if cfg.output.write_charts {
        for (i, project) in index.projects.iter().enumerate() {
            let pct = cfg.progress.band_start * (i + 1) as f32 / index.projects.len() as f32;
            info!("[{pct:>3.0}%] Graphing: {}", project.name);
            charts.insert(
                project.name.clone(),
                ProjectCharts::render(&ds, &cfg.columns, project),
            );
        }
    }

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            if cancel.request_cancel() {
                warn!("second interrupt; exiting without waiting for the worker");
                std::process::exit(130);
            }
            warn!("cancellation requested; finishing the in-flight request (Ctrl+C again to exit now)");
        }) {
            warn!("could not install Ctrl+C handler: {e}");
        }
    }

    let state = Arc::new(ProgressState::new(cancel));
    let engine = OllamaEngine::new(cfg)?;
    let mut pipeline = Pipeline::new(cfg, engine, state.clone());
    if cfg.debug.dump_responses {
        let dir = job_dir.join("responses");
        ensure_dir(&dir)?;
        pipeline = pipeline.with_responses_dir(dir);
    }

    let show_bar = cfg.progress.show_bar && std::io::stderr().is_terminal();
    let outcome = run_in_background(&pipeline, &index, show_bar)?;
    let finished = now_rfc3339();

    let report = JobReport::build(
        cfg,
        &JobMeta {
            job_id,
            input: &input.display().to_string(),
            started: &started,
            finished: &finished,
            tasks_completed: state.completed(),
        },
        &index,
        &outcome,
    );

    if cfg.output.write_report_json {
        std::fs::write(
            job_dir.join(&cfg.output.report_filename),
            serde_json::to_string_pretty(&report)?,
        )?;
    }

    let html_path = job_dir.join(&cfg.output.html_filename);
    if report.status == RunStatus::Cancelled {
        warn!("run cancelled; no HTML report written");
    } else if cfg.output.write_html {
        let html = build_html_report(&ReportInputs {
            title: "Bug Report Summary",
            generated_at: &finished,
            model: &cfg.llm.model,
            run: &outcome.summaries,
            charts: &charts,
            exports: &exports,
            failures: &outcome.failures,
        });
        std::fs::write(&html_path, html)
            .with_context(|| format!("write {}", html_path.display()))?;
        info!("[100%] report saved to {}", html_path.display());
    }

    if cfg.output.write_index_json {
        let index_json = serde_json::json!({
            "job_id": job_id,
            "job_name": cfg.global.job_name,
            "started": started,
            "finished": finished,
            "status": report.status,
            "html": (report.status != RunStatus::Cancelled && cfg.output.write_html)
                .then_some(&cfg.output.html_filename),
            "report": &cfg.output.report_filename,
            "exports": "exports/",
        });
        std::fs::write(
            job_dir.join("index.json"),
            serde_json::to_string_pretty(&index_json)?,
        )?;
    }

    if cfg.global.print_summary {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "job_id": job_id,
                "job_dir": job_dir,
                "status": report.status,
                "tasks": format!("{}/{}", report.tasks_completed, report.tasks_total),
                "failures": report.failures.len(),
            }))?
        );
    }

    Ok(())
}

/// Runs the pipeline on a worker thread while this thread reports progress.
fn run_in_background(
    pipeline: &Pipeline<OllamaEngine>,
    index: &crate::dataset::ProjectIndex<'_>,
    show_bar: bool,
) -> Result<RunOutcome> {
    let bar = show_bar.then(percent_bar);
    std::thread::scope(|s| -> Result<RunOutcome> {
        let (tx, rx) = mpsc::channel::<ProgressEvent>();
        let worker = s.spawn(move || pipeline.run(index, &tx));
        for ev in rx {
            match &bar {
                Some(pb) => {
                    pb.set_position(ev.percent.round() as u64);
                    pb.set_message(format!("{} ({}/{})", ev.label, ev.completed, ev.total));
                    debug!("[{:>3.0}%] {}", ev.percent, ev.label);
                }
                None => info!(
                    "[{:>3.0}%] {} ({}/{} done)",
                    ev.percent, ev.label, ev.completed, ev.total
                ),
            }
        }
        if let Some(pb) = &bar {
            pb.finish_and_clear();
        }
        worker
            .join()
            .map_err(|_| anyhow!("summary worker thread panicked"))?
    })
}

fn percent_bar() -> ProgressBar {
    let pb = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos:>3}% {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

fn validate_input(input: &Path) -> Result<()> {
    if !input.exists() {
        return Err(anyhow!("input does not exist: {}", input.display()));
    }

    match input.extension().and_then(|s| s.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => {}
        Some(_) => warn!("input does not have a .csv extension: {}", input.display()),
        None => warn!("input has no extension; assuming CSV: {}", input.display()),
    }

    Ok(())
}

fn resolve_log_path(cfg: &Config, job_dir: Option<&Path>) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    if let Some(job_dir) = job_dir {
        return Some(job_dir.join("logs").join("bug-digest.log"));
    }

    Some(PathBuf::from(&cfg.paths.out_dir).join("bug-digest.log"))
}
