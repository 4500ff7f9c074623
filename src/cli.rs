use crate::engine::{EngineModule, SimModule, WorldConfig};
use crate::model::{
    BatchEvent, BatchJob, BatchJobConfig, BatchSettings, Camera, JobStatus, ReproductionMethod,
    SimConfig, Viewport,
};
use crate::orchestrator::{self, BatchCommand, BatchOrchestrator};
use crate::session::{self, SessionCommand, SessionController, SessionEvent, SessionSettings};
use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

/// Render target used when no terminal is attached.
const HEADLESS_VIEWPORT: Viewport = Viewport {
    width: 80,
    height: 40,
};

#[derive(Debug, Parser, Clone)]
#[command(
    name = "choanosim",
    version,
    about = "Choanoflagellate colony simulator with interactive TUI and background batch runs"
)]
pub struct Cli {
    /// Print JSON report and exit (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Print text summary and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Batch run as METHOD:BEGIN:SWITCHED, e.g. asexual:240:600 (repeatable)
    #[arg(long = "batch", value_name = "METHOD:BEGIN:SWITCHED")]
    pub batch: Vec<BatchJobConfig>,

    /// JSON file with an array of batch configurations
    #[arg(long)]
    pub batch_file: Option<PathBuf>,

    /// Replicate simulations averaged per sample in a batch run
    #[arg(long, default_value_t = 10)]
    pub simulations: usize,

    /// Samples (CSV rows) per batch run
    #[arg(long, default_value_t = 1_000)]
    pub samples: usize,

    /// Engine steps between samples in a batch run
    #[arg(long, default_value_t = 1_000)]
    pub steps_per_sample: usize,

    /// Sample index at which food density switches (default: half of --samples)
    #[arg(long)]
    pub switch_at: Option<usize>,

    /// RNG seed for reproducible worlds
    #[arg(long)]
    pub seed: Option<u64>,

    /// Food density of the interactive world (higher regrows slower)
    #[arg(long, default_value_t = 240)]
    pub food_density: u32,

    /// Reproduction method of the interactive world
    #[arg(long, default_value_t = ReproductionMethod::Asexual)]
    pub reproduction: ReproductionMethod,

    /// Raw step slider value; each step advances round(value^2) ticks
    #[arg(long, default_value_t = 1.0)]
    pub step_slider: f64,

    /// Initial camera zoom (must be positive)
    #[arg(long, default_value_t = 1.0)]
    pub zoom: f64,

    /// Ticks to run in a headless session
    #[arg(long, default_value_t = 1_000)]
    pub steps: u64,

    /// Delay between frames while playing
    #[arg(long, default_value = "16ms")]
    pub frame_interval: humantime::Duration,

    /// Wait after focus returns before delivering queued results
    #[arg(long, default_value = "250ms")]
    pub settle_delay: humantime::Duration,

    /// Directory for delivered results and snapshots (default: downloads directory)
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Write the headless session snapshot to this file instead of stdout
    #[arg(long)]
    pub export_csv: Option<PathBuf>,

    /// Write logs to this file (RUST_LOG filters apply)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    pub fn is_headless(&self) -> bool {
        self.json || self.text
    }
}

pub async fn run(args: Cli) -> Result<()> {
    if !args.step_slider.is_finite() || args.step_slider < 0.0 {
        return Err(anyhow::anyhow!(
            "--step-slider must be a non-negative number, got {}",
            args.step_slider
        ));
    }

    if !args.is_headless() {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return run_headless(args, false).await;
        }
    }

    let json = args.json;
    run_headless(args, json).await
}

async fn run_headless(args: Cli, json: bool) -> Result<()> {
    let configs = load_batch_configs(&args)?;
    if configs.is_empty() {
        run_session_headless(args, json).await
    } else {
        run_batch_headless(args, configs, json).await
    }
}

/// Camera the session starts with, centred on the world origin.
pub fn initial_camera(args: &Cli) -> Result<Camera> {
    Camera::new(0.0, 0.0, args.zoom)
        .ok_or_else(|| anyhow::anyhow!("--zoom must be a positive number, got {}", args.zoom))
}

/// Build a `SimConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> SimConfig {
    SimConfig {
        food_density: args.food_density,
        reproduction: args.reproduction,
        step_slider: args.step_slider,
        frame_interval: Duration::from(args.frame_interval),
        settle_delay: Duration::from(args.settle_delay),
        batch: BatchSettings {
            simulations: args.simulations,
            samples: args.samples,
            steps_per_sample: args.steps_per_sample,
            switch_at_sample: args.switch_at.unwrap_or(args.samples / 2),
            seed: args.seed,
        },
        out_dir: args
            .out_dir
            .clone()
            .unwrap_or_else(crate::storage::default_out_dir),
    }
}

/// Collect batch configurations from `--batch` flags and `--batch-file`.
pub fn load_batch_configs(args: &Cli) -> Result<Vec<BatchJobConfig>> {
    let mut configs = args.batch.clone();
    if let Some(path) = args.batch_file.as_deref() {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read batch file {}", path.display()))?;
        let from_file: Vec<BatchJobConfig> = serde_json::from_str(&raw)
            .with_context(|| format!("parse batch file {}", path.display()))?;
        configs.extend(from_file);
    }
    Ok(configs)
}

/// The engine module every surface loads its instances from.
pub fn build_module(cfg: &SimConfig) -> SimModule {
    let world = WorldConfig {
        food_density: cfg.food_density.max(1),
        reproduction: cfg.reproduction,
        ..WorldConfig::default()
    };
    SimModule {
        seed: cfg.batch.seed,
        ..SimModule::new(world, cfg.batch)
    }
}

fn timestamp_utc() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

#[derive(Serialize)]
struct JobReport {
    id: usize,
    label: String,
    status: JobStatus,
    progress_percent: u8,
    path: Option<PathBuf>,
    error: Option<String>,
}

#[derive(Serialize)]
struct BatchReport<'a> {
    time: String,
    config: &'a SimConfig,
    jobs: Vec<JobReport>,
}

#[derive(Serialize)]
struct SessionReport<'a> {
    time: String,
    config: &'a SimConfig,
    session: session::SessionState,
    snapshot_path: Option<PathBuf>,
    snapshot: Option<String>,
}

async fn run_batch_headless(args: Cli, configs: Vec<BatchJobConfig>, json: bool) -> Result<()> {
    let cfg = build_config(&args);
    let module: Arc<dyn EngineModule> = Arc::new(build_module(&cfg));
    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<BatchEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<BatchCommand>();

    // Nothing can steal focus from a headless run.
    let orch = BatchOrchestrator::new(module, true, cfg.settle_delay, evt_tx);
    let handle = tokio::spawn(orchestrator::run_orchestrator(orch, cmd_rx));
    let _ = cmd_tx.send(BatchCommand::Launch(configs));

    let mut total = 0usize;
    let mut finished = 0usize;
    let mut written: HashMap<usize, PathBuf> = HashMap::new();

    while let Some(ev) = evt_rx.recv().await {
        match ev {
            BatchEvent::Launched { jobs } => {
                total += jobs.len();
                let _ = out_tx.send(OutputLine::Stderr(format!(
                    "Launched {} batch job(s)",
                    jobs.len()
                )));
            }
            BatchEvent::Progress { label, percent, .. } => {
                let _ = out_tx.send(OutputLine::Stderr(format!("{label}: {percent}%")));
            }
            BatchEvent::Queued { label, .. } => {
                let _ = out_tx.send(OutputLine::Stderr(format!("{label}: queued")));
            }
            BatchEvent::Delivered { job, delivery } => {
                finished += 1;
                let processed = orchestrator::process_delivery(&cfg.out_dir, &delivery);
                let _ = out_tx.send(OutputLine::Stderr(format!(
                    "{}: {}",
                    delivery.label, processed.message
                )));
                if let Some(p) = processed.path {
                    written.insert(job, p);
                }
            }
            BatchEvent::Failed { label, error, .. } => {
                finished += 1;
                let _ = out_tx.send(OutputLine::Stderr(format!("{label}: failed: {error}")));
            }
            BatchEvent::Info(msg) => {
                let _ = out_tx.send(OutputLine::Stderr(msg));
            }
        }
        if total > 0 && finished >= total {
            let _ = cmd_tx.send(BatchCommand::Quit);
        }
    }

    let jobs = handle.await.context("batch orchestrator task failed")?;

    if json {
        let report = BatchReport {
            time: timestamp_utc(),
            config: &cfg,
            jobs: jobs.iter().map(|j| job_report(j, &written)).collect(),
        };
        let out = serde_json::to_string_pretty(&report)?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        let summary = crate::text_summary::build_batch_summary(&jobs, &written);
        for line in summary.lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
    drop(out_tx);
    let _ = out_handle.await;

    let failed = jobs
        .iter()
        .filter(|j| j.status == JobStatus::Failed)
        .count();
    if failed > 0 {
        return Err(anyhow::anyhow!("{failed} of {} batch job(s) failed", jobs.len()));
    }
    Ok(())
}

fn job_report(job: &BatchJob, written: &HashMap<usize, PathBuf>) -> JobReport {
    JobReport {
        id: job.id,
        label: job.label(),
        status: job.status,
        progress_percent: job.progress_percent,
        path: written.get(&job.id).cloned(),
        error: job.error.clone(),
    }
}

async fn run_session_headless(args: Cli, json: bool) -> Result<()> {
    let cfg = build_config(&args);
    let module = build_module(&cfg);
    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<SessionCommand>();

    let settings = SessionSettings {
        viewport: HEADLESS_VIEWPORT,
        camera: initial_camera(&args)?,
        step_slider: cfg.step_slider,
        frame_interval: Duration::ZERO,
    };
    let controller =
        SessionController::new(&module, settings, evt_tx).context("failed to start session")?;
    let handle = tokio::spawn(session::run_session(controller, cmd_rx));

    let target = args.steps;
    let mut export_requested = false;
    let mut snapshot: Option<String> = None;

    // One step per frame: a step sent while a frame is in flight would be dropped.
    while let Some(ev) = evt_rx.recv().await {
        match ev {
            SessionEvent::Frame { snapshot: s, .. } => {
                if export_requested {
                    continue;
                }
                if s.step_count >= target {
                    export_requested = true;
                    let _ = cmd_tx.send(SessionCommand::ExportSnapshot);
                } else {
                    let _ = cmd_tx.send(SessionCommand::Step);
                }
            }
            SessionEvent::Snapshot { csv, .. } => {
                snapshot = Some(csv);
                let _ = cmd_tx.send(SessionCommand::Quit);
            }
            SessionEvent::Fatal(e) => {
                let _ = out_tx.send(OutputLine::Stderr(format!("Session stopped: {e}")));
            }
            SessionEvent::State(_) => {}
        }
    }

    let state = handle
        .await
        .context("session task failed")?
        .context("session failed")?;
    let csv = snapshot.context("session ended without a snapshot")?;

    let snapshot_path = match args.export_csv.as_deref() {
        Some(p) => Some(crate::storage::export_csv(p, &csv)?),
        None => None,
    };

    if json {
        let report = SessionReport {
            time: timestamp_utc(),
            config: &cfg,
            session: state,
            snapshot: snapshot_path.is_none().then_some(csv),
            snapshot_path: snapshot_path.clone(),
        };
        let out = serde_json::to_string_pretty(&report)?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        if snapshot_path.is_none() {
            for line in csv.lines() {
                let _ = out_tx.send(OutputLine::Stdout(line.to_string()));
            }
        }
        let summary = crate::text_summary::build_session_summary(&state, snapshot_path.as_ref());
        for line in summary.lines {
            let _ = out_tx.send(OutputLine::Stderr(line));
        }
    }
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}
