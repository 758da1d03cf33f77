use crate::config::{AppConfig, DEFAULT_CONFIG_PATH};
use crate::extract::FfmpegExtractor;
use crate::model::{ExtractParams, RunConfig, RunEvent};
use crate::node::hosts::parse_host_list;
use crate::node::HttpConnector;
use crate::orchestrator::{Orchestrator, RunRequest};
use crate::storage::load_record;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

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

#[derive(Debug, Parser, Clone)]
#[command(
    name = "photogrammetry-odm",
    version,
    about = "Turn a video into a photogrammetric reconstruction on NodeODM backends"
)]
pub struct Cli {
    /// YAML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging (overrides RUST_LOG and runtime.log_level)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Extract frames, reconstruct on the least-loaded backend, download outputs
    Run(RunArgs),
    /// Show the record of an earlier run
    Status(StatusArgs),
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Input video; looked up under <data_dir>/raw when not found as given
    #[arg(long)]
    pub video: PathBuf,

    /// Use this run id instead of generating one
    #[arg(long)]
    pub run_id: Option<String>,

    /// Frames per second to extract
    #[arg(long)]
    pub fps: Option<f64>,

    /// Keep at most this many frames (0 = unlimited)
    #[arg(long)]
    pub max_frames: Option<u32>,

    /// Start offset into the video, in seconds
    #[arg(long)]
    pub start_seconds: Option<f64>,

    /// Length of the extracted window, in seconds (0 = to the end)
    #[arg(long)]
    pub duration_seconds: Option<f64>,

    /// Reconstruction option passed to the backend; repeatable
    #[arg(long = "odm-opt", value_name = "KEY=VALUE")]
    pub odm_opt: Vec<String>,

    /// Skip copying the main deliverables to the processed-results area
    /// (overrides `runtime.copy_processed`)
    #[arg(long)]
    pub no_copy_processed: bool,

    /// Backend hosts, comma or whitespace separated (overrides the environment)
    #[arg(long)]
    pub hosts: Option<String>,

    /// Seconds between task status checks
    #[arg(long)]
    pub poll_seconds: Option<u64>,

    /// Per-host timeout of the load probe
    #[arg(long)]
    pub probe_timeout: Option<humantime::Duration>,

    /// Print the run record as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args, Clone)]
pub struct StatusArgs {
    pub run_id: String,

    /// Print the run record as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: Cli) -> Result<()> {
    let explicit = args.config.is_some();
    let path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let app = AppConfig::load(&path, explicit)?;
    init_logging(&app.runtime.log_level, args.verbose);

    match &args.command {
        Command::Run(run_args) => {
            let hosts_env = std::env::var(&app.odm.host_env).ok();
            let cfg = build_config(&app, run_args, hosts_env.as_deref())?;
            run_pipeline(&app, cfg, run_args).await
        }
        Command::Status(status) => show_status(&app, status),
    }
}

fn init_logging(level: &str, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Parse `KEY=VALUE` pairs, coercing values to bool, integer, float or string.
pub fn parse_kv_list(items: &[String]) -> Result<BTreeMap<String, Value>> {
    let mut out = BTreeMap::new();
    for item in items {
        let (key, value) = item
            .split_once('=')
            .with_context(|| format!("expected KEY=VALUE, got {item:?}"))?;
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("empty option name in {item:?}");
        }
        out.insert(key.to_string(), coerce_value(value.trim()));
    }
    Ok(out)
}

fn coerce_value(raw: &str) -> Value {
    if raw.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() {
            return Value::from(f);
        }
    }
    Value::String(raw.to_string())
}

/// Build the frozen run configuration: file and environment first, then flags.
pub fn build_config(app: &AppConfig, args: &RunArgs, hosts_env: Option<&str>) -> Result<RunConfig> {
    let hosts = match args.hosts.as_deref() {
        Some(raw) => {
            let hosts = parse_host_list(raw).context("parse --hosts")?;
            if hosts.is_empty() {
                anyhow::bail!("--hosts does not name any host");
            }
            hosts
        }
        None => app.hosts_from(hosts_env)?,
    };

    let poll_seconds = args.poll_seconds.unwrap_or(app.odm.poll_seconds);
    if poll_seconds == 0 {
        anyhow::bail!("poll_seconds must be at least 1");
    }

    let mut odm_options = app.odm_options.clone();
    odm_options.extend(parse_kv_list(&args.odm_opt)?);

    Ok(RunConfig {
        extract: ExtractParams {
            fps: args.fps.unwrap_or(app.video.fps),
            max_frames: args.max_frames.unwrap_or(app.video.max_frames),
            start_seconds: args.start_seconds.unwrap_or(app.video.start_seconds),
            duration_seconds: args.duration_seconds.unwrap_or(app.video.duration_seconds),
        },
        hosts,
        parallel_uploads: app.odm.parallel_uploads,
        upload_batch_size: app.odm.upload_batch_size,
        poll_seconds,
        probe_timeout: args
            .probe_timeout
            .map(Duration::from)
            .unwrap_or(app.odm.probe_timeout),
        request_timeout: app.odm.request_timeout,
        max_poll_errors: app.odm.max_poll_errors,
        probe_rounds: app.odm.probe_rounds,
        odm_options,
        copy_processed: app.runtime.copy_processed && !args.no_copy_processed,
        user_agent: format!("photogrammetry-odm/{}", env!("CARGO_PKG_VERSION")),
    })
}

async fn run_pipeline(app: &AppConfig, cfg: RunConfig, args: &RunArgs) -> Result<()> {
    info!(project = %app.project.name, hosts = ?cfg.hosts, "starting run");
    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<RunEvent>();

    let printer_tx = out_tx.clone();
    let printer = tokio::spawn(async move {
        while let Some(ev) = evt_rx.recv().await {
            let _ = printer_tx.send(OutputLine::Stderr(ev.to_message()));
        }
    });

    let outcome = {
        let connector = HttpConnector::new(&cfg, Some(evt_tx.clone()))?;
        let extractor = FfmpegExtractor::new(app.video.ffmpeg_bin.clone());
        let orchestrator = Orchestrator::new(
            cfg,
            app.runtime.runs_dir.clone(),
            app.runtime.data_dir.clone(),
            extractor,
            connector,
            evt_tx,
        );
        let req = RunRequest {
            video: args.video.clone(),
            run_id: args.run_id.clone(),
        };
        tokio::select! {
            res = orchestrator.run(req) => Some(res),
            _ = tokio::signal::ctrl_c() => None,
        }
    };
    let _ = printer.await;

    let result = match outcome {
        Some(Ok(record)) => {
            if args.json {
                let _ = out_tx.send(OutputLine::Stdout(serde_json::to_string_pretty(&record)?));
            } else {
                for line in crate::text_summary::build_text_summary(&record).lines {
                    let _ = out_tx.send(OutputLine::Stdout(line));
                }
            }
            Ok(())
        }
        Some(Err(err)) => {
            if let Some(run_id) = err.run_id.as_deref() {
                let record_path = app.runtime.runs_dir.join(run_id).join("run.json");
                if let Ok(record) = load_record(&record_path) {
                    for line in crate::text_summary::build_text_summary(&record).lines {
                        let _ = out_tx.send(OutputLine::Stderr(line));
                    }
                }
            }
            Err(anyhow::Error::from(err))
        }
        None => {
            let _ = out_tx.send(OutputLine::Stderr(
                "Interrupted. A submitted task keeps running on the backend.".into(),
            ));
            Err(anyhow::anyhow!("interrupted"))
        }
    };

    drop(out_tx);
    let _ = out_handle.await;
    result
}

fn show_status(app: &AppConfig, args: &StatusArgs) -> Result<()> {
    crate::run_id::validate(&args.run_id)?;
    let path = app.runtime.runs_dir.join(&args.run_id).join("run.json");
    let record = load_record(&path)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        for line in crate::text_summary::build_text_summary(&record).lines {
            println!("{line}");
        }
    }
    Ok(())
}
