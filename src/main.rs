//! Passline - batch runner for media command-line tools
//!
//! Command-line front-end: builds a batch from the arguments, runs it on a
//! worker task, and renders its progress events.

use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{Level, info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use passline::cli::{self, Args, Commands};
use passline::config::Config;
use passline::download::{DownloadAdapter, YtDlpBackend};
use passline::event::{self, ProgressEvent};
use passline::logfile::FileLogWriter;
use passline::modes::{self, Concat, LoudnessNormalize, OnePass, Slideshow, Stabilize, TwoPassEncode};
use passline::probe::DurationProbe;
use passline::render::{self, BarRenderer, JsonRenderer};
use passline::runner::TokioLauncher;
use passline::sequencer::{BatchItem, BatchJob, BatchReport, CancelFlag, JobHandle, PassPlan, Sequencer};

const DEFAULT_CONFIG: &str = "passline.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new(DEFAULT_CONFIG).exists() {
                Config::from_file(DEFAULT_CONFIG)?
            } else {
                Config::default()
            }
        }
    };

    setup_logging(args.verbose, &config.log.directory)?;
    info!("Starting passline");

    let json = args.json;
    let report = match args.command {
        Commands::InitConfig { output } => {
            Config::default().save_to_file(&output)?;
            println!("Wrote default configuration to {}", output.display());
            return Ok(());
        }
        Commands::Download { urls, output_dir } => run_downloads(&config, urls, output_dir, json).await?,
        Commands::Concat {
            inputs,
            output,
            params,
        } => {
            let files = cli::collect_inputs(&inputs)?;
            let list = modes::sidecar_path(&output, "_concat.txt");
            modes::write_concat_list(&files, &list)?;

            let probe = DurationProbe::new(&config.tools.ffprobe_path);
            let mut total = Some(0u64);
            for file in &files {
                total = match (total, probe.duration_or_none(file).await) {
                    (Some(sum), Some(ms)) => Some(sum + ms),
                    _ => None,
                };
            }

            let item = BatchItem::new(&list, &output).with_duration(total);
            let plan = Concat::new(config.tools.ffmpeg_path.clone(), params);
            let report = run_batch(&config, Arc::new(plan), vec![item], json).await?;
            if let Err(e) = std::fs::remove_file(&list) {
                warn!("Could not remove {}: {}", list.display(), e);
            }
            report
        }
        Commands::Slideshow {
            pattern,
            output,
            framerate,
            params,
        } => {
            let plan = Slideshow::new(config.tools.ffmpeg_path.clone(), framerate, params);
            run_batch(&config, Arc::new(plan), vec![BatchItem::new(&pattern, &output)], json).await?
        }
        command => {
            let (plan, items) = per_file_batch(&config, command).await?;
            run_batch(&config, plan, items, json).await?
        }
    };

    let summary = report.summary();
    println!("{}", summary);
    if !summary.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

/// Plans whose batch is one item per input file.
async fn per_file_batch(config: &Config, command: Commands) -> Result<(Arc<dyn PassPlan>, Vec<BatchItem>)> {
    let ffmpeg = config.tools.ffmpeg_path.clone();
    let (plan, inputs, output_dir, suffix, ext) = match command {
        Commands::Convert {
            inputs,
            output_dir,
            params,
            ext,
            two_pass,
        } => {
            let plan: Arc<dyn PassPlan> = if two_pass {
                Arc::new(TwoPassEncode::new(ffmpeg, params))
            } else {
                Arc::new(OnePass::new(ffmpeg, params))
            };
            (plan, inputs, output_dir, "_converted", Some(ext))
        }
        Commands::Loudnorm {
            inputs,
            output_dir,
            params,
            ext,
        } => (
            Arc::new(LoudnessNormalize::new(ffmpeg, config.loudness.clone(), params)) as Arc<dyn PassPlan>,
            inputs,
            output_dir,
            "_loudnorm",
            ext,
        ),
        Commands::Stabilize {
            inputs,
            output_dir,
            shakiness,
            smoothing,
            params,
            ext,
        } => (
            Arc::new(Stabilize::new(ffmpeg, shakiness, smoothing, params)) as Arc<dyn PassPlan>,
            inputs,
            output_dir,
            "_stabilized",
            ext,
        ),
        Commands::Frames {
            inputs,
            output_dir,
            fps,
        } => (
            Arc::new(OnePass::extract_frames(ffmpeg, fps)) as Arc<dyn PassPlan>,
            inputs,
            output_dir,
            "_%04d",
            Some("png".to_string()),
        ),
        _ => anyhow::bail!("command does not run a per-file batch"),
    };

    let files = cli::collect_inputs(&inputs)?;
    if files.is_empty() {
        anyhow::bail!("No media files found in the given inputs");
    }
    info!("Found {} file(s) to process", files.len());

    let probe = DurationProbe::new(&config.tools.ffprobe_path);
    let mut items = Vec::with_capacity(files.len());
    for file in files {
        let destination = cli::destination_for(&file, output_dir.as_deref(), suffix, ext.as_deref());
        let duration = probe.duration_or_none(&file).await;
        items.push(BatchItem::new(&file, destination).with_duration(duration));
    }

    Ok((plan, items))
}

async fn run_batch(
    config: &Config,
    plan: Arc<dyn PassPlan>,
    items: Vec<BatchItem>,
    json: bool,
) -> Result<BatchReport> {
    let log = FileLogWriter::for_run(&config.log.directory, plan.name())?;
    info!("Audit log: {}", log.path().display());

    let (tx, rx) = event::channel();
    let renderer = spawn_renderer(rx, json);

    let sequencer = Sequencer::new(Arc::new(TokioLauncher::new()), Arc::new(tx), Arc::new(log))
        .with_grace(config.runner.grace());
    let report = join_with_interrupt(sequencer.spawn(BatchJob::new(items, plan))).await?;

    renderer.await??;
    Ok(report)
}

async fn run_downloads(config: &Config, urls: Vec<String>, output_dir: PathBuf, json: bool) -> Result<BatchReport> {
    let log = FileLogWriter::for_run(&config.log.directory, "download")?;
    info!("Audit log: {}", log.path().display());

    let (tx, rx) = event::channel();
    let renderer = spawn_renderer(rx, json);

    let backend = YtDlpBackend::new(
        Arc::new(TokioLauncher::new()),
        config.tools.ytdlp_path.clone(),
        output_dir,
        config.download.clone(),
    );
    let adapter = DownloadAdapter::new(Arc::new(backend), Arc::new(tx), Arc::new(log));
    let report = join_with_interrupt(adapter.spawn(urls, CancelFlag::new())).await?;

    renderer.await??;
    Ok(report)
}

fn spawn_renderer(
    events: tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>,
    json: bool,
) -> JoinHandle<passline::error::Result<()>> {
    if json {
        tokio::spawn(render::drain(events, JsonRenderer::stdout()))
    } else {
        tokio::spawn(render::drain(events, BarRenderer::new()))
    }
}

/// Waits for the worker, turning Ctrl-C into a cancel request.
async fn join_with_interrupt(handle: JobHandle) -> Result<BatchReport> {
    let cancel = handle.cancel_flag();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current pass");
            cancel.request();
        }
    });

    let report = handle.join().await;
    interrupt.abort();
    Ok(report?)
}

fn setup_logging(verbose: bool, log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir)?;

    // Daily rotation alongside the per-run audit logs
    let file_appender = rolling::daily(log_dir, "passline.log");
    let (non_blocking_file, _guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(_guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // Console output goes to stderr so JSON events on stdout stay clean
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
