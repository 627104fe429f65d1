mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use footfall_analytics::{doctor as geometry_doctor, ExportBundle};
use footfall_jobs::{JobId, JobInputs, JobManager, JobSpec};
use footfall_proto::progress::{ProgressState, Stage};
use footfall_vision::{doctor as video_doctor, Detector, FfmpegEncoder, FfmpegSource, FrameSink, FrameSource, ReplayDetector, SyntheticSource, VideoInfo};

use config::{load_config, Config};

#[derive(Debug, Parser)]
#[command(name = "footfall", version, about = "Footfall - zone occupancy and line-crossing analytics for video")]
struct Cli {
    #[arg(long)]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate zones and lines and check the ffmpeg tools.
    Doctor,
    /// Analyze one video (or a detections replay) and write the reports.
    Run(RunArgs),
}

#[derive(Debug, clap::Args)]
struct RunArgs {
    /// Video to decode and annotate. Without it, frames are synthetic.
    #[arg(long)]
    video: Option<PathBuf>,
    /// JSON-lines detections, one `{"frame": n, "boxes": [...]}` per line.
    #[arg(long)]
    detections: PathBuf,
    /// Frame count for synthetic runs; defaults to the last replayed frame.
    #[arg(long)]
    frames: Option<u64>,
    /// Frame rate for synthetic runs; defaults to `video.fallback_fps`.
    #[arg(long)]
    fps: Option<f64>,
    /// Output directory for report.json, report.csv and the annotated video.
    #[arg(long)]
    out: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg)?,
        Command::Run(args) => run(&cfg, args).await?,
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    for z in &cfg.zones {
        geometry_doctor::check_zone(z)?;
        info!("doctor: zone {} ({}, {} points) OK", z.name, z.kind.as_str(), z.points.len());
    }
    for l in &cfg.lines {
        geometry_doctor::check_line(l)?;
        info!("doctor: line {} OK", l.name);
    }
    geometry_doctor::check_geometry(&cfg.zones, &cfg.lines)?;
    cfg.crossing.to_config().validate()?;
    if cfg.zones.is_empty() && cfg.lines.is_empty() {
        warn!("doctor: no zones or lines configured; only detection totals will be reported");
    }

    for banner in video_doctor::check_ffmpeg(&cfg.video.tools())? {
        info!("doctor: {}", banner);
    }

    info!("doctor: OK");
    Ok(())
}

async fn run(cfg: &Config, args: RunArgs) -> Result<()> {
    info!("run: starting");
    std::fs::create_dir_all(&args.out).with_context(|| format!("create {}", args.out.display()))?;

    let replay = ReplayDetector::open(&args.detections)?;
    let replay_frames = replay.last_frame().unwrap_or(0);

    let mut spec = JobSpec::new(cfg.zones.clone(), cfg.lines.clone());
    spec.crossing = cfg.crossing.to_config();
    spec.bucket_seconds = cfg.timeline.bucket_seconds;
    spec.report_every_n_frames = cfg.progress.report_every_n_frames;
    spec.fallback_fps = cfg.video.fallback_fps;

    let detector = move || -> Result<Box<dyn Detector>> { Ok(Box::new(replay)) };
    let inputs = match &args.video {
        Some(video) => {
            let (video, tools) = (video.clone(), cfg.video.tools());
            let inputs = JobInputs::new(detector, move || -> Result<Box<dyn FrameSource>> {
                Ok(Box::new(FfmpegSource::open(&video, &tools)?))
            });
            if cfg.video.annotate {
                let out = args.out.join("annotated.mp4");
                let (tools, enc) = (cfg.video.tools(), cfg.video.encoder());
                inputs.with_sink(move |info: &VideoInfo, fps: f64| -> Result<Box<dyn FrameSink>> {
                    Ok(Box::new(FfmpegEncoder::create(&out, info.width, info.height, fps, &tools, &enc)?))
                })
            } else {
                inputs
            }
        }
        None => {
            let frames = args.frames.unwrap_or(replay_frames);
            let fps = args.fps.unwrap_or(cfg.video.fallback_fps);
            info!("run: synthetic source, {} frame(s) at {} fps", frames, fps);
            JobInputs::new(detector, move || -> Result<Box<dyn FrameSource>> { Ok(Box::new(SyntheticSource::new(frames, fps))) })
        }
    };
    let inputs = inputs.with_filter(cfg.detector.clone());

    let jobs = JobManager::new();
    let id = jobs.start_job(spec, inputs)?;
    let last = follow(&jobs, id, Duration::from_secs(cfg.progress.retention_s)).await?;

    match last.stage {
        Stage::Complete => {
            let bundle = jobs.report(id)?;
            let (json, csv) = write_exports(&args.out, "report", &bundle)?;
            info!("run: wrote {} and {}", json.display(), csv.display());
            if let Some(video) = last.result {
                info!("run: annotated video at {}", video);
            }
            Ok(())
        }
        stage => {
            if let Ok(bundle) = jobs.partial_report(id) {
                let (json, _) = write_exports(&args.out, "report.partial", &bundle)?;
                warn!("run: partial report written to {}", json.display());
            }
            anyhow::bail!("job ended in {:?}: {}", stage, last.message)
        }
    }
}

/// Logs progress until the job is terminal; Ctrl-C cancels it.
async fn follow(jobs: &JobManager, id: JobId, retention: Duration) -> Result<ProgressState> {
    let mut rx = jobs.progress_store().subscribe(id).context("job vanished")?;
    let mut sweep = tokio::time::interval(Duration::from_secs(60));
    let mut cancelled = false;
    let mut last_stage = None;

    loop {
        let st = rx.borrow_and_update().clone();
        if last_stage != Some(st.stage) {
            info!("{}: {:?} {}% {}", id, st.stage, st.percent, st.message);
            last_stage = Some(st.stage);
        }
        if st.stage.is_terminal() {
            return Ok(st);
        }

        tokio::select! {
            changed = rx.changed() => {
                changed.context("progress entry dropped")?;
            }
            _ = tokio::signal::ctrl_c(), if !cancelled => {
                warn!("{}: interrupt, cancelling", id);
                jobs.cancel(id);
                cancelled = true;
            }
            _ = sweep.tick() => {
                jobs.sweep(retention);
            }
        }
    }
}

fn write_exports(dir: &Path, stem: &str, bundle: &ExportBundle) -> Result<(PathBuf, PathBuf)> {
    let json = dir.join(format!("{}.json", stem));
    let csv = dir.join(format!("{}.csv", stem));
    std::fs::write(&json, &bundle.json).with_context(|| format!("write {}", json.display()))?;
    std::fs::write(&csv, &bundle.csv).with_context(|| format!("write {}", csv.display()))?;
    Ok((json, csv))
}
