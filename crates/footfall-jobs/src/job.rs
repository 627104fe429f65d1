use anyhow::Context;
use footfall_analytics::aggregate::DEFAULT_BUCKET_SECONDS;
use footfall_analytics::{doctor, CountingLine, CrossingConfig, ExportBundle, FrameAnalyzer, InputError, Zone};
use footfall_proto::analytics::LineCounts;
use footfall_proto::progress::{ProgressState, Stage};
use footfall_vision::sink::preview_jpeg;
use footfall_vision::{DetectionFilter, Detector, FrameSink, FrameSource, Overlay, VideoInfo};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{JobError, ReportError};
use crate::progress::{JobId, ProgressHandle, ProgressStore};

pub type DetectorLoader = Box<dyn FnOnce() -> anyhow::Result<Box<dyn Detector>> + Send>;
pub type SourceOpener = Box<dyn FnOnce() -> anyhow::Result<Box<dyn FrameSource>> + Send>;
pub type SinkOpener = Box<dyn FnOnce(&VideoInfo, f64) -> anyhow::Result<Box<dyn FrameSink>> + Send>;

const PREVIEW_WIDTH: u32 = 480;
const PREVIEW_QUALITY: u8 = 70;
const DEFAULT_REPORT_EVERY: u64 = 30;
const DEFAULT_FALLBACK_FPS: f64 = 30.0;

/// Geometry and tuning for one job. Validated before the job is accepted.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub zones: Vec<Zone>,
    pub lines: Vec<CountingLine>,
    pub crossing: CrossingConfig,
    pub bucket_seconds: f64,
    pub report_every_n_frames: u64,
    /// Used when the source reports no usable frame rate.
    pub fallback_fps: f64,
    pub preview: bool,
}

impl JobSpec {
    pub fn new(zones: Vec<Zone>, lines: Vec<CountingLine>) -> Self {
        Self {
            zones,
            lines,
            crossing: CrossingConfig::default(),
            bucket_seconds: DEFAULT_BUCKET_SECONDS,
            report_every_n_frames: DEFAULT_REPORT_EVERY,
            fallback_fps: DEFAULT_FALLBACK_FPS,
            preview: true,
        }
    }

    fn validate(&self) -> Result<(), InputError> {
        doctor::check_geometry(&self.zones, &self.lines)?;
        self.crossing.validate()
    }
}

/// The external collaborators of a job, opened lazily by its worker.
pub struct JobInputs {
    detector: DetectorLoader,
    source: SourceOpener,
    sink: Option<SinkOpener>,
    filter: DetectionFilter,
}

impl JobInputs {
    pub fn new<D, S>(detector: D, source: S) -> Self
    where
        D: FnOnce() -> anyhow::Result<Box<dyn Detector>> + Send + 'static,
        S: FnOnce() -> anyhow::Result<Box<dyn FrameSource>> + Send + 'static,
    {
        Self { detector: Box::new(detector), source: Box::new(source), sink: None, filter: DetectionFilter::default() }
    }

    /// Annotated frames go here when the source has pixels.
    pub fn with_sink<K>(mut self, sink: K) -> Self
    where
        K: FnOnce(&VideoInfo, f64) -> anyhow::Result<Box<dyn FrameSink>> + Send + 'static,
    {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn with_filter(mut self, filter: DetectionFilter) -> Self {
        self.filter = filter;
        self
    }
}

struct StoredReport {
    bundle: ExportBundle,
    complete: bool,
}

type Reports = Arc<RwLock<HashMap<JobId, StoredReport>>>;

/// Accepts jobs, runs each on its own blocking worker and keeps their
/// progress and reports until swept.
#[derive(Clone, Default)]
pub struct JobManager {
    progress: ProgressStore,
    reports: Reports,
    cancels: Arc<Mutex<HashMap<JobId, Arc<AtomicBool>>>>,
    next_id: Arc<AtomicU64>,
}

impl JobManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress_store(&self) -> &ProgressStore {
        &self.progress
    }

    /// Validates geometry synchronously, then spawns the worker.
    /// Must be called from within a tokio runtime.
    pub fn start_job(&self, spec: JobSpec, inputs: JobInputs) -> Result<JobId, InputError> {
        spec.validate()?;

        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let handle = self.progress.register(id);
        let cancel = Arc::new(AtomicBool::new(false));
        self.cancels.lock().insert(id, cancel.clone());
        info!("{}: accepted ({} zone(s), {} line(s))", id, spec.zones.len(), spec.lines.len());

        let reports = self.reports.clone();
        let worker = tokio::task::spawn_blocking(move || run_worker(handle, spec, inputs, cancel, reports));

        let store = self.progress.clone();
        let cancels = self.cancels.clone();
        tokio::spawn(async move {
            if let Err(e) = worker.await {
                error!("{}: worker died: {}", id, e);
                store.abort(id, format!("Worker died: {}", e));
            }
            cancels.lock().remove(&id);
        });
        Ok(id)
    }

    pub fn progress(&self, id: JobId) -> Option<ProgressState> {
        self.progress.get(id)
    }

    pub fn preview(&self, id: JobId) -> Option<Arc<Vec<u8>>> {
        self.progress.preview(id)
    }

    /// Resolves once the job reaches a terminal stage.
    pub async fn wait(&self, id: JobId) -> Option<ProgressState> {
        let mut rx = self.progress.subscribe(id)?;
        loop {
            let st = rx.borrow_and_update().clone();
            if st.stage.is_terminal() {
                return Some(st);
            }
            if rx.changed().await.is_err() {
                return self.progress.get(id);
            }
        }
    }

    /// Both exports, once the job is complete.
    pub fn report(&self, id: JobId) -> Result<ExportBundle, ReportError> {
        let st = self.progress.get(id).ok_or(ReportError::UnknownJob(id))?;
        if st.stage != Stage::Complete {
            return Err(ReportError::NotReady { job: id, stage: st.stage });
        }
        match self.reports.read().get(&id) {
            Some(r) if r.complete => Ok(r.bundle.clone()),
            _ => Err(ReportError::NotReady { job: id, stage: st.stage }),
        }
    }

    /// Best-effort exports of the frames processed before a job failed or
    /// was cancelled.
    pub fn partial_report(&self, id: JobId) -> Result<ExportBundle, ReportError> {
        let st = self.progress.get(id).ok_or(ReportError::UnknownJob(id))?;
        if !st.stage.is_terminal() {
            return Err(ReportError::NotReady { job: id, stage: st.stage });
        }
        self.reports.read().get(&id).map(|r| r.bundle.clone()).ok_or(ReportError::NoFrames { job: id })
    }

    /// Asks a running job to stop before its next frame. Returns false if the
    /// job is unknown or its worker has exited.
    pub fn cancel(&self, id: JobId) -> bool {
        match self.cancels.lock().get(&id) {
            Some(flag) => {
                info!("{}: cancel requested", id);
                flag.store(true, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Forgets terminal jobs older than `retention`, reports included.
    pub fn sweep(&self, retention: Duration) -> usize {
        let removed = self.progress.sweep(retention);
        if !removed.is_empty() {
            let mut reports = self.reports.write();
            for id in &removed {
                reports.remove(id);
            }
            debug!("sweep: dropped {} job(s)", removed.len());
        }
        removed.len()
    }
}

fn processing_percent(frame: u64, total: u64) -> u8 {
    if total == 0 {
        return 10;
    }
    let done = frame.min(total) as f64 / total as f64;
    (10.0 + 75.0 * done).floor() as u8
}

fn cumulative(lines: &[LineCounts]) -> LineCounts {
    lines.iter().fold(LineCounts::default(), |mut acc, c| {
        acc.add(c);
        acc
    })
}

fn render(analyzer: &FrameAnalyzer, total_frames: u64, bucket_seconds: f64) -> anyhow::Result<ExportBundle> {
    analyzer.report(total_frames).bucket_seconds(bucket_seconds).export().context("render report")
}

struct Run {
    analyzer: Option<FrameAnalyzer>,
    total_frames: u64,
    output: Option<String>,
}

fn run_worker(handle: ProgressHandle, spec: JobSpec, inputs: JobInputs, cancel: Arc<AtomicBool>, reports: Reports) {
    let id = handle.id();
    let mut run = Run { analyzer: None, total_frames: 0, output: None };
    let result = process(&handle, &spec, inputs, &cancel, &mut run);

    let finished = match result {
        Ok(()) => match run.analyzer.as_ref().map(|a| render(a, run.total_frames, spec.bucket_seconds)) {
            Some(Ok(bundle)) => {
                reports.write().insert(id, StoredReport { bundle, complete: true });
                info!("{}: complete", id);
                handle.complete(run.output.take())
            }
            Some(Err(e)) => {
                error!("{}: {:#}", id, e);
                handle.fail(format!("Error: {:#}", e))
            }
            None => handle.fail("Error: no analyzer"),
        },
        Err(JobError::Cancelled) => {
            if let Some(a) = run.analyzer.as_mut() {
                let dropped = a.release_anchors();
                debug!("{}: released {} anchor(s)", id, dropped);
            }
            keep_partial(id, &run, &spec, &reports);
            info!("{}: cancelled", id);
            handle.cancelled()
        }
        Err(e) => {
            let msg = e.describe();
            error!("{}: {}", id, msg);
            keep_partial(id, &run, &spec, &reports);
            handle.fail(format!("Error: {}", msg))
        }
    };
    if let Err(e) = finished {
        warn!("{}: final progress write failed: {}", id, e);
    }
}

fn keep_partial(id: JobId, run: &Run, spec: &JobSpec, reports: &Reports) {
    let Some(analyzer) = run.analyzer.as_ref() else { return };
    if analyzer.aggregator().records().is_empty() {
        return;
    }
    match render(analyzer, run.total_frames, spec.bucket_seconds) {
        Ok(bundle) => {
            reports.write().insert(id, StoredReport { bundle, complete: false });
        }
        Err(e) => warn!("{}: partial report failed: {:#}", id, e),
    }
}

fn process(
    handle: &ProgressHandle,
    spec: &JobSpec,
    inputs: JobInputs,
    cancel: &AtomicBool,
    run: &mut Run,
) -> Result<(), JobError> {
    let id = handle.id();
    let JobInputs { detector, source, sink, filter } = inputs;

    handle.update(Stage::Loading, 5, "Loading detector")?;
    let mut detector = detector().context("load detector")?;

    handle.update(Stage::Loading, 10, "Opening video")?;
    let mut source = source().context("open video")?;
    let info = source.info().clone();
    let fps = match info.fps {
        Some(f) if f > 0.0 => f,
        _ => {
            warn!("{}: source reports no frame rate, assuming {}", id, spec.fallback_fps);
            spec.fallback_fps
        }
    };
    let total = info.total_frames.unwrap_or(0);
    run.total_frames = total;

    let analyzer = run.analyzer.insert(FrameAnalyzer::new(spec.zones.clone(), spec.lines.clone(), spec.crossing.clone(), fps)?);
    let mut sink = match sink {
        Some(open) if info.width > 0 && info.height > 0 => Some(open(&info, fps).context("open encoder")?),
        _ => None,
    };
    let overlay = Overlay::new(&spec.zones, &spec.lines);
    let every = spec.report_every_n_frames.max(1);

    handle.update(Stage::Processing, 10, "Processing frames")?;
    let mut processed = 0u64;
    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(JobError::Cancelled);
        }
        let frame = match source.next_frame().context("decode frame")? {
            Some(f) => f,
            None => break,
        };

        let boxes = match detector.detect(&frame) {
            Ok(raw) => filter.apply(raw),
            Err(e) => {
                warn!("{}: detector failed on frame {}: {:#}", id, frame.number, e);
                Vec::new()
            }
        };
        let (states, drawn) = {
            let out = analyzer.process(frame.number, &boxes)?;
            (out.record.zone_states.clone(), out.boxes)
        };
        processed += 1;
        let publish = frame.number % every == 0 || frame.number == total;

        if let Some(mut image) = frame.image {
            let want_preview = spec.preview && publish;
            if sink.is_some() || want_preview {
                let totals = cumulative(&analyzer.aggregator().totals().lines);
                overlay.draw(&mut image, &states, &drawn, totals);
                if let Some(s) = sink.as_mut() {
                    s.write_frame(&image).context("encode frame")?;
                }
                if want_preview {
                    match preview_jpeg(&image, PREVIEW_WIDTH, PREVIEW_QUALITY) {
                        Ok(jpeg) => handle.set_preview(jpeg),
                        Err(e) => warn!("{}: preview failed: {:#}", id, e),
                    }
                }
            }
        }

        if publish {
            let msg = if total > 0 {
                format!("Processing frame {}/{}", frame.number, total)
            } else {
                format!("Processing frame {}", frame.number)
            };
            debug!("{}: {}", id, msg);
            handle.update(Stage::Processing, processing_percent(frame.number, total), msg)?;
        }
    }
    info!("{}: processed {} frame(s)", id, processed);

    handle.update(Stage::Converting, 88, "Finalizing output")?;
    analyzer.aggregator().verify_line_totals()?;
    if let Some(s) = sink {
        let path = s.finish().context("finalize video")?;
        run.output = Some(path.display().to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_mapping() {
        assert_eq!(processing_percent(0, 100), 10);
        assert_eq!(processing_percent(50, 100), 47);
        assert_eq!(processing_percent(100, 100), 85);
        assert_eq!(processing_percent(150, 100), 85);
        assert_eq!(processing_percent(7, 0), 10);
    }

    #[test]
    fn cumulative_sums_all_lines() {
        let c = cumulative(&[LineCounts { inbound: 2, outbound: 1 }, LineCounts { inbound: 0, outbound: 4 }]);
        assert_eq!(c, LineCounts { inbound: 2, outbound: 5 });
    }
}
