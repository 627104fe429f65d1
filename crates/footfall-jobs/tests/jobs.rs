use footfall_analytics::{CountingLine, CrossingConfig, InputError, Zone};
use footfall_geom::{BoundingBox, Point};
use footfall_jobs::{JobInputs, JobManager, JobSpec, ReportError};
use footfall_proto::progress::Stage;
use footfall_vision::{Detector, Frame, FrameSink, FrameSource, SyntheticSource, VideoInfo};
use image::RgbImage;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn whole() -> Vec<Point> {
    vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(1.0, 1.0), Point::new(0.0, 1.0)]
}

fn door() -> CountingLine {
    CountingLine::new("door", Point::new(0.0, 0.5), Point::new(1.0, 0.5))
}

fn spec() -> JobSpec {
    let mut spec = JobSpec::new(vec![Zone::occupancy("floor", whole(), 0.2)], vec![door()]);
    spec.crossing = CrossingConfig::with_max_distance(0.2);
    spec.report_every_n_frames = 2;
    spec
}

fn person(y: f32) -> BoundingBox {
    BoundingBox::new(0.45, y - 0.05, 0.55, y + 0.05, 0.9)
}

/// One subject walking down through the door over frames 1..=4.
fn walker() -> Box<dyn Detector> {
    let ys = [0.4f32, 0.45, 0.55, 0.6];
    Box::new(move |f: &Frame| -> anyhow::Result<Vec<BoundingBox>> {
        Ok(ys.get((f.number - 1) as usize).map(|&y| vec![person(y)]).unwrap_or_default())
    })
}

fn synthetic(frames: u64) -> Box<dyn FrameSource> {
    Box::new(SyntheticSource::new(frames, 10.0))
}

#[tokio::test]
async fn replayed_job_completes_with_reports() {
    let mgr = JobManager::new();
    let id = mgr.start_job(spec(), JobInputs::new(|| Ok(walker()), || Ok(synthetic(6)))).unwrap();

    let st = mgr.wait(id).await.unwrap();
    assert_eq!(st.stage, Stage::Complete, "{}", st.message);
    assert_eq!(st.percent, 100);
    assert_eq!(st.result, None);

    let bundle = mgr.report(id).unwrap();
    assert_eq!(bundle.csv.lines().count(), 7);
    let v: serde_json::Value = serde_json::from_str(&bundle.json).unwrap();
    assert_eq!(v["video_info"]["total_frames"], 6);
    assert_eq!(v["summary"]["line_stats"]["door"]["out"], 1);
    assert_eq!(v["summary"]["line_stats"]["door"]["in"], 0);
    assert_eq!(v["frames"][2]["line_counts"]["door"]["out"], 1);
    assert_eq!(v["frames"][4]["zone_counts"]["floor"], 0);
    assert_eq!(v["summary"]["line_stats"]["door"]["events"][0]["frame"], 3);
}

#[tokio::test]
async fn detector_failure_records_an_empty_frame() {
    let mgr = JobManager::new();
    let detector = || -> anyhow::Result<Box<dyn Detector>> {
        Ok(Box::new(|f: &Frame| -> anyhow::Result<Vec<BoundingBox>> {
            anyhow::ensure!(f.number != 2, "model hiccup");
            Ok(vec![person(0.2)])
        }))
    };
    let id = mgr.start_job(spec(), JobInputs::new(detector, || Ok(synthetic(3)))).unwrap();
    assert_eq!(mgr.wait(id).await.unwrap().stage, Stage::Complete);

    let v: serde_json::Value = serde_json::from_str(&mgr.report(id).unwrap().json).unwrap();
    let per_frame: Vec<u64> = (0..3).map(|i| v["frames"][i]["total_detections"].as_u64().unwrap()).collect();
    assert_eq!(per_frame, vec![1, 0, 1]);
}

#[tokio::test]
async fn bad_geometry_is_refused_before_any_job_exists() {
    let mgr = JobManager::new();
    let spec = JobSpec::new(vec![Zone::presence("tri", vec![Point::new(0.1, 0.1), Point::new(0.2, 0.2)])], vec![]);
    let err = mgr.start_job(spec, JobInputs::new(|| Ok(walker()), || Ok(synthetic(1)))).unwrap_err();
    assert_eq!(err, InputError::TooFewVertices { zone: "tri".into(), got: 2 });
    assert!(mgr.progress_store().is_empty());
}

#[tokio::test]
async fn open_failure_leaves_no_report() {
    let mgr = JobManager::new();
    let source = || -> anyhow::Result<Box<dyn FrameSource>> { anyhow::bail!("no such file") };
    let id = mgr.start_job(spec(), JobInputs::new(|| Ok(walker()), source)).unwrap();

    let st = mgr.wait(id).await.unwrap();
    assert_eq!(st.stage, Stage::Error);
    assert!(st.message.contains("open video") && st.message.contains("no such file"), "{}", st.message);
    assert_eq!(mgr.report(id).unwrap_err(), ReportError::NotReady { job: id, stage: Stage::Error });
    assert_eq!(mgr.partial_report(id).unwrap_err(), ReportError::NoFrames { job: id });
}

struct DyingSource {
    info: VideoInfo,
    next: u64,
}

impl FrameSource for DyingSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> anyhow::Result<Option<Frame>> {
        anyhow::ensure!(self.next <= 2, "disk gone");
        let f = Frame { number: self.next, image: None };
        self.next += 1;
        Ok(Some(f))
    }
}

#[tokio::test]
async fn decode_failure_after_frames_keeps_a_partial_report() {
    let mgr = JobManager::new();
    let source = || -> anyhow::Result<Box<dyn FrameSource>> {
        let info = VideoInfo { width: 0, height: 0, fps: Some(10.0), total_frames: Some(10) };
        Ok(Box::new(DyingSource { info, next: 1 }))
    };
    let id = mgr.start_job(spec(), JobInputs::new(|| Ok(walker()), source)).unwrap();

    let st = mgr.wait(id).await.unwrap();
    assert_eq!(st.stage, Stage::Error);
    assert!(st.message.contains("disk gone"), "{}", st.message);
    let partial = mgr.partial_report(id).unwrap();
    assert_eq!(partial.csv.lines().count(), 3);
    assert!(matches!(mgr.report(id), Err(ReportError::NotReady { .. })));
}

#[tokio::test]
async fn cancel_stops_between_frames() {
    let mgr = JobManager::new();
    let (tx, rx) = tokio::sync::oneshot::channel();
    let mut tx = Some(tx);
    let detector = move || -> anyhow::Result<Box<dyn Detector>> {
        Ok(Box::new(move |f: &Frame| -> anyhow::Result<Vec<BoundingBox>> {
            if f.number == 3 {
                if let Some(t) = tx.take() {
                    let _ = t.send(());
                }
            }
            std::thread::sleep(Duration::from_millis(1));
            Ok(vec![])
        }))
    };
    let id = mgr.start_job(spec(), JobInputs::new(detector, || Ok(synthetic(u64::MAX)))).unwrap();

    rx.await.unwrap();
    assert!(mgr.cancel(id));
    let st = mgr.wait(id).await.unwrap();
    assert_eq!(st.stage, Stage::Cancelled);
    assert!(mgr.partial_report(id).unwrap().csv.lines().count() >= 4);
}

#[tokio::test]
async fn progress_never_goes_backwards() {
    let mgr = JobManager::new();
    let id = mgr.start_job(spec(), JobInputs::new(|| Ok(walker()), || Ok(synthetic(40)))).unwrap();

    let mut rx = mgr.progress_store().subscribe(id).unwrap();
    let mut seen = vec![rx.borrow_and_update().clone()];
    while !seen.last().unwrap().stage.is_terminal() {
        rx.changed().await.unwrap();
        seen.push(rx.borrow_and_update().clone());
    }
    for w in seen.windows(2) {
        assert!(w[0].stage.rank() <= w[1].stage.rank(), "{:?}", seen);
        assert!(w[0].percent <= w[1].percent, "{:?}", seen);
    }
    assert_eq!(seen.last().unwrap().stage, Stage::Complete);
}

#[tokio::test]
async fn sweep_forgets_finished_jobs() {
    let mgr = JobManager::new();
    let id = mgr.start_job(spec(), JobInputs::new(|| Ok(walker()), || Ok(synthetic(2)))).unwrap();
    mgr.wait(id).await.unwrap();

    assert_eq!(mgr.sweep(Duration::from_secs(3600)), 0);
    assert_eq!(mgr.sweep(Duration::ZERO), 1);
    assert!(mgr.progress(id).is_none());
    assert_eq!(mgr.report(id).unwrap_err(), ReportError::UnknownJob(id));
}

struct PixelSource {
    info: VideoInfo,
    next: u64,
}

impl FrameSource for PixelSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> anyhow::Result<Option<Frame>> {
        if self.next > 4 {
            return Ok(None);
        }
        let f = Frame { number: self.next, image: Some(RgbImage::new(self.info.width, self.info.height)) };
        self.next += 1;
        Ok(Some(f))
    }
}

struct MemorySink {
    frames: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl FrameSink for MemorySink {
    fn write_frame(&mut self, image: &RgbImage) -> anyhow::Result<()> {
        self.frames.lock().unwrap().push(image.dimensions());
        Ok(())
    }

    fn finish(self: Box<Self>) -> anyhow::Result<PathBuf> {
        Ok(PathBuf::from("mem/annotated.mp4"))
    }
}

#[tokio::test]
async fn annotated_frames_reach_the_sink() {
    let mgr = JobManager::new();
    let frames = Arc::new(Mutex::new(vec![]));
    let opened_fps = Arc::new(Mutex::new(None));

    let source = || -> anyhow::Result<Box<dyn FrameSource>> {
        let info = VideoInfo { width: 64, height: 48, fps: None, total_frames: Some(4) };
        Ok(Box::new(PixelSource { info, next: 1 }))
    };
    let (sink_frames, sink_fps) = (frames.clone(), opened_fps.clone());
    let inputs = JobInputs::new(|| Ok(walker()), source).with_sink(move |_info: &VideoInfo, fps: f64| {
        *sink_fps.lock().unwrap() = Some(fps);
        Ok(Box::new(MemorySink { frames: sink_frames }) as Box<dyn FrameSink>)
    });
    let id = mgr.start_job(spec(), inputs).unwrap();

    let st = mgr.wait(id).await.unwrap();
    assert_eq!(st.stage, Stage::Complete, "{}", st.message);
    assert_eq!(st.result.as_deref(), Some("mem/annotated.mp4"));
    assert_eq!(*frames.lock().unwrap(), vec![(64, 48); 4]);
    assert_eq!(*opened_fps.lock().unwrap(), Some(30.0));
    assert!(mgr.preview(id).is_none());

    let v: serde_json::Value = serde_json::from_str(&mgr.report(id).unwrap().json).unwrap();
    assert_eq!(v["video_info"]["fps"], 30.0);
}
