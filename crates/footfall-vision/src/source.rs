use anyhow::{Context, Result};
use image::RgbImage;
use serde::Deserialize;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};
use tracing::{debug, warn};

use crate::Frame;

/// External decoder/encoder executables.
#[derive(Debug, Clone, Deserialize)]
pub struct FfmpegTools {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,
}

fn default_ffmpeg() -> String {
    "ffmpeg".into()
}

fn default_ffprobe() -> String {
    "ffprobe".into()
}

impl Default for FfmpegTools {
    fn default() -> Self {
        Self { ffmpeg: default_ffmpeg(), ffprobe: default_ffprobe() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    /// `None` when the container does not report a usable rate.
    pub fps: Option<f64>,
    /// `None` when the container does not report a frame count.
    pub total_frames: Option<u64>,
}

/// Yields frames in decode order, numbered from 1.
pub trait FrameSource: Send {
    fn info(&self) -> &VideoInfo;
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
}

/// `"30000/1001"` or `"25"`; zero or malformed rates yield `None`.
fn parse_rate(s: &str) -> Option<f64> {
    let rate = match s.split_once('/') {
        Some((n, d)) => {
            let n: f64 = n.trim().parse().ok()?;
            let d: f64 = d.trim().parse().ok()?;
            if d == 0.0 {
                return None;
            }
            n / d
        }
        None => s.trim().parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

fn parse_probe(json: &[u8]) -> Result<VideoInfo> {
    let out: ProbeOutput = serde_json::from_slice(json).context("parse ffprobe output")?;
    let s = out.streams.into_iter().next().context("no video stream")?;
    let width = s.width.context("video stream has no width")?;
    let height = s.height.context("video stream has no height")?;
    anyhow::ensure!(width > 0 && height > 0, "video stream has zero size");
    let fps = s
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| s.r_frame_rate.as_deref().and_then(parse_rate));
    let total_frames = s.nb_frames.as_deref().and_then(|n| n.parse().ok()).filter(|n| *n > 0);
    Ok(VideoInfo { width, height, fps, total_frames })
}

pub fn probe(path: &Path, tools: &FfmpegTools) -> Result<VideoInfo> {
    let out = Command::new(&tools.ffprobe)
        .args(["-v", "error", "-select_streams", "v:0"])
        .args(["-show_entries", "stream=width,height,avg_frame_rate,r_frame_rate,nb_frames"])
        .args(["-of", "json"])
        .arg(path)
        .output()
        .with_context(|| format!("run {}", tools.ffprobe))?;
    anyhow::ensure!(out.status.success(), "ffprobe failed: {}", String::from_utf8_lossy(&out.stderr).trim());
    parse_probe(&out.stdout)
}

/// Decodes a video by piping raw RGB24 frames out of ffmpeg.
pub struct FfmpegSource {
    info: VideoInfo,
    child: Child,
    stdout: ChildStdout,
    next: u64,
}

impl FfmpegSource {
    pub fn open(path: &Path, tools: &FfmpegTools) -> Result<Self> {
        let info = probe(path, tools).with_context(|| format!("probe {}", path.display()))?;
        debug!("decode: {} {}x{} fps={:?} frames={:?}", path.display(), info.width, info.height, info.fps, info.total_frames);

        let mut child = Command::new(&tools.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-i"])
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("spawn {}", tools.ffmpeg))?;
        let stdout = child.stdout.take().context("ffmpeg stdout not captured")?;
        Ok(Self { info, child, stdout, next: 1 })
    }
}

impl FrameSource for FfmpegSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let len = self.info.width as usize * self.info.height as usize * 3;
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            match self.stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context("read decoded frame"),
            }
        }
        if filled == 0 {
            let status = self.child.wait().context("wait for ffmpeg")?;
            anyhow::ensure!(status.success(), "ffmpeg decode exited with {}", status);
            return Ok(None);
        }
        if filled < len {
            warn!("decode: truncated frame {} ({} of {} bytes), stopping", self.next, filled, len);
            return Ok(None);
        }

        let image = RgbImage::from_raw(self.info.width, self.info.height, buf).context("frame buffer size")?;
        let frame = Frame { number: self.next, image: Some(image) };
        self.next += 1;
        Ok(Some(frame))
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Pixel-less frames of a fixed count, for replay-driven runs.
pub struct SyntheticSource {
    info: VideoInfo,
    next: u64,
}

impl SyntheticSource {
    pub fn new(total_frames: u64, fps: f64) -> Self {
        let info = VideoInfo { width: 0, height: 0, fps: Some(fps), total_frames: Some(total_frames) };
        Self { info, next: 1 }
    }
}

impl FrameSource for SyntheticSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.next > self.info.total_frames.unwrap_or(0) {
            return Ok(None);
        }
        let frame = Frame { number: self.next, image: None };
        self.next += 1;
        Ok(Some(frame))
    }
}
