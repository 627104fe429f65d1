use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use tracing::{debug, error};

use crate::source::FfmpegTools;

/// Consumes annotated frames in order and finalizes an output artifact.
pub trait FrameSink: Send {
    fn write_frame(&mut self, image: &RgbImage) -> Result<()>;
    /// Flushes and closes; returns where the output ended up.
    fn finish(self: Box<Self>) -> Result<PathBuf>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncoderSettings {
    #[serde(default = "default_crf")]
    pub crf: u8,
    #[serde(default = "default_preset")]
    pub preset: String,
}

fn default_crf() -> u8 {
    18
}

fn default_preset() -> String {
    "medium".into()
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self { crf: default_crf(), preset: default_preset() }
    }
}

/// H.264 encoder fed raw RGB24 frames over a pipe.
pub struct FfmpegEncoder {
    path: PathBuf,
    width: u32,
    height: u32,
    child: Child,
    stdin: Option<ChildStdin>,
}

fn encoder_args(path: &Path, width: u32, height: u32, fps: f64, settings: &EncoderSettings) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-y"].iter().map(|s| s.to_string()).collect();
    args.extend(["-f", "rawvideo", "-pix_fmt", "rgb24"].iter().map(|s| s.to_string()));
    args.extend(["-s".to_string(), format!("{}x{}", width, height)]);
    args.extend(["-r".to_string(), format!("{}", fps)]);
    args.extend(["-i", "-"].iter().map(|s| s.to_string()));
    // yuv420p needs even dimensions; odd sources gain one black row or column
    args.extend(["-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2", "-c:v", "libx264"].iter().map(|s| s.to_string()));
    args.extend(["-preset".to_string(), settings.preset.clone()]);
    args.extend(["-crf".to_string(), settings.crf.to_string()]);
    args.extend(["-pix_fmt", "yuv420p", "-movflags", "+faststart"].iter().map(|s| s.to_string()));
    args.push(path.display().to_string());
    args
}

impl FfmpegEncoder {
    pub fn create(path: &Path, width: u32, height: u32, fps: f64, tools: &FfmpegTools, settings: &EncoderSettings) -> Result<Self> {
        anyhow::ensure!(width > 0 && height > 0, "cannot encode {}x{} frames", width, height);

        debug!("encode: {} {}x{} @ {} fps", path.display(), width, height, fps);
        let mut child = Command::new(&tools.ffmpeg)
            .args(encoder_args(path, width, height, fps, settings))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("spawn {}", tools.ffmpeg))?;
        let stdin = child.stdin.take().context("ffmpeg stdin not captured")?;
        Ok(Self { path: path.to_path_buf(), width, height, child, stdin: Some(stdin) })
    }
}

impl FrameSink for FfmpegEncoder {
    fn write_frame(&mut self, image: &RgbImage) -> Result<()> {
        anyhow::ensure!(
            image.dimensions() == (self.width, self.height),
            "frame is {:?}, encoder expects {}x{}",
            image.dimensions(),
            self.width,
            self.height
        );
        let stdin = self.stdin.as_mut().context("encoder already closed")?;
        stdin.write_all(image.as_raw()).context("write frame to ffmpeg")
    }

    fn finish(mut self: Box<Self>) -> Result<PathBuf> {
        drop(self.stdin.take());
        let status = self.child.wait().context("wait for ffmpeg")?;
        if !status.success() {
            error!("encode: ffmpeg exited with {}", status);
            anyhow::bail!("ffmpeg encode exited with {}", status);
        }
        Ok(self.path.clone())
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if self.stdin.take().is_some() {
            // abandoned mid-stream
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Downscaled JPEG of a frame for live previews.
pub fn preview_jpeg(image: &RgbImage, max_width: u32, quality: u8) -> Result<Vec<u8>> {
    let (w, h) = image.dimensions();
    let mut buf = Vec::new();
    if w > max_width && max_width > 0 {
        let nh = ((h as u64 * max_width as u64) / w as u64).max(1) as u32;
        let small = imageops::resize(image, max_width, nh, FilterType::Triangle);
        JpegEncoder::new_with_quality(&mut buf, quality).encode_image(&small).context("encode preview")?;
    } else {
        JpegEncoder::new_with_quality(&mut buf, quality).encode_image(image).context("encode preview")?;
    }
    Ok(buf)
}
