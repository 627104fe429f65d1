use anyhow::{Context, Result};
use std::process::{Command, Stdio};

use crate::source::FfmpegTools;

fn check_tool(name: &str) -> Result<String> {
    let out = Command::new(name)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("{} not runnable", name))?;
    anyhow::ensure!(out.status.success(), "{} -version failed", name);
    let banner = String::from_utf8_lossy(&out.stdout);
    Ok(banner.lines().next().unwrap_or_default().to_string())
}

/// Confirms the decoder and encoder executables start; returns their banners.
pub fn check_ffmpeg(tools: &FfmpegTools) -> Result<Vec<String>> {
    Ok(vec![check_tool(&tools.ffmpeg)?, check_tool(&tools.ffprobe)?])
}
