use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{ensure, Context};
use tokio::process::Command;

/// Local post-processing of downloaded clips.
pub(crate) trait MediaTool {
    /// Writes a still of the clip's final second to `out_jpg`.
    async fn extract_last_frame(&self, video: &Path, out_jpg: &Path) -> anyhow::Result<PathBuf>;

    /// Joins `clips` into `out` without re-encoding.
    async fn concat(&self, clips: &[PathBuf], out: &Path) -> anyhow::Result<PathBuf>;
}

/// `ffmpeg` found on `PATH`.
pub(crate) struct Ffmpeg;

pub(crate) async fn ensure_ffmpeg() -> anyhow::Result<()> {
    let probe = Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match probe {
        Ok(status) if status.success() => Ok(()),
        _ => anyhow::bail!("ffmpeg is required on PATH"),
    }
}

async fn run_ffmpeg(mut cmd: Command) -> anyhow::Result<()> {
    log::debug!("running {:?}", cmd.as_std());
    let output = cmd.output().await.context("spawning ffmpeg")?;
    ensure!(
        output.status.success(),
        "ffmpeg exited with {}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
    );
    Ok(())
}

/// One `file '...'` line per clip, with single quotes escaped for the concat demuxer.
fn concat_list(clips: &[PathBuf]) -> String {
    clips
        .iter()
        .map(|clip| {
            let path = clip.to_string_lossy().replace('\\', "/").replace('\'', r"'\''");
            format!("file '{path}'\n")
        })
        .collect()
}

impl MediaTool for Ffmpeg {
    async fn extract_last_frame(&self, video: &Path, out_jpg: &Path) -> anyhow::Result<PathBuf> {
        ensure_ffmpeg().await?;
        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-sseof")
            .arg("-1")
            .arg("-i")
            .arg(video)
            .arg("-frames:v")
            .arg("1")
            .arg(out_jpg)
            .arg("-y")
            .arg("-loglevel")
            .arg("error");
        run_ffmpeg(cmd)
            .await
            .with_context(|| format!("extracting last frame of {}", video.display()))?;
        Ok(out_jpg.to_path_buf())
    }

    async fn concat(&self, clips: &[PathBuf], out: &Path) -> anyhow::Result<PathBuf> {
        ensure!(!clips.is_empty(), "nothing to concatenate");
        ensure_ffmpeg().await?;
        let absolute = clips
            .iter()
            .map(|clip| {
                std::fs::canonicalize(clip).with_context(|| format!("resolving {}", clip.display()))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut list = tempfile::Builder::new()
            .prefix("concat-")
            .suffix(".txt")
            .tempfile()?;
        list.write_all(concat_list(&absolute).as_bytes())?;
        list.flush()?;

        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-f")
            .arg("concat")
            .arg("-safe")
            .arg("0")
            .arg("-i")
            .arg(list.path())
            .arg("-c")
            .arg("copy")
            .arg(out)
            .arg("-y")
            .arg("-loglevel")
            .arg("error");
        run_ffmpeg(cmd).await.with_context(|| {
            format!("concatenating {} clips into {}", clips.len(), out.display())
        })?;
        Ok(out.to_path_buf())
    }
}
