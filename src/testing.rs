//! In-memory stand-ins for the remote API and ffmpeg.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::bail;

use crate::ai::{ContentPart, GeneratedImage, GeneratedVideo, GenerativeApi, Operation, VideoPrompt};
use crate::config::Settings;
use crate::video::MediaTool;

pub(crate) fn quiet_settings(out_root: &Path) -> Settings {
    Settings {
        out_root: out_root.to_path_buf(),
        poll_interval: Duration::ZERO,
        rate_limit_pause: Duration::ZERO,
        ..Settings::default()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SubmittedVideo {
    pub model: String,
    pub prompt: String,
    pub negative: String,
    pub image: Option<Vec<u8>>,
}

#[derive(Default)]
pub(crate) struct MockApi {
    pub videos: RefCell<Vec<SubmittedVideo>>,
    pub image_prompts: RefCell<Vec<String>>,
    pub content_prompts: RefCell<Vec<String>>,
    /// Image prompts answered with an error.
    pub failing_image_prompts: Vec<String>,
    /// 1-based submission that fails.
    pub fail_video_at: Option<usize>,
    pub operation_error: Option<String>,
    pub content_reply: String,
}

fn finished(name: &str, error: Option<String>) -> Operation {
    let videos = if error.is_some() {
        Vec::new()
    } else {
        vec![GeneratedVideo {
            uri: format!("mock://{name}"),
        }]
    };
    Operation {
        name: name.to_owned(),
        done: true,
        error,
        videos,
    }
}

impl GenerativeApi for MockApi {
    async fn generate_image(&self, model: &str, prompt: &str) -> anyhow::Result<Option<GeneratedImage>> {
        self.image_prompts.borrow_mut().push(prompt.to_owned());
        if self.failing_image_prompts.iter().any(|p| p == prompt) {
            bail!("{model} refused {prompt}");
        }
        Ok(Some(GeneratedImage {
            bytes: format!("image:{prompt}").into_bytes(),
            mime_type: "image/png".to_owned(),
        }))
    }

    async fn generate_video(&self, model: &str, request: &VideoPrompt<'_>) -> anyhow::Result<Operation> {
        let mut videos = self.videos.borrow_mut();
        videos.push(SubmittedVideo {
            model: model.to_owned(),
            prompt: request.prompt.to_owned(),
            negative: request.negative.to_owned(),
            image: request.image.map(|image| image.bytes.clone()),
        });
        if self.fail_video_at == Some(videos.len()) {
            bail!("submission {} rejected", videos.len());
        }
        Ok(Operation {
            name: format!("operations/{}", videos.len()),
            ..Default::default()
        })
    }

    async fn refresh_operation(&self, operation: &Operation) -> anyhow::Result<Operation> {
        Ok(finished(&operation.name, self.operation_error.clone()))
    }

    async fn get_operation(&self, name: &str) -> anyhow::Result<Operation> {
        Ok(finished(name, self.operation_error.clone()))
    }

    async fn download_video(&self, video: &GeneratedVideo, dest: &Path) -> anyhow::Result<()> {
        fs::write(dest, format!("video:{}", video.uri))?;
        Ok(())
    }

    async fn generate_content(
        &self,
        _model: &str,
        parts: &[ContentPart<'_>],
        _json_response: bool,
    ) -> anyhow::Result<String> {
        let text: Vec<&str> = parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(*text),
                ContentPart::Image(_) => None,
            })
            .collect();
        self.content_prompts.borrow_mut().push(text.join("\n"));
        Ok(self.content_reply.clone())
    }
}

/// Writes `frame:<clip name>` as the thumbnail of each clip.
#[derive(Default)]
pub(crate) struct MockMedia {
    pub fail_frames: bool,
    pub concats: RefCell<Vec<(Vec<PathBuf>, PathBuf)>>,
}

impl MockMedia {
    pub(crate) fn frame_bytes(clip: &Path) -> Vec<u8> {
        format!("frame:{}", clip.file_name().unwrap_or_default().to_string_lossy()).into_bytes()
    }
}

impl MediaTool for MockMedia {
    async fn extract_last_frame(&self, video: &Path, out_jpg: &Path) -> anyhow::Result<PathBuf> {
        if self.fail_frames {
            bail!("ffmpeg is required on PATH");
        }
        fs::write(out_jpg, Self::frame_bytes(video))?;
        Ok(out_jpg.to_path_buf())
    }

    async fn concat(&self, clips: &[PathBuf], out: &Path) -> anyhow::Result<PathBuf> {
        self.concats
            .borrow_mut()
            .push((clips.to_vec(), out.to_path_buf()));
        fs::write(out, b"joined")?;
        Ok(out.to_path_buf())
    }
}
