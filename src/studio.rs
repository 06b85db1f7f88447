use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::time::sleep;

use crate::ai::{GenerativeApi, VideoPrompt};
use crate::config::Settings;
use crate::naming::{stable_stem, video_filename};
use crate::poller::wait_for_operation;
use crate::reference::ReferenceImage;
use crate::session::{create_session_directory, merge_metadata};
use crate::video::MediaTool;

pub(crate) const DEFAULT_ASPECT_RATIO: &str = "16:9";

pub(crate) enum ClipName {
    /// `{NN_}{snippet}_{model}.mp4`
    Descriptive { sequence: Option<u32> },
    /// `{prefix}{hash of prompt + negative}.mp4`
    Stable { prefix: String },
}

pub(crate) struct VideoJob<'a> {
    pub prompt: &'a str,
    pub negative: &'a str,
    pub image: Option<&'a ReferenceImage>,
    pub model: &'a str,
    pub script: &'a str,
    pub name: ClipName,
    pub out_dir: &'a Path,
    /// Reuse an existing session instead of creating one for this clip.
    pub session_dir: Option<&'a Path>,
}

impl<'a> VideoJob<'a> {
    pub(crate) fn new(prompt: &'a str, model: &'a str, script: &'a str, out_dir: &'a Path) -> Self {
        Self {
            prompt,
            negative: "",
            image: None,
            model,
            script,
            name: ClipName::Descriptive { sequence: None },
            out_dir,
            session_dir: None,
        }
    }

    pub(crate) fn negative(mut self, negative: &'a str) -> Self {
        self.negative = negative;
        self
    }

    pub(crate) fn image(mut self, image: Option<&'a ReferenceImage>) -> Self {
        self.image = image;
        self
    }

    pub(crate) fn name(mut self, name: ClipName) -> Self {
        self.name = name;
        self
    }

    pub(crate) fn session(mut self, session_dir: &'a Path) -> Self {
        self.session_dir = Some(session_dir);
        self
    }

    fn filename(&self) -> String {
        match &self.name {
            ClipName::Descriptive { sequence } => video_filename(self.prompt, self.model, *sequence),
            ClipName::Stable { prefix } => {
                format!("{}.mp4", stable_stem(&format!("{}{}", self.prompt, self.negative), prefix))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct VideoResult {
    pub path: PathBuf,
    pub operation_name: String,
    pub prompt: String,
    pub negative: String,
    pub thumbnail: Option<PathBuf>,
    pub session_dir: PathBuf,
    pub metadata_file: PathBuf,
}

/// Generates clips against an API and post-processes them locally.
pub(crate) struct Studio<'a, A, M> {
    api: &'a A,
    media: &'a M,
    settings: &'a Settings,
}

impl<'a, A: GenerativeApi, M: MediaTool> Studio<'a, A, M> {
    pub(crate) fn new(api: &'a A, media: &'a M, settings: &'a Settings) -> Self {
        Self {
            api,
            media,
            settings,
        }
    }

    pub(crate) fn media(&self) -> &'a M {
        self.media
    }

    /// Sleeps the rate-limit pause before every request except the first (`index` is 1-based).
    pub(crate) async fn pause_before(&self, index: usize) {
        let pause = self.settings.rate_limit_pause;
        if index > 1 && !pause.is_zero() {
            println!("⏳ Waiting {} seconds to respect rate limits...", pause.as_secs());
            sleep(pause).await;
        }
    }

    pub(crate) async fn generate_video(&self, job: VideoJob<'_>) -> anyhow::Result<VideoResult> {
        let session_dir = match job.session_dir {
            Some(dir) => dir.to_path_buf(),
            None => create_session_directory(job.out_dir, job.script, job.prompt)?,
        };

        let request = VideoPrompt {
            prompt: job.prompt,
            negative: job.negative,
            image: job.image,
            aspect_ratio: DEFAULT_ASPECT_RATIO,
        };
        let operation = self
            .api
            .generate_video(job.model, &request)
            .await
            .with_context(|| format!("submitting video job to {}", job.model))?;
        let operation =
            wait_for_operation(self.api, operation, self.settings.poll_interval).await;
        let video = operation.first_video()?;

        let filename = job.filename();
        let dest = session_dir.join(&filename);
        self.api.download_video(video, &dest).await?;
        let thumbnail = self.thumbnail(&dest).await;

        let metadata_file = merge_metadata(
            &session_dir,
            job.script,
            job.prompt,
            job.negative,
            job.model,
            &[filename],
        )?;

        Ok(VideoResult {
            path: dest,
            operation_name: operation.name,
            prompt: job.prompt.to_owned(),
            negative: job.negative.to_owned(),
            thumbnail,
            session_dir,
            metadata_file,
        })
    }

    /// `<clip>.last.jpg`, or `None` when extraction fails.
    async fn thumbnail(&self, clip: &Path) -> Option<PathBuf> {
        let out = clip.with_extension("last.jpg");
        match self.media.extract_last_frame(clip, &out).await {
            Ok(path) => Some(path),
            Err(err) => {
                log::warn!("no thumbnail for {}: {err:#}", clip.display());
                None
            }
        }
    }
}
