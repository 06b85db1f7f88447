use std::path::{Path, PathBuf};

use anyhow::{ensure, Context};
use clap::Parser;
use serde::Deserialize;

use crate::ai::{GeminiClient, GenerativeApi};
use crate::commands::{preview, print_dry_footer, read_text};
use crate::config::{ModelFamily, Settings};
use crate::reference::ReferenceImage;
use crate::session::create_session_directory;
use crate::studio::{ClipName, Studio, VideoJob};
use crate::video::{Ffmpeg, MediaTool};

const SCRIPT: &str = "shot_chain";

/// Generates a sequence of clips, each seeded with the previous clip's last frame.
#[derive(Parser)]
pub(crate) struct ShotChainArgs {
    /// YAML file with a `prompts` list
    #[arg(short, long)]
    file: PathBuf,
    /// Output directory
    #[arg(short, long = "out", visible_alias = "output")]
    out: Option<PathBuf>,
    /// Concatenate the clips into this file inside the session directory
    #[arg(long)]
    concat: Option<String>,
    /// Veo model id
    #[arg(short, long)]
    model: Option<String>,
    /// Show what would be generated without calling the API
    #[arg(long)]
    dry: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ShotList {
    #[serde(default)]
    prompts: Vec<String>,
}

fn load_prompts(path: &Path) -> anyhow::Result<Vec<String>> {
    let text = read_text(path)?;
    let list: ShotList = if text.trim().is_empty() {
        ShotList::default()
    } else {
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
    };
    ensure!(!list.prompts.is_empty(), "no prompts found in {}", path.display());
    Ok(list.prompts)
}

pub(crate) struct ChainOutcome {
    pub session_dir: PathBuf,
    pub clips: Vec<PathBuf>,
    pub joined: Option<PathBuf>,
}

pub(crate) async fn render<A: GenerativeApi, M: MediaTool>(
    studio: &Studio<'_, A, M>,
    prompts: &[String],
    model: &str,
    out_dir: &Path,
    concat: Option<&str>,
) -> anyhow::Result<ChainOutcome> {
    let first = prompts.first().map(String::as_str).unwrap_or("chain");
    let session_dir = create_session_directory(out_dir, SCRIPT, first)?;

    let mut last_frame: Option<ReferenceImage> = None;
    let mut clips = Vec::with_capacity(prompts.len());
    for (index, prompt) in prompts.iter().enumerate() {
        let sequence = index + 1;
        studio.pause_before(sequence).await;
        println!("🎬 Generating video {sequence}/{}: {}", prompts.len(), preview(prompt));
        let result = studio
            .generate_video(
                VideoJob::new(prompt, model, SCRIPT, out_dir)
                    .image(last_frame.as_ref())
                    .name(ClipName::Descriptive {
                        sequence: Some(sequence as u32),
                    })
                    .session(&session_dir),
            )
            .await
            .with_context(|| format!("shot {sequence} failed"))?;
        if let Some(thumbnail) = &result.thumbnail {
            last_frame = Some(ReferenceImage::from_file(thumbnail)?);
        }
        clips.push(result.path);
    }
    println!("✅ Completed {} clips -> {}", clips.len(), session_dir.display());

    let joined = match concat {
        Some(name) => {
            let target = studio
                .media()
                .concat(&clips, &session_dir.join(name))
                .await?;
            println!("🎬 Concatenated {} videos -> {}", clips.len(), target.display());
            Some(target)
        }
        None => None,
    };
    Ok(ChainOutcome {
        session_dir,
        clips,
        joined,
    })
}

pub(crate) async fn shot_chain(args: ShotChainArgs, settings: &Settings) -> anyhow::Result<()> {
    let prompts = load_prompts(&args.file)?;
    let model = ModelFamily::Veo.resolve(args.model.as_deref());
    let out_dir = settings.out_dir(args.out);

    if args.dry {
        println!("🔍 Dry run - shot chain with {} prompts:", prompts.len());
        for (index, prompt) in prompts.iter().enumerate() {
            println!("  Shot {}: {}", index + 1, preview(prompt));
        }
        println!("  • Model: {model}");
        if let Some(concat) = &args.concat {
            println!("  Would concatenate to: {concat}");
        }
        print_dry_footer();
        return Ok(());
    }

    let client = GeminiClient::from_env(settings)?;
    let media = Ffmpeg;
    let studio = Studio::new(&client, &media, settings);
    let outcome = render(&studio, &prompts, &model, &out_dir, args.concat.as_deref()).await?;
    if let Some(joined) = outcome.joined {
        println!("📁 Final video: {}", joined.display());
    }
    log::info!(
        "shot chain wrote {} clips to {}",
        outcome.clips.len(),
        outcome.session_dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionMetadata;
    use crate::testing::{quiet_settings, MockApi, MockMedia};
    use std::fs;

    #[test]
    fn prompts_come_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("chain.yaml");
        fs::write(&file, "prompts:\n  - a knight rides out\n  - the knight reaches the tower\n")
            .unwrap();
        assert_eq!(
            load_prompts(&file).unwrap(),
            vec!["a knight rides out", "the knight reaches the tower"]
        );

        fs::write(&file, "").unwrap();
        assert!(load_prompts(&file).is_err());
        fs::write(&file, "prompts: []\n").unwrap();
        assert!(load_prompts(&file).is_err());
    }

    #[tokio::test]
    async fn each_clip_starts_from_previous_last_frame() {
        let out = tempfile::tempdir().unwrap();
        let settings = quiet_settings(out.path());
        let (api, media) = (MockApi::default(), MockMedia::default());
        let studio = Studio::new(&api, &media, &settings);
        let prompts = vec!["first shot".to_owned(), "second shot".to_owned(), "third shot".to_owned()];

        let outcome = render(&studio, &prompts, "veo-2.0-generate-001", out.path(), Some("all.mp4"))
            .await
            .unwrap();

        let names: Vec<String> = outcome
            .clips
            .iter()
            .map(|clip| clip.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "01_first_shot_2.0-generate-001.mp4",
                "02_second_shot_2.0-generate-001.mp4",
                "03_third_shot_2.0-generate-001.mp4",
            ]
        );

        let submitted = api.videos.borrow();
        assert!(submitted[0].image.is_none());
        assert_eq!(submitted[1].image, Some(MockMedia::frame_bytes(&outcome.clips[0])));
        assert_eq!(submitted[2].image, Some(MockMedia::frame_bytes(&outcome.clips[1])));

        let joined = outcome.joined.unwrap();
        assert_eq!(joined, outcome.session_dir.join("all.mp4"));
        assert_eq!(media.concats.borrow()[0].0, outcome.clips);

        let metadata: SessionMetadata = serde_json::from_str(
            &fs::read_to_string(outcome.session_dir.join("metadata.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(metadata.files, names);
        assert_eq!(metadata.primary_prompt, "first shot");
        assert_eq!(metadata.current_prompt, "third shot");
    }

    #[tokio::test]
    async fn failed_clip_aborts_the_rest() {
        let out = tempfile::tempdir().unwrap();
        let settings = quiet_settings(out.path());
        let api = MockApi {
            fail_video_at: Some(2),
            ..Default::default()
        };
        let media = MockMedia::default();
        let studio = Studio::new(&api, &media, &settings);
        let prompts = vec!["one".to_owned(), "two".to_owned(), "three".to_owned()];

        let err = render(&studio, &prompts, "veo-2.0-generate-001", out.path(), Some("all.mp4"))
            .await
            .err()
            .unwrap();
        assert!(format!("{err:#}").contains("shot 2 failed"));
        assert_eq!(api.videos.borrow().len(), 2);
        assert!(media.concats.borrow().is_empty());
    }

    #[tokio::test]
    async fn missing_thumbnail_keeps_previous_reference() {
        let out = tempfile::tempdir().unwrap();
        let settings = quiet_settings(out.path());
        let api = MockApi::default();
        let media = MockMedia {
            fail_frames: true,
            ..Default::default()
        };
        let studio = Studio::new(&api, &media, &settings);
        let prompts = vec!["one".to_owned(), "two".to_owned()];

        render(&studio, &prompts, "veo-2.0-generate-001", out.path(), None)
            .await
            .unwrap();
        assert!(api.videos.borrow().iter().all(|video| video.image.is_none()));
    }
}
