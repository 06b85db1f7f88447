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

const SCRIPT: &str = "storyboard";

/// Renders the shots of a JSON storyboard into one session.
#[derive(Parser)]
pub(crate) struct StoryboardArgs {
    /// JSON storyboard with a `shots` list
    #[arg(short, long)]
    storyboard: PathBuf,
    /// Output directory
    #[arg(short, long = "out", visible_alias = "output")]
    out: Option<PathBuf>,
    /// Stitch the shots into this file; relative paths land in the session directory
    #[arg(long)]
    concat: Option<PathBuf>,
    /// Veo model id
    #[arg(short, long)]
    model: Option<String>,
    /// Show what would be generated without calling the API
    #[arg(long)]
    dry: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Storyboard {
    #[serde(default)]
    pub shots: Vec<Shot>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Shot {
    pub prompt: String,
    #[serde(default)]
    pub negative: String,
    /// Seed this shot with the previous shot's last frame.
    #[serde(default)]
    pub carry_last_frame: bool,
    /// Explicit reference image; wins over a carried frame.
    #[serde(default)]
    pub image: Option<PathBuf>,
}

impl Storyboard {
    pub(crate) fn load(path: &Path) -> anyhow::Result<Self> {
        let board: Self = serde_json::from_str(&read_text(path)?)
            .with_context(|| format!("parsing storyboard {}", path.display()))?;
        ensure!(!board.shots.is_empty(), "no shots found in {}", path.display());
        Ok(board)
    }
}

pub(crate) struct BoardOutcome {
    pub session_dir: PathBuf,
    pub clips: Vec<PathBuf>,
    pub stitched: Option<PathBuf>,
}

fn stitch_target(session_dir: &Path, concat: &Path) -> PathBuf {
    if concat.is_absolute() {
        return concat.to_path_buf();
    }
    match concat.file_name() {
        Some(name) => session_dir.join(name),
        None => session_dir.join(concat),
    }
}

pub(crate) async fn render<A: GenerativeApi, M: MediaTool>(
    studio: &Studio<'_, A, M>,
    board: &Storyboard,
    model: &str,
    out_dir: &Path,
    concat: Option<&Path>,
) -> anyhow::Result<BoardOutcome> {
    let first = board
        .shots
        .first()
        .map(|shot| shot.prompt.as_str())
        .unwrap_or(SCRIPT);
    let session_dir = create_session_directory(out_dir, SCRIPT, first)?;

    let mut last_frame: Option<ReferenceImage> = None;
    let mut clips = Vec::with_capacity(board.shots.len());
    for (index, shot) in board.shots.iter().enumerate() {
        let sequence = index + 1;
        studio.pause_before(sequence).await;

        let explicit = shot
            .image
            .as_deref()
            .map(ReferenceImage::from_file)
            .transpose()?;
        let reference = match (&explicit, shot.carry_last_frame) {
            (Some(image), _) => Some(image),
            (None, true) => last_frame.as_ref(),
            (None, false) => None,
        };

        println!("🎬 Generating shot {sequence}/{}: {}", board.shots.len(), preview(&shot.prompt));
        let result = studio
            .generate_video(
                VideoJob::new(&shot.prompt, model, SCRIPT, out_dir)
                    .negative(&shot.negative)
                    .image(reference)
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
    println!("rendered {} shots", clips.len());

    let stitched = match concat {
        Some(concat) => {
            let target = studio
                .media()
                .concat(&clips, &stitch_target(&session_dir, concat))
                .await?;
            println!("stitched -> {}", target.display());
            Some(target)
        }
        None => None,
    };
    Ok(BoardOutcome {
        session_dir,
        clips,
        stitched,
    })
}

pub(crate) async fn storyboard(args: StoryboardArgs, settings: &Settings) -> anyhow::Result<()> {
    let board = Storyboard::load(&args.storyboard)?;
    let model = ModelFamily::Veo.resolve(args.model.as_deref());
    let out_dir = settings.out_dir(args.out);

    if args.dry {
        println!("🔍 Dry run - storyboard with {} shots:", board.shots.len());
        for (index, shot) in board.shots.iter().enumerate() {
            let mut notes = Vec::new();
            if shot.carry_last_frame {
                notes.push("carries last frame".to_owned());
            }
            if let Some(image) = &shot.image {
                notes.push(format!("image {}", image.display()));
            }
            if notes.is_empty() {
                println!("  Shot {}: {}", index + 1, preview(&shot.prompt));
            } else {
                println!("  Shot {}: {} ({})", index + 1, preview(&shot.prompt), notes.join(", "));
            }
        }
        println!("  • Model: {model}");
        println!("  • Output directory: {}", out_dir.display());
        if let Some(concat) = &args.concat {
            println!("  Would stitch to: {}", concat.display());
        }
        print_dry_footer();
        return Ok(());
    }

    let client = GeminiClient::from_env(settings)?;
    let media = Ffmpeg;
    let studio = Studio::new(&client, &media, settings);
    let outcome = render(&studio, &board, &model, &out_dir, args.concat.as_deref()).await?;
    log::info!(
        "storyboard: {} clips in {} (stitched: {})",
        outcome.clips.len(),
        outcome.session_dir.display(),
        outcome.stitched.is_some()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{quiet_settings, MockApi, MockMedia};
    use std::fs;

    fn board(json: &str) -> Storyboard {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn carried_frame_is_previous_thumbnail() {
        let out = tempfile::tempdir().unwrap();
        let settings = quiet_settings(out.path());
        let (api, media) = (MockApi::default(), MockMedia::default());
        let studio = Studio::new(&api, &media, &settings);
        let board = board(
            r#"{"shots": [
                {"prompt": "a lighthouse at dawn"},
                {"prompt": "the lamp flickers on", "carry_last_frame": true, "negative": "people"},
                {"prompt": "storm rolls in"}
            ]}"#,
        );

        let outcome = render(&studio, &board, "veo-2.0-generate-001", out.path(), None)
            .await
            .unwrap();
        assert_eq!(outcome.clips.len(), 3);
        assert!(outcome.stitched.is_none());

        let submitted = api.videos.borrow();
        assert!(submitted[0].image.is_none());
        let first_thumbnail = fs::read(outcome.clips[0].with_extension("last.jpg")).unwrap();
        assert_eq!(submitted[1].image.as_ref(), Some(&first_thumbnail));
        assert_eq!(submitted[1].negative, "people");
        assert!(submitted[2].image.is_none());
    }

    #[tokio::test]
    async fn explicit_image_overrides_carry() {
        let out = tempfile::tempdir().unwrap();
        let still = out.path().join("still.png");
        fs::write(&still, b"explicit").unwrap();
        let settings = quiet_settings(out.path());
        let (api, media) = (MockApi::default(), MockMedia::default());
        let studio = Studio::new(&api, &media, &settings);
        let board = Storyboard {
            shots: vec![
                Shot {
                    prompt: "opening".to_owned(),
                    negative: String::new(),
                    carry_last_frame: false,
                    image: None,
                },
                Shot {
                    prompt: "follow up".to_owned(),
                    negative: String::new(),
                    carry_last_frame: true,
                    image: Some(still.clone()),
                },
            ],
        };

        let outcome = render(
            &studio,
            &board,
            "veo-2.0-generate-001",
            out.path(),
            Some(Path::new("nested/cut.mp4")),
        )
        .await
        .unwrap();
        assert_eq!(api.videos.borrow()[1].image.as_deref(), Some(&b"explicit"[..]));
        assert_eq!(outcome.stitched.unwrap(), outcome.session_dir.join("cut.mp4"));
    }

    #[test]
    fn stitch_target_keeps_absolute_paths() {
        let session = Path::new("/out/2025-01-01/session");
        assert_eq!(stitch_target(session, Path::new("/tmp/final.mp4")), PathBuf::from("/tmp/final.mp4"));
        assert_eq!(stitch_target(session, Path::new("final.mp4")), session.join("final.mp4"));
    }

    #[test]
    fn empty_storyboard_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.json");
        fs::write(&path, r#"{"shots": []}"#).unwrap();
        assert!(Storyboard::load(&path).is_err());
        fs::write(&path, r#"{"shots": [{"negative": "no prompt"}]}"#).unwrap();
        assert!(Storyboard::load(&path).is_err());
    }
}
