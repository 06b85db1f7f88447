use std::path::{Path, PathBuf};

use anyhow::ensure;
use clap::Parser;

use crate::ai::{GeminiClient, GenerativeApi};
use crate::commands::{preview, print_dry_footer, read_text};
use crate::config::{ModelFamily, Settings};
use crate::reference::{list_reference_images, ReferenceImage};
use crate::studio::{ClipName, Studio, VideoJob, VideoResult};
use crate::video::{Ffmpeg, MediaTool};

const SCRIPT: &str = "ref_images";

/// Renders one scene once per reference image in a directory.
#[derive(Parser)]
pub(crate) struct RefImagesArgs {
    /// Directory of .jpg/.jpeg/.png reference images
    #[arg(long)]
    ref_dir: PathBuf,
    /// Text file with the scene prompt
    #[arg(long)]
    scene: PathBuf,
    /// Output directory
    #[arg(short, long = "out", visible_alias = "output")]
    out: Option<PathBuf>,
    /// Veo model id
    #[arg(short, long)]
    model: Option<String>,
    /// Show what would be generated without calling the API
    #[arg(long)]
    dry: bool,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned()
}

pub(crate) async fn render<A: GenerativeApi, M: MediaTool>(
    studio: &Studio<'_, A, M>,
    scene: &str,
    images: &[PathBuf],
    model: &str,
    out_dir: &Path,
) -> anyhow::Result<Vec<VideoResult>> {
    let mut results = Vec::with_capacity(images.len());
    for (index, path) in images.iter().enumerate() {
        let sequence = index + 1;
        studio.pause_before(sequence).await;
        println!(
            "🎬 Generating video {sequence}/{} with reference: {}",
            images.len(),
            file_name(path)
        );
        let reference = ReferenceImage::from_file(path)?;
        let result = studio
            .generate_video(
                VideoJob::new(scene, model, SCRIPT, out_dir)
                    .image(Some(&reference))
                    .name(ClipName::Stable {
                        prefix: format!("ref{sequence:03}-"),
                    }),
            )
            .await?;
        println!("✅ {} -> {}", file_name(path), file_name(&result.path));
        results.push(result);
    }
    Ok(results)
}

pub(crate) async fn ref_images(args: RefImagesArgs, settings: &Settings) -> anyhow::Result<()> {
    let scene = read_text(&args.scene)?.trim().to_owned();
    let images = list_reference_images(&args.ref_dir)?;
    ensure!(!images.is_empty(), "no images found in {}", args.ref_dir.display());
    let model = ModelFamily::Veo.resolve(args.model.as_deref());
    let out_dir = settings.out_dir(args.out);

    if args.dry {
        println!("🔍 Dry run - ref image lab with {} reference images:", images.len());
        println!("  • Scene prompt: {}", preview(&scene));
        println!("  • Reference directory: {}", args.ref_dir.display());
        for (index, path) in images.iter().enumerate() {
            println!("    Image {}: {}", index + 1, file_name(path));
        }
        println!("  • Model: {model}");
        println!("  • Output directory: {}", out_dir.display());
        print_dry_footer();
        return Ok(());
    }

    let client = GeminiClient::from_env(settings)?;
    let media = Ffmpeg;
    let studio = Studio::new(&client, &media, settings);
    render(&studio, &scene, &images, &model, &out_dir).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::stable_stem;
    use crate::testing::{quiet_settings, MockApi, MockMedia};
    use std::fs;

    #[tokio::test]
    async fn one_session_per_reference_in_sorted_order() {
        let out = tempfile::tempdir().unwrap();
        let refs = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.jpg", "skip.txt"] {
            fs::write(refs.path().join(name), name.as_bytes()).unwrap();
        }
        let images = list_reference_images(refs.path()).unwrap();
        let settings = quiet_settings(out.path());
        let (api, media) = (MockApi::default(), MockMedia::default());
        let studio = Studio::new(&api, &media, &settings);

        let results = render(&studio, "harbor at night", &images, "veo-2.0-generate-001", out.path())
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(
            results[0].path.file_name().unwrap().to_string_lossy(),
            format!("{}.mp4", stable_stem("harbor at night", "ref001-"))
        );
        assert_eq!(
            results[1].path.file_name().unwrap().to_string_lossy(),
            format!("{}.mp4", stable_stem("harbor at night", "ref002-"))
        );

        let submitted = api.videos.borrow();
        assert_eq!(submitted[0].image.as_deref(), Some(&b"a.jpg"[..]));
        assert_eq!(submitted[1].image.as_deref(), Some(&b"b.png"[..]));
        assert!(submitted.iter().all(|video| video.prompt == "harbor at night"));
    }
}
