use std::path::{Path, PathBuf};

use anyhow::ensure;
use clap::Parser;

use crate::ai::{GeminiClient, GenerativeApi};
use crate::commands::{preview, print_dry_footer, read_text};
use crate::config::{ModelFamily, Settings};
use crate::reference::{list_reference_images, ReferenceImage};
use crate::studio::{ClipName, Studio, VideoJob};
use crate::video::{Ffmpeg, MediaTool};

const SCRIPT: &str = "character_pack";

/// Renders one scene against a small pack of character reference images.
#[derive(Parser)]
pub(crate) struct CharacterPackArgs {
    /// Scene prompt shared by every clip
    #[arg(long)]
    scene: String,
    /// Directory of reference images
    #[arg(long)]
    ref_dir: Option<PathBuf>,
    /// Text file with one Imagen prompt per line, used when no references are found
    #[arg(long)]
    imagen_prompts: Option<PathBuf>,
    /// Number of references to use
    #[arg(long, default_value_t = 3)]
    k: usize,
    /// Imagen model id for generated references
    #[arg(long)]
    imagen_model: Option<String>,
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

fn prompt_lines(text: &str, k: usize) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(k)
        .map(str::to_owned)
        .collect()
}

fn references_from_dir(dir: &Path, k: usize) -> anyhow::Result<Vec<ReferenceImage>> {
    list_reference_images(dir)?
        .iter()
        .take(k)
        .map(|path| ReferenceImage::from_file(path))
        .collect()
}

/// One Imagen still per prompt; failures are reported and skipped.
async fn references_from_imagen<A: GenerativeApi>(
    api: &A,
    model: &str,
    prompts: &[String],
) -> Vec<ReferenceImage> {
    let mut refs = Vec::new();
    for prompt in prompts {
        match api.generate_image(model, prompt).await {
            Ok(Some(image)) => refs.push(image.into()),
            Ok(None) => log::warn!("Imagen returned no image for {prompt:?}"),
            Err(err) => println!("Imagen generate failed: {err:#}"),
        }
    }
    refs
}

pub(crate) async fn render<A: GenerativeApi, M: MediaTool>(
    studio: &Studio<'_, A, M>,
    scene: &str,
    refs: &[ReferenceImage],
    model: &str,
    out_dir: &Path,
) -> anyhow::Result<Vec<PathBuf>> {
    let mut clips = Vec::with_capacity(refs.len());
    for (index, reference) in refs.iter().enumerate() {
        let sequence = index + 1;
        studio.pause_before(sequence).await;
        let result = studio
            .generate_video(
                VideoJob::new(scene, model, SCRIPT, out_dir)
                    .image(Some(reference))
                    .name(ClipName::Stable {
                        prefix: format!("pack{sequence:02}-"),
                    }),
            )
            .await?;
        clips.push(result.path);
    }
    println!("done {} clips -> {}", clips.len(), out_dir.display());
    Ok(clips)
}

pub(crate) async fn character_pack(args: CharacterPackArgs, settings: &Settings) -> anyhow::Result<()> {
    let model = ModelFamily::Veo.resolve(args.model.as_deref());
    let imagen_model = ModelFamily::Imagen.resolve(args.imagen_model.as_deref());
    let out_dir = settings.out_dir(args.out);

    let mut refs = match &args.ref_dir {
        Some(dir) => references_from_dir(dir, args.k)?,
        None => Vec::new(),
    };
    let imagen_prompts = match &args.imagen_prompts {
        Some(path) if refs.is_empty() => prompt_lines(&read_text(path)?, args.k),
        _ => Vec::new(),
    };

    if args.dry {
        println!("🔍 Dry run - character pack:");
        println!("  • Scene prompt: {}", preview(&args.scene));
        if refs.is_empty() {
            println!("  • Imagen references ({imagen_model}):");
            for line in &imagen_prompts {
                println!("    {}", preview(line));
            }
        } else {
            println!("  • Reference images: {}", refs.len());
        }
        println!("  • Model: {model}");
        println!("  • Output directory: {}", out_dir.display());
        print_dry_footer();
        return Ok(());
    }

    ensure!(
        !refs.is_empty() || !imagen_prompts.is_empty(),
        "no reference images available (provide --ref-dir or --imagen-prompts)"
    );
    let client = GeminiClient::from_env(settings)?;
    if refs.is_empty() {
        refs = references_from_imagen(&client, &imagen_model, &imagen_prompts).await;
    }
    ensure!(
        !refs.is_empty(),
        "no reference images available (provide --ref-dir or --imagen-prompts)"
    );

    let media = Ffmpeg;
    let studio = Studio::new(&client, &media, settings);
    render(&studio, &args.scene, &refs, &model, &out_dir).await?;
    Ok(())
}
