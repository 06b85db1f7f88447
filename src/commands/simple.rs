use std::path::PathBuf;

use clap::Parser;

use crate::ai::GeminiClient;
use crate::commands::{preview, print_dry_footer, prompt_text};
use crate::config::{print_model_listing, ModelFamily, Settings};
use crate::reference::ReferenceImage;
use crate::studio::{Studio, VideoJob};
use crate::video::Ffmpeg;

/// One-shot video generation: a prompt, an optional negative and an optional reference image.
#[derive(Parser)]
pub(crate) struct SimpleArgs {
    /// Inline prompt string
    #[arg(short, long)]
    prompt: Option<String>,
    /// Path to a text file with the prompt
    #[arg(short = 'f', long)]
    prompt_file: Option<PathBuf>,
    /// Negative prompt
    #[arg(short, long, default_value = "")]
    negative: String,
    /// Reference image (jpg/png) for image-to-video
    #[arg(short, long)]
    image: Option<PathBuf>,
    /// Output directory
    #[arg(short, long = "out", visible_alias = "output")]
    out: Option<PathBuf>,
    /// Veo model id, e.g. veo-3.0-generate-preview
    #[arg(short, long)]
    model: Option<String>,
    /// List known model ids and the current default
    #[arg(long)]
    list_models: bool,
    /// Show what would be generated without calling the API
    #[arg(long)]
    dry: bool,
}

pub(crate) async fn simple(args: SimpleArgs, settings: &Settings) -> anyhow::Result<()> {
    if args.list_models {
        return print_model_listing(ModelFamily::Veo);
    }
    let text = prompt_text(args.prompt.as_deref(), args.prompt_file.as_deref())?;
    let model = ModelFamily::Veo.resolve(args.model.as_deref());
    let out_dir = settings.out_dir(args.out);

    if args.dry {
        println!("🔍 Dry run - single video generation:");
        println!("  • Prompt: {}", preview(&text));
        println!("  • Model: {model}");
        if args.negative.is_empty() {
            println!("  • No negative prompt");
        } else {
            println!("  • Negative: {}", args.negative);
        }
        match &args.image {
            Some(image) => println!("  • Reference image: {}", image.display()),
            None => println!("  • No reference image"),
        }
        println!("  • Output directory: {}", out_dir.display());
        print_dry_footer();
        return Ok(());
    }

    let image = args
        .image
        .as_deref()
        .map(ReferenceImage::from_file)
        .transpose()?;
    let client = GeminiClient::from_env(settings)?;
    let media = Ffmpeg;
    let studio = Studio::new(&client, &media, settings);
    let result = studio
        .generate_video(
            VideoJob::new(&text, &model, "simple", &out_dir)
                .negative(&args.negative)
                .image(image.as_ref()),
        )
        .await?;
    log::info!(
        "operation {} recorded in {}",
        result.operation_name,
        result.metadata_file.display()
    );
    println!("✅ Saved video: {}", result.path.display());
    if let Some(thumbnail) = &result.thumbnail {
        println!("🖼️  Last frame: {}", thumbnail.display());
    }
    println!("📁 Session: {}", result.session_dir.display());
    Ok(())
}
