use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context};
use chrono::Local;
use clap::{Args, Subcommand};
use image::ImageFormat;
use serde_json::{json, Map};

use crate::ai::{ContentPart, GeminiClient, GenerativeApi};
use crate::commands::print_dry_footer;
use crate::config::{print_model_listing, ModelFamily, Settings};
use crate::naming::output_path;
use crate::reference::ReferenceImage;
use crate::session::{point_latest, write_image_metadata, write_prompt_file};

/// Imagen answers with PNG unless asked otherwise.
const EXPECTED_IMAGE_MIME: &str = "image/png";
const DEFAULT_VISION_MODEL: &str = "gemini-2.0-flash-exp";
const ANALYSIS_PROMPT: &str = "Describe this image in detail, focusing on visual elements, style, composition, and mood. Create a prompt that could be used to generate a similar image.";

/// Image generation and analysis
#[derive(Subcommand)]
pub(crate) enum ImagenCommand {
    /// Generate an image from a text prompt
    Generate(GenerateArgs),
    /// Describe an image as a reusable prompt
    Analyze(AnalyzeArgs),
}

#[derive(Args)]
pub(crate) struct GenerateArgs {
    /// Text prompt for image generation
    #[arg(required_unless_present = "list_models")]
    prompt: Option<String>,
    /// Imagen model id
    #[arg(short, long)]
    model: Option<String>,
    /// Use this directory instead of a dated session directory
    #[arg(short, long = "output", visible_alias = "out")]
    output: Option<PathBuf>,
    /// Custom name for the output folder
    #[arg(long)]
    name: Option<String>,
    /// Show what would be generated without calling the API
    #[arg(long)]
    dry: bool,
    /// List known model ids and the current default
    #[arg(long)]
    list_models: bool,
}

#[derive(Args)]
pub(crate) struct AnalyzeArgs {
    /// Image to describe
    image: PathBuf,
    /// Vision model id
    #[arg(short, long, default_value = DEFAULT_VISION_MODEL)]
    model: String,
    /// Use this directory instead of a dated session directory
    #[arg(short, long = "output", visible_alias = "out")]
    output: Option<PathBuf>,
}

pub(crate) async fn imagen(command: ImagenCommand, settings: &Settings) -> anyhow::Result<()> {
    match command {
        ImagenCommand::Generate(args) => generate(args, settings).await,
        ImagenCommand::Analyze(args) => analyze(args, settings).await,
    }
}

fn extension_for(mime_type: &str) -> &'static str {
    ImageFormat::from_mime_type(mime_type)
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("jpg")
}

fn planned_image_name(dir: &Path) -> Option<String> {
    let stem = dir.file_name()?.to_string_lossy();
    Some(format!("{stem}.{}", extension_for(EXPECTED_IMAGE_MIME)))
}

/// Generates one image into `dir`, named after the directory.
pub(crate) async fn generate_into<A: GenerativeApi>(
    api: &A,
    model: &str,
    prompt: &str,
    dir: &Path,
) -> anyhow::Result<PathBuf> {
    let image = api
        .generate_image(model, prompt)
        .await
        .with_context(|| format!("generating image with {model}"))?
        .context("no generated images in response")?;

    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let stem = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_owned());
    let image_path = dir.join(format!("{stem}.{}", extension_for(&image.mime_type)));
    fs::write(&image_path, &image.bytes)
        .with_context(|| format!("writing {}", image_path.display()))?;
    write_prompt_file(dir, prompt)?;
    write_image_metadata(dir, prompt, "imagen", model, Map::new())?;
    Ok(image_path)
}

async fn generate(args: GenerateArgs, settings: &Settings) -> anyhow::Result<()> {
    if args.list_models {
        return print_model_listing(ModelFamily::Imagen);
    }
    let prompt = args.prompt.unwrap_or_default();
    let model = ModelFamily::Imagen.resolve(args.model.as_deref());
    let dir = output_path(
        &settings.out_root,
        "imagen",
        &prompt,
        args.output.as_deref(),
        args.name.as_deref(),
        &Local::now().naive_local(),
    );

    println!("Generating image: {prompt}");
    println!("Model: {model}");
    println!("Output: {}", dir.display());

    if args.dry {
        println!("🔍 Dry run - showing what would be generated:");
        println!("  • Prompt: {prompt}");
        println!("  • Model: {model}");
        println!("  • Output directory: {}", dir.display());
        if let Some(name) = planned_image_name(&dir) {
            println!("  • Image file: {name}");
        }
        println!("  • Would create: prompt.txt, metadata.json");
        print_dry_footer();
        return Ok(());
    }

    let client = GeminiClient::from_env(settings)?;
    let image_path = generate_into(&client, &model, &prompt, &dir).await?;
    point_latest(&settings.out_root, &dir)?;
    println!("✅ Generated: {}", image_path.display());
    Ok(())
}

/// Asks a vision model for a prompt describing `image_path` and records it in `dir`.
pub(crate) async fn analyze_into<A: GenerativeApi>(
    api: &A,
    model: &str,
    image_path: &Path,
    dir: &Path,
) -> anyhow::Result<String> {
    let image = ReferenceImage::from_file(image_path)?;
    let generated = api
        .generate_content(
            model,
            &[ContentPart::Text(ANALYSIS_PROMPT), ContentPart::Image(&image)],
            false,
        )
        .await
        .with_context(|| format!("analyzing {} with {model}", image_path.display()))?;

    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    write_prompt_file(dir, &generated)?;
    let mut extra = Map::new();
    extra.insert("source_image".to_owned(), json!(image_path.display().to_string()));
    extra.insert("generated_prompt".to_owned(), json!(generated));
    write_image_metadata(dir, ANALYSIS_PROMPT, "analyze", model, extra)?;
    Ok(generated)
}

async fn analyze(args: AnalyzeArgs, settings: &Settings) -> anyhow::Result<()> {
    ensure!(args.image.is_file(), "image file not found: {}", args.image.display());
    println!("Analyzing image: {}", args.image.display());
    println!("Model: {}", args.model);

    let stem = args
        .image
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = output_path(
        &settings.out_root,
        "analyze",
        &format!("analysis_of_{stem}"),
        args.output.as_deref(),
        None,
        &Local::now().naive_local(),
    );
    println!("Output: {}", dir.display());

    let client = GeminiClient::from_env(settings)?;
    let generated = analyze_into(&client, &args.model, &args.image, &dir).await?;
    point_latest(&settings.out_root, &dir)?;
    println!("✅ Analysis complete: {}", dir.display());
    println!("Generated prompt: {generated}");
    Ok(())
}
