use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use minijinja::Environment;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::ai::{GeminiClient, GenerativeApi};
use crate::commands::{print_dry_footer, read_text};
use crate::config::{ModelFamily, Settings};
use crate::studio::{ClipName, Studio, VideoJob};
use crate::video::{Ffmpeg, MediaTool};

const SCRIPT: &str = "matrix";
const RESULTS_FILE: &str = "matrix_results.json";

/// Renders a prompt template over every combination of the configured dimensions.
#[derive(Parser)]
pub(crate) struct MatrixArgs {
    /// YAML file with `matrix` dimensions and an optional `negative` list
    #[arg(short, long)]
    config: PathBuf,
    /// Jinja template for the prompt
    #[arg(short, long)]
    template: PathBuf,
    /// Output directory
    #[arg(short, long = "out", visible_alias = "output")]
    out: Option<PathBuf>,
    /// Veo model id
    #[arg(short, long)]
    model: Option<String>,
    /// Print the rendered prompts without calling the API
    #[arg(long)]
    dry: bool,
}

#[derive(Debug, Deserialize)]
struct MatrixConfig {
    #[serde(default)]
    matrix: BTreeMap<String, Vec<Value>>,
    #[serde(default = "no_negative")]
    negative: Vec<String>,
}

fn no_negative() -> Vec<String> {
    vec![String::new()]
}

impl MatrixConfig {
    fn load(path: &Path) -> anyhow::Result<Self> {
        let text = read_text(path)?;
        if text.trim().is_empty() {
            return Ok(Self {
                matrix: BTreeMap::new(),
                negative: no_negative(),
            });
        }
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

/// Cartesian product in key order; the first key varies slowest.
fn combinations(dims: &BTreeMap<String, Vec<Value>>) -> Vec<BTreeMap<String, Value>> {
    let mut combos = vec![BTreeMap::new()];
    for (key, values) in dims {
        combos = combos
            .into_iter()
            .flat_map(|combo| {
                values.iter().map(move |value| {
                    let mut next = combo.clone();
                    next.insert(key.clone(), value.clone());
                    next
                })
            })
            .collect();
    }
    combos
}

fn render_prompts(config: &MatrixConfig, template: &str) -> anyhow::Result<Vec<String>> {
    let env = Environment::new();
    combinations(&config.matrix)
        .iter()
        .map(|vars| {
            let prompt = env
                .render_str(template, vars)
                .context("rendering prompt template")?;
            Ok(prompt.trim().to_owned())
        })
        .collect()
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub(crate) struct MatrixRow {
    pub prompt: String,
    pub negative: String,
    pub path: String,
    pub thumb: String,
}

pub(crate) async fn render<A: GenerativeApi, M: MediaTool>(
    studio: &Studio<'_, A, M>,
    prompts: &[String],
    negatives: &[String],
    model: &str,
    out_dir: &Path,
) -> anyhow::Result<Vec<MatrixRow>> {
    let mut rows = Vec::with_capacity(prompts.len() * negatives.len());
    for prompt in prompts {
        for negative in negatives {
            studio.pause_before(rows.len() + 1).await;
            let result = studio
                .generate_video(
                    VideoJob::new(prompt, model, SCRIPT, out_dir)
                        .negative(negative)
                        .name(ClipName::Stable {
                            prefix: "mx-".to_owned(),
                        }),
                )
                .await?;
            rows.push(MatrixRow {
                prompt: result.prompt,
                negative: result.negative,
                path: result.path.display().to_string(),
                thumb: result
                    .thumbnail
                    .map(|thumb| thumb.display().to_string())
                    .unwrap_or_default(),
            });
        }
    }

    if !rows.is_empty() {
        fs::create_dir_all(out_dir)?;
        let results = out_dir.join(RESULTS_FILE);
        fs::write(&results, serde_json::to_string_pretty(&rows)?)
            .with_context(|| format!("writing {}", results.display()))?;
        println!("saved {} results -> {}", rows.len(), out_dir.display());
    }
    Ok(rows)
}

pub(crate) async fn matrix(args: MatrixArgs, settings: &Settings) -> anyhow::Result<()> {
    let config = MatrixConfig::load(&args.config)?;
    let template = read_text(&args.template)?;
    let prompts = render_prompts(&config, &template)?;
    let model = ModelFamily::Veo.resolve(args.model.as_deref());
    let out_dir = settings.out_dir(args.out);

    if args.dry {
        println!(
            "🔍 Dry run - prompt matrix with {} prompts x {} negatives:",
            prompts.len(),
            config.negative.len()
        );
        for prompt in &prompts {
            println!("{prompt}");
        }
        println!("  • Model: {model}");
        print_dry_footer();
        return Ok(());
    }

    let client = GeminiClient::from_env(settings)?;
    let media = Ffmpeg;
    let studio = Studio::new(&client, &media, settings);
    render(&studio, &prompts, &config.negative, &model, &out_dir).await?;
    Ok(())
}
