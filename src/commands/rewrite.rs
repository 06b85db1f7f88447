use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use serde_json::Value;

use crate::ai::{ContentPart, GeminiClient, GenerativeApi};
use crate::commands::read_text;
use crate::config::Settings;

const DEFAULT_REWRITE_MODEL: &str = "gemini-2.5-flash";
const SYSTEM_PROMPT: &str = "You write Veo-3 prompts with explicit Subject, Action, Style, Camera, Ambience, and Audio cues. Return a JSON list of strings.";

/// Asks a text model for prompt variants of a base spec.
#[derive(Parser)]
pub(crate) struct RewriteArgs {
    /// Text file describing the scene to vary
    #[arg(short, long)]
    base_spec: PathBuf,
    /// Number of variants to request
    #[arg(long, default_value_t = 6)]
    n: usize,
    /// JSON file for the variants [default: <out root>/rewrites.json]
    #[arg(short, long = "out", visible_alias = "output")]
    out: Option<PathBuf>,
    /// Text model id
    #[arg(short, long, default_value = DEFAULT_REWRITE_MODEL)]
    model: String,
}

fn request_text(base: &str, n: usize) -> String {
    format!("{SYSTEM_PROMPT}\n\nCreate {n} diverse Veo prompts from this spec:\n{base}")
}

/// Any JSON reply as-is; a reply that is not JSON becomes its non-empty lines.
fn parse_variants(reply: &str) -> Value {
    match serde_json::from_str::<Value>(reply) {
        Ok(variants) => variants,
        Err(err) => {
            log::debug!("reply is not JSON ({err}), splitting lines");
            reply
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(|line| Value::String(line.to_owned()))
                .collect()
        }
    }
}

pub(crate) async fn write_variants<A: GenerativeApi>(
    api: &A,
    model: &str,
    base: &str,
    n: usize,
    out: &Path,
) -> anyhow::Result<Value> {
    let prompt = request_text(base, n);
    let reply = api
        .generate_content(model, &[ContentPart::Text(&prompt)], true)
        .await
        .with_context(|| format!("asking {model} for variants"))?;
    let variants = parse_variants(&reply);

    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(out, serde_json::to_string_pretty(&variants)?)
        .with_context(|| format!("writing {}", out.display()))?;
    let count = variants.as_array().map_or(1, Vec::len);
    println!("wrote {count} variants -> {}", out.display());
    Ok(variants)
}

pub(crate) async fn rewrite(args: RewriteArgs, settings: &Settings) -> anyhow::Result<()> {
    let base = read_text(&args.base_spec)?.trim().to_owned();
    let out = args
        .out
        .unwrap_or_else(|| settings.out_root.join("rewrites.json"));
    let client = GeminiClient::from_env(settings)?;
    write_variants(&client, &args.model, &base, args.n, &out).await?;
    Ok(())
}
