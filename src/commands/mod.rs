pub(crate) mod character_pack;
pub(crate) mod imagen;
pub(crate) mod matrix;
pub(crate) mod ref_images;
pub(crate) mod rewrite;
pub(crate) mod shot_chain;
pub(crate) mod simple;
pub(crate) mod storyboard;

use std::fs;
use std::path::Path;

use anyhow::Context;

const PREVIEW_CHARS: usize = 50;

pub(crate) fn read_text(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

/// Inline prompt if given, else the trimmed contents of the prompt file.
pub(crate) fn prompt_text(inline: Option<&str>, file: Option<&Path>) -> anyhow::Result<String> {
    match (inline, file) {
        (Some(prompt), _) if !prompt.is_empty() => Ok(prompt.to_owned()),
        (_, Some(path)) => Ok(read_text(path)?.trim().to_owned()),
        _ => anyhow::bail!("provide --prompt or --prompt-file"),
    }
}

/// First 50 characters followed by `...`.
pub(crate) fn preview(text: &str) -> String {
    let head: String = text.chars().take(PREVIEW_CHARS).collect();
    format!("{head}...")
}

pub(crate) fn print_dry_footer() {
    println!("✅ Dry run complete - no API calls made");
}
