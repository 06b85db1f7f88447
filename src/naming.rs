//! Filesystem-safe names derived from prompts.
//!
//! Characters outside word characters, whitespace and `-` are deleted, not
//! escaped, so distinct prompts can map to the same slug.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

const MAX_SLUG_CHARS: usize = 50;
const UNTITLED: &str = "untitled";
pub(crate) const SNIPPET_WORDS: usize = 4;

fn sanitize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect()
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Lowercase slug with whitespace/hyphen runs collapsed to `_`, at most 50 chars.
pub(crate) fn slug(text: &str) -> String {
    let mut collapsed = String::with_capacity(text.len());
    let mut in_separator = false;
    for c in sanitize(text).chars() {
        if c == '-' || c.is_whitespace() {
            if !in_separator {
                collapsed.push('_');
            }
            in_separator = true;
        } else {
            collapsed.push(c);
            in_separator = false;
        }
    }

    let mut slug = collapsed.trim_matches('_').to_owned();
    if slug.chars().count() > MAX_SLUG_CHARS {
        slug = truncate_chars(&slug, MAX_SLUG_CHARS)
            .trim_end_matches('_')
            .to_owned();
    }
    if slug.is_empty() {
        UNTITLED.to_owned()
    } else {
        slug
    }
}

/// First `max_words` sanitized words joined by `_`, at most 50 chars.
pub(crate) fn snippet(text: &str, max_words: usize) -> String {
    let cleaned = sanitize(text);
    let words: Vec<&str> = cleaned.split_whitespace().take(max_words).collect();
    let snippet = truncate_chars(&words.join("_"), MAX_SLUG_CHARS);
    if snippet.is_empty() {
        UNTITLED.to_owned()
    } else {
        snippet
    }
}

fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().as_str().to_owned()
}

pub(crate) fn stable_stem(text: &str, prefix: &str) -> String {
    format!("{prefix}{}", &content_hash(text)[..12])
}

pub(crate) fn prompt_hash(text: &str) -> String {
    content_hash(text)[..8].to_owned()
}

fn short_model_name(model: &str) -> String {
    model
        .replace("veo-", "")
        .replace("-generate-preview", "")
        .replace("-preview", "")
}

pub(crate) fn video_filename(prompt: &str, model: &str, sequence: Option<u32>) -> String {
    let snippet = snippet(prompt, SNIPPET_WORDS);
    let model = short_model_name(model);
    match sequence {
        Some(n) => format!("{n:02}_{snippet}_{model}.mp4"),
        None => format!("{snippet}_{model}.mp4"),
    }
}

pub(crate) fn date_dir_name(now: &NaiveDateTime) -> String {
    now.format("%Y-%m-%d").to_string()
}

pub(crate) fn session_dir_name(now: &NaiveDateTime, script: &str, label: &str) -> String {
    format!("{}_{script}_{label}", now.format("%H%M%S"))
}

/// Output directory for a single-image command.
///
/// An explicit directory is used as-is. Otherwise the directory is
/// `{out_root}/{date}/{time}_{script}_{label}` where the label is the custom
/// name or the prompt slug.
pub(crate) fn output_path(
    out_root: &Path,
    script: &str,
    prompt: &str,
    explicit: Option<&Path>,
    custom_name: Option<&str>,
    now: &NaiveDateTime,
) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    let label = match custom_name {
        Some(name) if !name.is_empty() => name.to_owned(),
        _ => slug(prompt),
    };
    out_root
        .join(date_dir_name(now))
        .join(session_dir_name(now, script, &label))
}
