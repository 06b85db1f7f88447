use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::naming::{date_dir_name, prompt_hash, session_dir_name, snippet, SNIPPET_WORDS};

pub(crate) const METADATA_FILE: &str = "metadata.json";
pub(crate) const PROMPT_FILE: &str = "prompt.txt";
const LATEST_LINK: &str = "latest";

pub(crate) fn timestamp() -> String {
    Local::now()
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Creates `{out_root}/{date}/{time}_{script}_{snippet}` and repoints `latest` at it.
pub(crate) fn create_session_directory(
    out_root: &Path,
    script: &str,
    prompt: &str,
) -> anyhow::Result<PathBuf> {
    create_session_directory_at(out_root, script, prompt, &Local::now().naive_local())
}

fn create_session_directory_at(
    out_root: &Path,
    script: &str,
    prompt: &str,
    now: &NaiveDateTime,
) -> anyhow::Result<PathBuf> {
    let session_dir = out_root
        .join(date_dir_name(now))
        .join(session_dir_name(now, script, &snippet(prompt, SNIPPET_WORDS)));
    fs::create_dir_all(&session_dir)
        .with_context(|| format!("creating session directory {}", session_dir.display()))?;
    point_latest(out_root, &session_dir)?;
    log::info!("session directory: {}", session_dir.display());
    Ok(session_dir)
}

/// Replaces `{out_root}/latest` with a relative symlink to `session_dir`.
/// Directories outside `out_root` are left unlinked.
pub(crate) fn point_latest(out_root: &Path, session_dir: &Path) -> anyhow::Result<()> {
    let Ok(relative) = session_dir.strip_prefix(out_root) else {
        log::debug!("{} is outside {}, not linking latest", session_dir.display(), out_root.display());
        return Ok(());
    };
    let link = out_root.join(LATEST_LINK);
    if fs::symlink_metadata(&link).is_ok() {
        fs::remove_file(&link).with_context(|| format!("removing {}", link.display()))?;
    }
    #[cfg(unix)]
    std::os::unix::fs::symlink(relative, &link)
        .with_context(|| format!("linking {} -> {}", link.display(), relative.display()))?;
    #[cfg(not(unix))]
    log::debug!("symlinks unsupported, skipping {}", relative.display());
    Ok(())
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct SessionMetadata {
    pub timestamp: String,
    pub script: String,
    pub model: String,
    pub primary_prompt: String,
    pub current_prompt: String,
    pub negative: String,
    pub prompt_hash: String,
    pub files: Vec<String>,
}

/// Previously written record. `timestamp` and `primary_prompt` are kept
/// whenever the key is present, even when empty.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StoredMetadata {
    timestamp: Option<String>,
    primary_prompt: Option<String>,
    files: Vec<String>,
}

impl StoredMetadata {
    fn load(path: &Path) -> anyhow::Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let text =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let metadata =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(metadata))
    }
}

impl SessionMetadata {
    fn merged(
        existing: Option<StoredMetadata>,
        script: &str,
        prompt: &str,
        negative: &str,
        model: &str,
        new_files: &[String],
    ) -> Self {
        let existing = existing.unwrap_or_default();
        let mut files = existing.files;
        files.extend_from_slice(new_files);
        Self {
            timestamp: existing.timestamp.unwrap_or_else(timestamp),
            script: script.to_owned(),
            model: model.to_owned(),
            primary_prompt: existing
                .primary_prompt
                .unwrap_or_else(|| prompt.to_owned()),
            current_prompt: prompt.to_owned(),
            negative: negative.to_owned(),
            prompt_hash: prompt_hash(prompt),
            files,
        }
    }
}

/// Read-merge-write of `metadata.json` in a session directory.
///
/// `timestamp` and `primary_prompt` survive from the first write and `files`
/// accumulates. `prompt.txt` is written on the first call only. The update is
/// not atomic: two concurrent writers can lose an update.
pub(crate) fn merge_metadata(
    session_dir: &Path,
    script: &str,
    prompt: &str,
    negative: &str,
    model: &str,
    new_files: &[String],
) -> anyhow::Result<PathBuf> {
    let metadata_file = session_dir.join(METADATA_FILE);
    let existing = StoredMetadata::load(&metadata_file)?;
    let metadata = SessionMetadata::merged(existing, script, prompt, negative, model, new_files);
    fs::write(&metadata_file, serde_json::to_string_pretty(&metadata)?)
        .with_context(|| format!("writing {}", metadata_file.display()))?;

    let prompt_file = session_dir.join(PROMPT_FILE);
    if !prompt_file.exists() {
        let mut text = format!("Primary Prompt: {prompt}");
        if !negative.is_empty() {
            text.push_str(&format!("\n\nNegative: {negative}"));
        }
        fs::write(&prompt_file, text)
            .with_context(|| format!("writing {}", prompt_file.display()))?;
    }
    Ok(metadata_file)
}

#[derive(Debug, Serialize)]
struct ImageMetadata<'a> {
    prompt: &'a str,
    script: &'a str,
    model: &'a str,
    timestamp: String,
    output_path: String,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Writes a flat `metadata.json` for single-image commands, overwriting any previous one.
pub(crate) fn write_image_metadata(
    output_dir: &Path,
    prompt: &str,
    script: &str,
    model: &str,
    extra: Map<String, Value>,
) -> anyhow::Result<PathBuf> {
    let metadata = ImageMetadata {
        prompt,
        script,
        model,
        timestamp: timestamp(),
        output_path: output_dir.display().to_string(),
        extra,
    };
    let path = output_dir.join(METADATA_FILE);
    fs::write(&path, serde_json::to_string_pretty(&metadata)?)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

pub(crate) fn write_prompt_file(output_dir: &Path, prompt: &str) -> anyhow::Result<PathBuf> {
    let path = output_dir.join(PROMPT_FILE);
    fs::write(&path, prompt).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn read_metadata(dir: &Path) -> SessionMetadata {
        serde_json::from_str(&fs::read_to_string(dir.join(METADATA_FILE)).unwrap()).unwrap()
    }

    #[test]
    fn first_merge_writes_metadata_and_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let path = merge_metadata(
            dir.path(),
            "simple",
            "Subject: cyberpunk witch casting spells",
            "blurry, low quality",
            "veo-3.0-generate-preview",
            &["test.mp4".to_owned()],
        )
        .unwrap();
        assert_eq!(path, dir.path().join("metadata.json"));

        let metadata = read_metadata(dir.path());
        assert_eq!(metadata.script, "simple");
        assert_eq!(metadata.primary_prompt, "Subject: cyberpunk witch casting spells");
        assert_eq!(metadata.current_prompt, metadata.primary_prompt);
        assert_eq!(metadata.negative, "blurry, low quality");
        assert_eq!(metadata.model, "veo-3.0-generate-preview");
        assert_eq!(metadata.files, vec!["test.mp4"]);
        assert_eq!(metadata.prompt_hash.len(), 8);
        assert!(!metadata.timestamp.is_empty());

        let prompt = fs::read_to_string(dir.path().join(PROMPT_FILE)).unwrap();
        assert_eq!(
            prompt,
            "Primary Prompt: Subject: cyberpunk witch casting spells\n\nNegative: blurry, low quality"
        );
    }

    #[test]
    fn later_merges_accumulate_files_and_keep_primary() {
        let dir = tempfile::tempdir().unwrap();
        merge_metadata(dir.path(), "chain", "first prompt", "", "veo-a", &["a.mp4".to_owned()])
            .unwrap();
        let first = read_metadata(dir.path());

        merge_metadata(dir.path(), "chain", "second prompt", "grainy", "veo-b", &["b.mp4".to_owned()])
            .unwrap();
        let second = read_metadata(dir.path());

        assert_eq!(second.files, vec!["a.mp4", "b.mp4"]);
        assert_eq!(second.primary_prompt, "first prompt");
        assert_eq!(second.current_prompt, "second prompt");
        assert_eq!(second.timestamp, first.timestamp);
        assert_eq!(second.negative, "grainy");
        assert_eq!(second.model, "veo-b");
        assert_ne!(second.prompt_hash, first.prompt_hash);

        // prompt.txt keeps the first prompt only
        let prompt = fs::read_to_string(dir.path().join(PROMPT_FILE)).unwrap();
        assert_eq!(prompt, "Primary Prompt: first prompt");
    }

    #[test]
    fn empty_first_prompt_stays_primary() {
        let dir = tempfile::tempdir().unwrap();
        merge_metadata(dir.path(), "storyboard", "", "", "veo", &["01.mp4".to_owned()]).unwrap();
        merge_metadata(dir.path(), "storyboard", "second shot", "", "veo", &["02.mp4".to_owned()])
            .unwrap();

        let metadata = read_metadata(dir.path());
        assert_eq!(metadata.primary_prompt, "");
        assert_eq!(metadata.current_prompt, "second shot");
        assert_eq!(metadata.files, vec!["01.mp4", "02.mp4"]);
    }

    #[test]
    fn merge_tolerates_partial_metadata() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(METADATA_FILE), r#"{"files": ["old.mp4"]}"#).unwrap();
        merge_metadata(dir.path(), "simple", "new", "", "veo", &["new.mp4".to_owned()]).unwrap();
        let metadata = read_metadata(dir.path());
        assert_eq!(metadata.files, vec!["old.mp4", "new.mp4"]);
        assert_eq!(metadata.primary_prompt, "new");
    }

    #[test]
    fn corrupt_metadata_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(METADATA_FILE), "not json").unwrap();
        assert!(merge_metadata(dir.path(), "simple", "p", "", "veo", &[]).is_err());
    }

    #[test]
    fn session_directory_layout_and_latest_link() {
        let root = tempfile::tempdir().unwrap();
        let now = NaiveDate::from_ymd_opt(2025, 1, 2)
            .unwrap()
            .and_hms_opt(13, 4, 5)
            .unwrap();
        let dir = create_session_directory_at(
            root.path(),
            "storyboard",
            "Subject: cyberpunk witch casting spells at dusk",
            &now,
        )
        .unwrap();

        assert!(dir.is_dir());
        assert_eq!(dir.parent().unwrap().parent().unwrap(), root.path());
        assert_eq!(
            dir.file_name().unwrap(),
            "130405_storyboard_subject_cyberpunk_witch_casting"
        );

        #[cfg(unix)]
        {
            let link = root.path().join("latest");
            assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
            assert_eq!(
                fs::read_link(&link).unwrap(),
                PathBuf::from("2025-01-02/130405_storyboard_subject_cyberpunk_witch_casting")
            );

            let later = now + chrono::Duration::seconds(1);
            let next = create_session_directory_at(root.path(), "simple", "next", &later).unwrap();
            assert_eq!(fs::canonicalize(&link).unwrap(), fs::canonicalize(next).unwrap());
        }
    }

    #[test]
    fn image_metadata_flattens_extra_fields() {
        let dir = tempfile::tempdir().unwrap();
        let mut extra = Map::new();
        extra.insert("source_image".to_owned(), json!("cat.png"));
        write_image_metadata(dir.path(), "test prompt", "analyze", "gemini", extra).unwrap();
        write_prompt_file(dir.path(), "test prompt").unwrap();

        let value: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join(METADATA_FILE)).unwrap())
                .unwrap();
        assert_eq!(value["prompt"], "test prompt");
        assert_eq!(value["script"], "analyze");
        assert_eq!(value["model"], "gemini");
        assert_eq!(value["source_image"], "cat.png");
        assert!(value.get("timestamp").is_some());
        assert!(value.get("output_path").is_some());
        assert_eq!(
            fs::read_to_string(dir.path().join(PROMPT_FILE)).unwrap(),
            "test prompt"
        );
    }
}
