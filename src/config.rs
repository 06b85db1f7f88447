use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;

pub(crate) const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Runtime settings shared by every command. Built once in `main` and passed
/// down explicitly.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub out_root: PathBuf,
    pub poll_interval: Duration,
    pub rate_limit_pause: Duration,
    pub api_base: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            out_root: PathBuf::from("out"),
            poll_interval: Duration::from_secs(8),
            rate_limit_pause: Duration::from_secs(30),
            api_base: DEFAULT_API_BASE.to_owned(),
        }
    }
}

impl Settings {
    pub(crate) fn from_env() -> anyhow::Result<Self> {
        let mut settings = Self::default();
        if let Some(dir) = non_empty_var("GENLAB_OUT_DIR") {
            settings.out_root = PathBuf::from(dir);
        }
        if let Some(secs) = non_empty_var("GENLAB_POLL_SECS") {
            settings.poll_interval = Duration::from_secs(
                secs.parse()
                    .with_context(|| format!("GENLAB_POLL_SECS is not a number: {secs}"))?,
            );
        }
        if let Some(secs) = non_empty_var("GENLAB_PAUSE_SECS") {
            settings.rate_limit_pause = Duration::from_secs(
                secs.parse()
                    .with_context(|| format!("GENLAB_PAUSE_SECS is not a number: {secs}"))?,
            );
        }
        if let Some(base) = non_empty_var("GENLAB_API_BASE") {
            settings.api_base = base.trim_end_matches('/').to_owned();
        }
        log::debug!("settings: {settings:?}");
        Ok(settings)
    }

    /// Output root for a command: its `--out` flag if given, else the configured root.
    pub(crate) fn out_dir(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.unwrap_or_else(|| self.out_root.clone())
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ModelFamily {
    Imagen,
    Veo,
}

#[derive(Debug, Serialize)]
pub(crate) struct ModelListing {
    pub known: Vec<&'static str>,
    pub default: String,
}

impl ModelFamily {
    pub(crate) fn env_var(self) -> &'static str {
        match self {
            ModelFamily::Imagen => "IMAGEN_MODEL",
            ModelFamily::Veo => "VEO_MODEL",
        }
    }

    pub(crate) fn default_model(self) -> &'static str {
        match self {
            ModelFamily::Imagen => "imagen-3.0-generate-002",
            ModelFamily::Veo => "veo-2.0-generate-001",
        }
    }

    pub(crate) fn known_models(self) -> &'static [&'static str] {
        match self {
            ModelFamily::Imagen => &[
                "imagen-3.0-generate-002",
                "imagen-3.0-generate-001",
                "imagen-3.0-fast-generate-001",
            ],
            ModelFamily::Veo => &[
                "veo-3.0-generate-preview",
                "veo-3.0-fast-generate-preview",
                "veo-2.0-generate-001",
            ],
        }
    }

    /// Flag, then environment, then the built-in default.
    pub(crate) fn resolve(self, flag: Option<&str>) -> String {
        let from_env = non_empty_var(self.env_var());
        resolve_model(flag, from_env.as_deref(), self.default_model())
    }

    pub(crate) fn listing(self) -> ModelListing {
        ModelListing {
            known: self.known_models().to_vec(),
            default: self.resolve(None),
        }
    }
}

pub(crate) fn resolve_model(flag: Option<&str>, from_env: Option<&str>, default: &str) -> String {
    flag.filter(|model| !model.is_empty())
        .or(from_env.filter(|model| !model.is_empty()))
        .unwrap_or(default)
        .to_owned()
}

pub(crate) fn print_model_listing(family: ModelFamily) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&family.listing())?);
    Ok(())
}
