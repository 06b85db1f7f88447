use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;

use crate::ai::GeneratedImage;

const REFERENCE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Image bytes sent to the API as a reference frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReferenceImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ReferenceImage {
    pub(crate) fn from_file(path: &Path) -> anyhow::Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("reading reference image {}", path.display()))?;
        let mime_type = match image::guess_format(&bytes) {
            Ok(format) => format.to_mime_type().to_owned(),
            Err(_) => mime_from_extension(path).to_owned(),
        };
        Ok(Self { bytes, mime_type })
    }

    pub(crate) fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(&self.bytes)
    }
}

impl From<GeneratedImage> for ReferenceImage {
    fn from(image: GeneratedImage) -> Self {
        Self {
            bytes: image.bytes,
            mime_type: image.mime_type,
        }
    }
}

fn mime_from_extension(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("png") => "image/png",
        _ => "image/jpeg",
    }
}

/// `.jpg`/`.jpeg`/`.png` files directly inside `dir`, sorted by path.
pub(crate) fn list_reference_images(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("reading reference dir {}", dir.display()))?
    {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                REFERENCE_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            });
        if is_image && path.is_file() {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}
