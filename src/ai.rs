use std::path::Path;

use anyhow::{bail, Context};
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Duration};

use crate::config::Settings;
use crate::reference::ReferenceImage;

const API_KEY_HEADER: &str = "x-goog-api-key";
const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_API_KEY"];
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GeneratedVideo {
    pub uri: String,
}

/// Handle to a long-running video job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Operation {
    pub name: String,
    pub done: bool,
    pub error: Option<String>,
    pub videos: Vec<GeneratedVideo>,
}

impl Operation {
    pub(crate) fn first_video(&self) -> anyhow::Result<&GeneratedVideo> {
        if let Some(error) = &self.error {
            bail!("operation {} failed: {error}", self.name);
        }
        self.videos
            .first()
            .with_context(|| format!("operation {} finished but no generated videos found", self.name))
    }
}

pub(crate) struct VideoPrompt<'a> {
    pub prompt: &'a str,
    pub negative: &'a str,
    pub image: Option<&'a ReferenceImage>,
    pub aspect_ratio: &'a str,
}

pub(crate) enum ContentPart<'a> {
    Text(&'a str),
    Image(&'a ReferenceImage),
}

/// Calls made against the remote generation service.
pub(crate) trait GenerativeApi {
    /// `None` when the service answered without any image.
    async fn generate_image(&self, model: &str, prompt: &str)
        -> anyhow::Result<Option<GeneratedImage>>;

    async fn generate_video(&self, model: &str, request: &VideoPrompt<'_>)
        -> anyhow::Result<Operation>;

    async fn refresh_operation(&self, operation: &Operation) -> anyhow::Result<Operation>;

    async fn get_operation(&self, name: &str) -> anyhow::Result<Operation>;

    async fn download_video(&self, video: &GeneratedVideo, dest: &Path) -> anyhow::Result<()>;

    async fn generate_content(
        &self,
        model: &str,
        parts: &[ContentPart<'_>],
        json_response: bool,
    ) -> anyhow::Result<String>;
}

// --- wire format ---

#[derive(Serialize)]
struct PredictRequest<I, P> {
    instances: Vec<I>,
    parameters: P,
}

#[derive(Serialize)]
struct ImageInstance<'a> {
    prompt: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageParameters {
    sample_count: u32,
}

#[derive(Serialize)]
struct VideoInstance<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<InlineImage>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineImage {
    bytes_base64_encoded: String,
    mime_type: String,
}

impl From<&ReferenceImage> for InlineImage {
    fn from(image: &ReferenceImage) -> Self {
        Self {
            bytes_base64_encoded: image.to_base64(),
            mime_type: image.mime_type.clone(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoParameters<'a> {
    aspect_ratio: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<&'a str>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct PredictResponse {
    predictions: Vec<Prediction>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct Prediction {
    bytes_base64_encoded: Option<String>,
    mime_type: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct OperationWire {
    name: String,
    done: bool,
    error: Option<StatusWire>,
    response: Option<VideoResponseWire>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct StatusWire {
    code: i32,
    message: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct VideoResponseWire {
    generate_video_response: GenerateVideoResponseWire,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct GenerateVideoResponseWire {
    generated_samples: Vec<SampleWire>,
}

#[derive(Deserialize)]
struct SampleWire {
    video: VideoWire,
}

#[derive(Deserialize)]
struct VideoWire {
    uri: String,
}

impl From<OperationWire> for Operation {
    fn from(wire: OperationWire) -> Self {
        Self {
            name: wire.name,
            done: wire.done,
            error: wire
                .error
                .map(|status| format!("(code {}) {}", status.code, status.message)),
            videos: wire
                .response
                .map(|response| response.generate_video_response.generated_samples)
                .unwrap_or_default()
                .into_iter()
                .map(|sample| GeneratedVideo {
                    uri: sample.video.uri,
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<PartWire<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum PartWire<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ContentResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CandidateContent {
    parts: Vec<TextPart>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct TextPart {
    text: Option<String>,
}

fn first_image(response: PredictResponse) -> anyhow::Result<Option<GeneratedImage>> {
    let Some(prediction) = response.predictions.into_iter().next() else {
        return Ok(None);
    };
    let Some(encoded) = prediction.bytes_base64_encoded else {
        return Ok(None);
    };
    let bytes = BASE64_STANDARD
        .decode(encoded)
        .context("decoding generated image")?;
    Ok(Some(GeneratedImage {
        bytes,
        mime_type: prediction
            .mime_type
            .unwrap_or_else(|| "image/png".to_owned()),
    }))
}

fn content_text(response: ContentResponse) -> anyhow::Result<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .map(|candidate| {
            candidate
                .content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();
    if text.is_empty() {
        bail!("model returned no text");
    }
    Ok(text)
}

fn content_request<'a>(parts: &'a [ContentPart<'a>], json_response: bool) -> ContentRequest<'a> {
    ContentRequest {
        contents: vec![Content {
            role: "user",
            parts: parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text(text) => PartWire::Text { text: *text },
                    ContentPart::Image(image) => PartWire::Inline {
                        inline_data: InlineData {
                            mime_type: image.mime_type.clone(),
                            data: image.to_base64(),
                        },
                    },
                })
                .collect(),
        }],
        generation_config: json_response.then_some(GenerationConfig {
            response_mime_type: "application/json",
        }),
    }
}

/// REST client for the Gemini API (Imagen, Veo and Gemini models).
pub(crate) struct GeminiClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl GeminiClient {
    pub(crate) fn from_env(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = API_KEY_VARS
            .iter()
            .find_map(|key| std::env::var(key).ok().filter(|value| !value.is_empty()))
            .context("no API key found: set GEMINI_API_KEY or GOOGLE_API_KEY")?;
        Ok(Self {
            http: reqwest::Client::new(),
            api_base: settings.api_base.clone(),
            api_key,
        })
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{model}:{method}", self.api_base)
    }

    async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> anyhow::Result<R> {
        log::debug!("POST {url}");
        let response = timeout(
            REQUEST_TIMEOUT,
            self.http
                .post(url)
                .header(API_KEY_HEADER, &self.api_key)
                .json(body)
                .send(),
        )
        .await
        .with_context(|| format!("timed out calling {url}"))??;
        decode(url, response).await
    }

    async fn get_json<R: DeserializeOwned>(&self, url: &str) -> anyhow::Result<R> {
        log::debug!("GET {url}");
        let response = timeout(
            REQUEST_TIMEOUT,
            self.http
                .get(url)
                .header(API_KEY_HEADER, &self.api_key)
                .send(),
        )
        .await
        .with_context(|| format!("timed out calling {url}"))??;
        decode(url, response).await
    }
}

async fn decode<R: DeserializeOwned>(url: &str, response: reqwest::Response) -> anyhow::Result<R> {
    let status = response.status();
    let text = response
        .text()
        .await
        .with_context(|| format!("reading response from {url}"))?;
    if !status.is_success() {
        bail!("{url} returned {status}: {text}");
    }
    serde_json::from_str(&text).with_context(|| format!("unexpected response from {url}: {text}"))
}

impl GenerativeApi for GeminiClient {
    async fn generate_image(
        &self,
        model: &str,
        prompt: &str,
    ) -> anyhow::Result<Option<GeneratedImage>> {
        let request = PredictRequest {
            instances: vec![ImageInstance { prompt }],
            parameters: ImageParameters { sample_count: 1 },
        };
        let response: PredictResponse = self
            .post_json(&self.model_url(model, "predict"), &request)
            .await?;
        first_image(response)
    }

    async fn generate_video(
        &self,
        model: &str,
        request: &VideoPrompt<'_>,
    ) -> anyhow::Result<Operation> {
        let body = PredictRequest {
            instances: vec![VideoInstance {
                prompt: request.prompt,
                image: request.image.map(InlineImage::from),
            }],
            parameters: VideoParameters {
                aspect_ratio: request.aspect_ratio,
                negative_prompt: Some(request.negative).filter(|negative| !negative.is_empty()),
            },
        };
        let wire: OperationWire = self
            .post_json(&self.model_url(model, "predictLongRunning"), &body)
            .await?;
        let operation = Operation::from(wire);
        log::info!("submitted video operation {}", operation.name);
        Ok(operation)
    }

    async fn refresh_operation(&self, operation: &Operation) -> anyhow::Result<Operation> {
        self.get_operation(&operation.name).await
    }

    async fn get_operation(&self, name: &str) -> anyhow::Result<Operation> {
        if name.is_empty() {
            bail!("operation has no name");
        }
        let wire: OperationWire = self
            .get_json(&format!("{}/{name}", self.api_base))
            .await?;
        Ok(Operation::from(wire))
    }

    async fn download_video(&self, video: &GeneratedVideo, dest: &Path) -> anyhow::Result<()> {
        log::debug!("downloading {} -> {}", video.uri, dest.display());
        let response = timeout(
            DOWNLOAD_TIMEOUT,
            self.http
                .get(&video.uri)
                .header(API_KEY_HEADER, &self.api_key)
                .send(),
        )
        .await
        .with_context(|| format!("timed out downloading {}", video.uri))??
        .error_for_status()?;
        let bytes = response.bytes().await?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &bytes)
            .await
            .with_context(|| format!("writing {}", dest.display()))?;
        Ok(())
    }

    async fn generate_content(
        &self,
        model: &str,
        parts: &[ContentPart<'_>],
        json_response: bool,
    ) -> anyhow::Result<String> {
        let request = content_request(parts, json_response);
        let response: ContentResponse = self
            .post_json(&self.model_url(model, "generateContent"), &request)
            .await?;
        content_text(response)
    }
}
