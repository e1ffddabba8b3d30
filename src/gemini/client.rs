//! GeminiClient - talks to the generative language and video APIs.
//!
//! Two call families live here: a structured-JSON planning call against the
//! script model, and the long-running video generation flow (submit, poll the
//! operation until done, stream the clip to disk).

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::AsyncWriteExt;

use super::error::{
    classify_operation_error, classify_response, ApiErrorBody, GeminiError, GEMINI_API_KEY_ENV,
};
use super::retry::parse_retry_after;

/// Default base URL for the generative APIs.
pub const GEMINI_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model for script/prompt planning.
pub const DEFAULT_SCRIPT_MODEL: &str = "gemini-2.5-pro";

/// Default model for video generation.
pub const DEFAULT_VIDEO_MODEL: &str = "veo-3.1-fast-generate-preview";

/// Default timeout for a single HTTP request (120 seconds; planning calls
/// with large prompts can be slow).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default connection timeout (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between operation status checks (10 seconds).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Output aspect ratio supported by the video model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectRatio {
    #[default]
    Landscape,
    Portrait,
}

impl AspectRatio {
    /// Wire representation, e.g. `16:9`.
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "16:9" | "landscape" => Ok(AspectRatio::Landscape),
            "9:16" | "portrait" => Ok(AspectRatio::Portrait),
            other => Err(format!(
                "Unknown aspect ratio '{}'. Use 16:9 or 9:16.",
                other
            )),
        }
    }
}

/// Seed image attached to the first scene's generation request.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    /// Base64-encoded image bytes.
    pub data: String,
    pub mime_type: String,
}

impl ImagePayload {
    /// Load and encode an image file from disk. The MIME type is inferred
    /// from the file extension.
    pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
        use base64::Engine as _;

        let mime_type = mime_type_for(path).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "Unsupported image type: {}. Use png, jpg, webp, or gif.",
                    path.display()
                ),
            )
        })?;
        let bytes = std::fs::read(path)?;
        Ok(Self {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            mime_type: mime_type.to_string(),
        })
    }
}

/// MIME type for a supported image file extension.
fn mime_type_for(path: &Path) -> Option<&'static str> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => Some("image/png"),
        Some("jpg") | Some("jpeg") => Some("image/jpeg"),
        Some("webp") => Some("image/webp"),
        Some("gif") => Some("image/gif"),
        _ => None,
    }
}

/// One video-generation request.
#[derive(Debug, Clone)]
pub struct ClipRequest {
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    /// Seed image; only ever set for the first scene of a plan.
    pub image: Option<ImagePayload>,
}

/// The parsed plan the script model returns.
#[derive(Debug, Deserialize)]
pub struct PlanPayload {
    pub title: String,
    #[serde(default)]
    pub scenes: Vec<PlannedScene>,
}

/// One scene entry of a [`PlanPayload`].
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedScene {
    pub scene_number: u32,
    pub script: String,
    pub prompt: String,
}

/// Status of an in-flight video operation.
#[derive(Debug, Clone, PartialEq)]
pub enum ClipStatus {
    /// The operation has not reported `done` yet.
    Running,
    /// The clip is ready to download.
    Ready { uri: String },
}

// --- wire types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Serialize)]
struct PredictRequest {
    instances: Vec<Instance>,
    parameters: PredictParameters,
}

#[derive(Debug, Serialize)]
struct Instance {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<InlineImage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineImage {
    bytes_base64_encoded: String,
    mime_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters {
    aspect_ratio: String,
    sample_count: u32,
    resolution: String,
}

#[derive(Debug, Deserialize)]
struct OperationHandle {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Operation {
    #[serde(default)]
    done: bool,
    #[serde(default)]
    response: Option<OperationResponse>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    #[serde(default)]
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSample {
    video: VideoRef,
}

#[derive(Debug, Deserialize)]
struct VideoRef {
    uri: String,
}

/// JSON schema the planning call constrains the model's response to.
fn plan_response_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "title": {
                "type": "STRING",
                "description": "A short, catchy title for the entire video sequence."
            },
            "scenes": {
                "type": "ARRAY",
                "description": "The scenes that make up the video.",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "sceneNumber": {
                            "type": "INTEGER",
                            "description": "Sequential scene number, starting from 1."
                        },
                        "script": {
                            "type": "STRING",
                            "description": "Short script or description of the scene."
                        },
                        "prompt": {
                            "type": "STRING",
                            "description": "Detailed, cinematic prompt for a text-to-video model."
                        }
                    },
                    "required": ["sceneNumber", "script", "prompt"]
                }
            }
        },
        "required": ["title", "scenes"]
    })
}

/// Client for the generative language and video APIs.
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    script_model: String,
    video_model: String,
    poll_interval: Duration,
    http_client: reqwest::Client,
}

impl GeminiClient {
    /// Create a client by reading the API key from the environment.
    ///
    /// # Errors
    /// Returns `GeminiError::MissingApiKey` if `GEMINI_API_KEY` is not set.
    pub fn new() -> Result<Self, GeminiError> {
        let api_key =
            std::env::var(GEMINI_API_KEY_ENV).map_err(|_| GeminiError::MissingApiKey)?;
        Self::with_api_key(api_key)
    }

    /// Create a client with an explicit API key.
    pub fn with_api_key(api_key: String) -> Result<Self, GeminiError> {
        Self::with_base_url(api_key, GEMINI_API_BASE_URL.to_string())
    }

    /// Create a client with a custom base URL. Used to point the client at a
    /// mock server in tests.
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, GeminiError> {
        if api_key.is_empty() {
            return Err(GeminiError::MissingApiKey);
        }

        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            api_key,
            base_url,
            script_model: DEFAULT_SCRIPT_MODEL.to_string(),
            video_model: DEFAULT_VIDEO_MODEL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn script_model(&self) -> &str {
        &self.script_model
    }

    pub fn video_model(&self) -> &str {
        &self.video_model
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Override the models, e.g. from the config file.
    pub fn set_models(&mut self, script_model: String, video_model: String) {
        self.script_model = script_model;
        self.video_model = video_model;
    }

    /// Override the operation polling interval.
    pub fn set_poll_interval(&mut self, interval: Duration) {
        self.poll_interval = interval;
    }

    /// Ask the script model for a structured multi-scene plan.
    ///
    /// The response is constrained to JSON via a response schema, then the
    /// first candidate's text is parsed into a [`PlanPayload`].
    pub async fn generate_plan(&self, prompt_text: &str) -> Result<PlanPayload, GeminiError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.script_model
        );

        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt_text.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: plan_response_schema(),
            },
        };

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = self.check_response(response).await?;

        let payload: GenerateContentResponse = response.json().await?;
        let text = payload
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| {
                GeminiError::InvalidResponse("planning response carried no candidates".to_string())
            })?;

        serde_json::from_str(text.trim())
            .map_err(|e| GeminiError::InvalidResponse(format!("plan JSON did not parse: {}", e)))
    }

    /// Submit a video-generation request and return the operation name used
    /// for polling.
    pub async fn submit_clip(&self, request: &ClipRequest) -> Result<String, GeminiError> {
        let url = format!(
            "{}/v1beta/models/{}:predictLongRunning",
            self.base_url, self.video_model
        );

        let body = PredictRequest {
            instances: vec![Instance {
                prompt: request.prompt.clone(),
                image: request.image.as_ref().map(|img| InlineImage {
                    bytes_base64_encoded: img.data.clone(),
                    mime_type: img.mime_type.clone(),
                }),
            }],
            parameters: PredictParameters {
                aspect_ratio: request.aspect_ratio.as_str().to_string(),
                sample_count: 1,
                resolution: "720p".to_string(),
            },
        };

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = self.check_response(response).await?;

        let handle: OperationHandle = response.json().await?;
        Ok(handle.name)
    }

    /// Check a long-running operation once.
    ///
    /// A `done` operation with an error payload is classified and returned
    /// as the corresponding `GeminiError`; a `done` operation without a
    /// download link is `MissingVideoUri`.
    pub async fn poll_clip(&self, operation: &str) -> Result<ClipStatus, GeminiError> {
        let url = format!("{}/v1beta/{}", self.base_url, operation);

        let response = self
            .http_client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;
        let response = self.check_response(response).await?;

        let op: Operation = response.json().await?;
        if !op.done {
            return Ok(ClipStatus::Running);
        }
        if let Some(detail) = op.error {
            return Err(classify_operation_error(&detail));
        }

        op.response
            .and_then(|r| r.generate_video_response)
            .and_then(|r| r.generated_samples.into_iter().next())
            .map(|s| ClipStatus::Ready { uri: s.video.uri })
            .ok_or(GeminiError::MissingVideoUri)
    }

    /// Stream a generated clip to disk without buffering it in memory.
    pub async fn download_clip(&self, uri: &str, dest: &Path) -> Result<PathBuf, GeminiError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let response = self
            .http_client
            .get(uri)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(classify_response(status, &text));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();

        use futures_util::StreamExt;
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;

        Ok(dest.to_path_buf())
    }

    /// Generate one clip end to end: submit, poll until done, download.
    ///
    /// Polling sleeps `poll_interval` between checks with no overall
    /// deadline; a stalled remote operation keeps this call pending.
    pub async fn generate_clip(
        &self,
        request: &ClipRequest,
        dest: &Path,
    ) -> Result<PathBuf, GeminiError> {
        log::info!("Submitting video generation: \"{}\"", request.prompt);
        let operation = self.submit_clip(request).await?;
        log::info!("Operation started: {}", operation);

        let uri = loop {
            match self.poll_clip(&operation).await? {
                ClipStatus::Running => {
                    log::debug!("Operation {} still running", operation);
                    tokio::time::sleep(self.poll_interval).await;
                }
                ClipStatus::Ready { uri } => break uri,
            }
        };

        log::info!("Downloading clip from {}", uri);
        self.download_clip(&uri, dest).await
    }

    /// Map a non-success response to a classified error, preserving any
    /// Retry-After hint on quota failures.
    async fn check_response(
        &self,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, GeminiError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let retry_after = parse_retry_after(&response);
        let text = response.text().await.unwrap_or_default();
        let mut error = classify_response(status, &text);
        if let GeminiError::RateLimit {
            retry_after_secs, ..
        } = &mut error
        {
            *retry_after_secs = retry_after;
            log::warn!(
                "Rate limited by the API (Retry-After: {:?} seconds)",
                retry_after
            );
        }
        Err(error)
    }
}
