//! Error taxonomy for the generative-API boundary.
//!
//! Remote failures arrive as a Google-style JSON body
//! `{"error": {"code", "status", "message"}}`. Everything the rest of the
//! crate sees is a tagged [`GeminiError`], produced by a single
//! classification function here, so internal logic never inspects ad hoc
//! error shapes.

use serde::Deserialize;

/// The environment variable holding the API key.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Errors that can occur while talking to the generative APIs.
#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("API key not configured")]
    MissingApiKey,

    /// The service rejected the credential itself.
    #[error("Invalid API key: {message}")]
    Auth { message: String },

    /// Per-minute quota exhausted. The only transient class; everything
    /// else aborts immediately.
    #[error("Quota exhausted: {message}")]
    RateLimit {
        message: String,
        /// Retry-After header value in seconds, if the service sent one.
        retry_after_secs: Option<u64>,
    },

    #[error("Content policy violation: {message}")]
    ContentPolicy { message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Unexpected API response: {0}")]
    InvalidResponse(String),

    /// The script model returned no scenes.
    #[error("The model failed to produce a plan. Try rephrasing the brief.")]
    EmptyPlan,

    /// A completed operation carried no download link.
    #[error("Video generation failed to produce a download link")]
    MissingVideoUri,

    /// The long-running operation reported a server-side failure.
    #[error("Video generation failed: {message}")]
    OperationFailed { message: String },
}

impl GeminiError {
    /// Whether this failure is safe to retry. Only quota/rate-limit
    /// responses qualify.
    pub fn is_transient(&self) -> bool {
        matches!(self, GeminiError::RateLimit { .. })
    }

    /// Whether this failure means the credential is unusable.
    pub fn is_credential(&self) -> bool {
        matches!(self, GeminiError::MissingApiKey | GeminiError::Auth { .. })
    }
}

/// Structured error payload the APIs attach to non-2xx responses.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

/// Classify a non-success response into a [`GeminiError`].
///
/// Inspects the structured error body when one is present and falls back to
/// the HTTP status code otherwise. Precedence: credential, quota, content
/// policy, then a generic API error carrying the raw text.
pub fn classify_response(http_status: u16, body_text: &str) -> GeminiError {
    let parsed: Option<ApiErrorBody> = serde_json::from_str::<ApiErrorEnvelope>(body_text)
        .map(|e| e.error)
        .ok();
    let detail = parsed.unwrap_or_default();

    let code = detail.code.unwrap_or(i64::from(http_status));
    let status = detail.status.as_deref().unwrap_or("");
    let message = detail
        .message
        .clone()
        .unwrap_or_else(|| format!("HTTP {}: {}", http_status, body_text.trim()));

    if status == "NOT_FOUND"
        || code == 404
        || message.to_lowercase().contains("api key not valid")
    {
        return GeminiError::Auth { message };
    }
    if status == "RESOURCE_EXHAUSTED" || code == 429 {
        return GeminiError::RateLimit {
            message,
            retry_after_secs: None,
        };
    }
    if status == "INVALID_ARGUMENT" || code == 400 {
        return GeminiError::ContentPolicy { message };
    }
    GeminiError::Api(message)
}

/// Classify an error reported *inside* a long-running operation payload.
pub fn classify_operation_error(detail: &ApiErrorBody) -> GeminiError {
    let message = detail
        .message
        .clone()
        .unwrap_or_else(|| "Unknown error occurred during generation".to_string());
    match (detail.status.as_deref(), detail.code) {
        (Some("RESOURCE_EXHAUSTED"), _) | (_, Some(429)) => GeminiError::RateLimit {
            message,
            retry_after_secs: None,
        },
        (Some("INVALID_ARGUMENT"), _) | (_, Some(400)) => GeminiError::ContentPolicy { message },
        (Some("NOT_FOUND"), _) | (_, Some(404)) => GeminiError::Auth { message },
        _ => GeminiError::OperationFailed { message },
    }
}

/// Short, user-facing classification recorded on a failed scene.
///
/// Fixed precedence: credential errors, then quota, then content policy,
/// then the raw display message.
pub fn scene_error_message(error: &GeminiError) -> String {
    if error.is_credential() {
        return "API Key Error".to_string();
    }
    match error {
        GeminiError::RateLimit { .. } => "Quota Exceeded".to_string(),
        GeminiError::ContentPolicy { .. } => "Content policy violation".to_string(),
        other => other.to_string(),
    }
}
