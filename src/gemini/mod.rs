//! Generative-API integration.
//!
//! Wraps the script-planning and video-generation endpoints behind a typed
//! client, a tagged error taxonomy, and the rate-limit retry policy.

mod client;
mod error;
mod retry;

pub use client::{
    AspectRatio, ClipRequest, ClipStatus, GeminiClient, ImagePayload, PlanPayload, PlannedScene,
    DEFAULT_POLL_INTERVAL, DEFAULT_SCRIPT_MODEL, DEFAULT_VIDEO_MODEL, GEMINI_API_BASE_URL,
};
pub use error::{
    classify_response, scene_error_message, ApiErrorBody, GeminiError, GEMINI_API_KEY_ENV,
};
pub use retry::{
    call_with_retry, parse_retry_after, RetryPolicy, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS,
};
