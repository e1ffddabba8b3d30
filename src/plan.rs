//! Plan and Scene data model.
//!
//! A `Plan` is the full multi-scene script-and-prompt package produced for one
//! user brief. Scenes carry their own generation lifecycle and are mutated in
//! place as the pipeline advances them.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generation lifecycle of a single scene.
///
/// Transitions are one-directional within a run:
/// `Pending -> Generating -> {Completed | Failed}`. A failed scene is only
/// re-entered into `Generating` when the user explicitly resumes a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

/// One shot within a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    /// 1-based sequence number, unique within the plan and equal to
    /// array position + 1.
    pub number: u32,
    /// Short narration / action description for the shot.
    pub script: String,
    /// Visual prompt handed to the video-generation model.
    pub prompt: String,
    /// Local path of the generated clip, set once generation succeeds.
    #[serde(default)]
    pub clip: Option<PathBuf>,
    pub status: SceneStatus,
    /// Human-readable failure classification, set once generation fails.
    #[serde(default)]
    pub error: Option<String>,
}

impl Scene {
    /// Create a fresh pending scene.
    pub fn new(number: u32, script: String, prompt: String) -> Self {
        Self {
            number,
            script,
            prompt,
            clip: None,
            status: SceneStatus::Pending,
            error: None,
        }
    }

    /// Mark the scene as in flight. Clears any error left over from a
    /// previous run so a resumed scene starts clean.
    pub fn begin_generation(&mut self) {
        self.status = SceneStatus::Generating;
        self.error = None;
    }

    /// Mark the scene completed with its clip path.
    pub fn complete(&mut self, clip: PathBuf) {
        debug_assert!(
            !clip.as_os_str().is_empty(),
            "completed scene requires a clip path"
        );
        self.clip = Some(clip);
        self.status = SceneStatus::Completed;
        self.error = None;
    }

    /// Mark the scene failed with a non-empty message.
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug_assert!(!message.is_empty(), "failed scene requires a message");
        self.status = SceneStatus::Failed;
        self.error = Some(if message.is_empty() {
            "Unknown error".to_string()
        } else {
            message
        });
    }

    /// Whether this scene still needs a generation attempt.
    pub fn needs_generation(&self) -> bool {
        self.status != SceneStatus::Completed
    }
}

/// The full script-and-prompt package for one user request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    /// Creation time as unix milliseconds.
    pub created_at_ms: u64,
    pub title: String,
    pub scenes: Vec<Scene>,
    /// Persona that drafted the plan, if one was selected.
    #[serde(default)]
    pub persona_id: Option<String>,
    /// Marketing context the marketer persona planned against.
    #[serde(default)]
    pub marketing: Option<MarketingMetrics>,
}

impl Plan {
    /// Build a plan from planner output, renumbering scenes so that sequence
    /// numbers are contiguous from 1 and match array position.
    pub fn new(title: String, mut scenes: Vec<Scene>) -> Self {
        for (idx, scene) in scenes.iter_mut().enumerate() {
            scene.number = idx as u32 + 1;
        }
        Self {
            id: Uuid::new_v4(),
            created_at_ms: unix_millis(),
            title,
            scenes,
            persona_id: None,
            marketing: None,
        }
    }

    /// Index of the first scene that is not yet completed, if any.
    /// This is where a (re)entered generation pass starts.
    pub fn first_unfinished(&self) -> Option<usize> {
        self.scenes.iter().position(Scene::needs_generation)
    }

    /// Whether every scene has a completed clip.
    pub fn all_completed(&self) -> bool {
        self.first_unfinished().is_none()
    }

    /// Clip paths of completed scenes, in scene order.
    pub fn completed_clips(&self) -> Vec<&Path> {
        self.scenes
            .iter()
            .filter(|s| s.status == SceneStatus::Completed)
            .filter_map(|s| s.clip.as_deref())
            .collect()
    }

    /// One-line status summary, e.g. `3/4 scenes completed`.
    pub fn progress_summary(&self) -> String {
        let done = self
            .scenes
            .iter()
            .filter(|s| s.status == SceneStatus::Completed)
            .count();
        format!("{}/{} scenes completed", done, self.scenes.len())
    }
}

/// Social-profile metrics the marketer persona plans against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketingMetrics {
    pub platform: String,
    pub followers: String,
    pub avg_views: String,
    pub engagement_rate: String,
    pub top_demographic: String,
    /// Point in the video where viewers drop off, e.g. "3s".
    pub retention_dropoff: String,
}

impl MarketingMetrics {
    /// Bundled demo profile used when no live analytics source is wired up.
    pub fn demo() -> Self {
        Self {
            platform: "TikTok".to_string(),
            followers: "12.4K".to_string(),
            avg_views: "4.2K".to_string(),
            engagement_rate: "8.5%".to_string(),
            top_demographic: "Gen Z (18-24)".to_string(),
            retention_dropoff: "3s".to_string(),
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
