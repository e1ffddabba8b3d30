//! The composer pipeline: plan, review, generate scene by scene, stitch.
//!
//! `Composer` drives a single run through its states and owns the one
//! mutable [`Plan`]. Scenes are generated strictly sequentially (the video
//! service enforces a low per-minute quota) and a scene failure halts the
//! run with everything after it left pending, so a later resume picks up
//! exactly where the run stopped.

use std::path::PathBuf;

use crate::assets::ClipStore;
use crate::gemini::{
    call_with_retry, scene_error_message, AspectRatio, ClipRequest, GeminiClient, GeminiError,
    ImagePayload, RetryPolicy,
};
use crate::plan::Plan;
use crate::planner::{draft_plan, PlanRequest};
use crate::stitcher::{Concatenator, StitchError};

/// State of one composer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Planning,
    Review,
    Generating,
    Stitching,
    Finished,
    Error,
}

/// Errors surfaced by the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Planning failed: {0}")]
    Planning(#[from] GeminiError),

    #[error("Video generation failed on Scene {scene_number}: {message}")]
    Scene { scene_number: u32, message: String },

    #[error(transparent)]
    Stitch(#[from] StitchError),

    #[error("No plan has been drafted yet")]
    NoPlan,

    #[error("Run is in state {actual:?}; expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: RunState,
    },

    #[error("Failed to prepare the clip directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Orchestrates one plan through planning, review, generation, and
/// stitching.
pub struct Composer {
    client: GeminiClient,
    clips: ClipStore,
    retry: RetryPolicy,
    aspect_ratio: AspectRatio,
    seed_image: Option<ImagePayload>,
    state: RunState,
    plan: Option<Plan>,
    last_error: Option<String>,
}

impl Composer {
    pub fn new(client: GeminiClient, clips: ClipStore) -> Self {
        Self {
            client,
            clips,
            retry: RetryPolicy::default(),
            aspect_ratio: AspectRatio::default(),
            seed_image: None,
            state: RunState::Idle,
            plan: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    /// The run-level message recorded when the state last became `Error`.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn set_retry_policy(&mut self, retry: RetryPolicy) {
        self.retry = retry;
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: AspectRatio) {
        self.aspect_ratio = aspect_ratio;
    }

    /// Attach the seed image. It is forwarded to generation only for the
    /// first scene.
    pub fn set_seed_image(&mut self, image: Option<ImagePayload>) {
        self.seed_image = image;
    }

    /// Draft a plan for the request and enter review.
    pub async fn draft(&mut self, request: &PlanRequest<'_>) -> Result<&Plan, PipelineError> {
        self.expect_state(
            matches!(self.state, RunState::Idle | RunState::Error),
            "Idle or Error",
        )?;
        self.state = RunState::Planning;
        self.last_error = None;

        match draft_plan(&self.client, request).await {
            Ok(plan) => {
                self.plan = Some(plan);
                self.state = RunState::Review;
                Ok(self.plan.as_ref().expect("plan just stored"))
            }
            Err(e) => {
                self.last_error = Some(if e.is_credential() {
                    "API Key Error. Configure a valid key and try again.".to_string()
                } else {
                    e.to_string()
                });
                self.state = RunState::Error;
                Err(PipelineError::Planning(e))
            }
        }
    }

    /// Load a previously saved plan (e.g. from history) and enter review.
    /// Completed scenes keep their clips, making the next generation pass a
    /// resume rather than a redo.
    pub fn load_plan(&mut self, plan: Plan) {
        self.plan = Some(plan);
        self.last_error = None;
        self.state = RunState::Review;
    }

    /// Replace a scene's script during review.
    pub fn update_scene_script(
        &mut self,
        index: usize,
        script: String,
    ) -> Result<(), PipelineError> {
        self.edit_scene(index, |scene| scene.script = script)
    }

    /// Replace a scene's visual prompt during review.
    pub fn update_scene_prompt(
        &mut self,
        index: usize,
        prompt: String,
    ) -> Result<(), PipelineError> {
        self.edit_scene(index, |scene| scene.prompt = prompt)
    }

    fn edit_scene(
        &mut self,
        index: usize,
        edit: impl FnOnce(&mut crate::plan::Scene),
    ) -> Result<(), PipelineError> {
        self.expect_state(self.state == RunState::Review, "Review")?;
        let plan = self.plan.as_mut().ok_or(PipelineError::NoPlan)?;
        let scene = plan.scenes.get_mut(index).ok_or(PipelineError::NoPlan)?;
        edit(scene);
        Ok(())
    }

    /// Generate clips for every scene that still needs one.
    ///
    /// Starts at the first scene that is not completed; earlier clips are
    /// carried forward untouched. Stops at the first failure: the failing
    /// scene is marked `Failed`, scenes after it stay `Pending`, and the run
    /// enters `Error`.
    pub async fn generate(&mut self) -> Result<(), PipelineError> {
        self.expect_state(self.state == RunState::Review, "Review")?;
        let plan = self.plan.as_mut().ok_or(PipelineError::NoPlan)?;
        self.state = RunState::Generating;

        let start = match plan.first_unfinished() {
            Some(idx) => idx,
            None => {
                // Everything already has a clip; go straight to stitching.
                self.state = RunState::Stitching;
                return Ok(());
            }
        };
        if start > 0 {
            log::info!(
                "Resuming generation at scene {} of {}",
                start + 1,
                plan.scenes.len()
            );
        }

        let plan_id = plan.id;
        let total_scenes = plan.scenes.len();
        if let Err(e) = self.clips.ensure_plan_dir(plan_id) {
            self.last_error = Some(format!("Failed to prepare the clip directory: {}", e));
            self.state = RunState::Error;
            return Err(PipelineError::Io(e));
        }
        for index in start..total_scenes {
            let scene = &mut plan.scenes[index];
            scene.begin_generation();
            log::info!("Generating scene {}/{}", scene.number, total_scenes);

            let request = ClipRequest {
                prompt: scene.prompt.clone(),
                aspect_ratio: self.aspect_ratio,
                // The seed image applies to the first scene only.
                image: if index == 0 {
                    self.seed_image.clone()
                } else {
                    None
                },
            };
            let dest = self.clips.clip_path(plan_id, scene.number, &scene.prompt);

            let client = &self.client;
            let result = call_with_retry(&self.retry, GeminiError::is_transient, || {
                client.generate_clip(&request, &dest)
            })
            .await;

            match result {
                Ok(clip) => {
                    scene.complete(clip);
                }
                Err(e) => {
                    let scene_number = scene.number;
                    let message = scene_error_message(&e);
                    log::error!("Scene {} failed: {} ({})", scene_number, message, e);
                    scene.fail(message.clone());
                    self.last_error = Some(format!(
                        "Video generation failed on Scene {}: {}",
                        scene_number, message
                    ));
                    self.state = RunState::Error;
                    return Err(PipelineError::Scene {
                        scene_number,
                        message,
                    });
                }
            }
        }

        self.state = RunState::Stitching;
        Ok(())
    }

    /// Stitch the completed clips into the final output.
    pub async fn stitch<C: Concatenator>(
        &mut self,
        concatenator: &C,
    ) -> Result<PathBuf, PipelineError> {
        self.expect_state(self.state == RunState::Stitching, "Stitching")?;
        let plan = self.plan.as_ref().ok_or(PipelineError::NoPlan)?;

        let clips: Vec<PathBuf> = plan.completed_clips().into_iter().map(Into::into).collect();
        if clips.is_empty() {
            self.last_error = Some(StitchError::NothingToStitch.to_string());
            self.state = RunState::Error;
            return Err(StitchError::NothingToStitch.into());
        }

        let output = self.clips.output_path(plan.id);
        match concatenator.concat(&clips, &output).await {
            Ok(()) => {
                self.state = RunState::Finished;
                Ok(output)
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                self.state = RunState::Error;
                Err(e.into())
            }
        }
    }

    /// Return from `Error` to `Review` so the user can edit and retry.
    /// Completed scenes keep their clips.
    pub fn resume_review(&mut self) -> Result<(), PipelineError> {
        self.expect_state(self.state == RunState::Error, "Error")?;
        if self.plan.is_none() {
            return Err(PipelineError::NoPlan);
        }
        self.state = RunState::Review;
        Ok(())
    }

    /// Discard the run entirely and return to `Idle`.
    pub fn reset(&mut self) {
        self.plan = None;
        self.seed_image = None;
        self.last_error = None;
        self.state = RunState::Idle;
    }

    fn expect_state(&self, ok: bool, expected: &'static str) -> Result<(), PipelineError> {
        if ok {
            Ok(())
        } else {
            Err(PipelineError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Scene, SceneStatus};

    fn composer() -> Composer {
        let client =
            GeminiClient::with_base_url("test-key".to_string(), "http://localhost:9".to_string())
                .unwrap();
        let dir = std::env::temp_dir().join("reel-composer-pipeline-tests");
        Composer::new(client, ClipStore::new(dir))
    }

    fn reviewable_plan() -> Plan {
        Plan::new(
            "t".to_string(),
            vec![
                Scene::new(1, "s1".into(), "p1".into()),
                Scene::new(2, "s2".into(), "p2".into()),
            ],
        )
    }

    #[test]
    fn test_initial_state_is_idle() {
        let composer = composer();
        assert_eq!(composer.state(), RunState::Idle);
        assert!(composer.plan().is_none());
        assert!(composer.last_error().is_none());
    }

    #[tokio::test]
    async fn test_generate_requires_review_state() {
        let mut composer = composer();
        let err = composer.generate().await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidState {
                actual: RunState::Idle,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_stitch_requires_stitching_state() {
        let mut composer = composer();
        let err = composer
            .stitch(&crate::stitcher::FfmpegConcatenator::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidState { .. }));
    }

    #[test]
    fn test_load_plan_enters_review() {
        let mut composer = composer();
        composer.load_plan(reviewable_plan());
        assert_eq!(composer.state(), RunState::Review);
        assert_eq!(composer.plan().unwrap().scenes.len(), 2);
    }

    #[test]
    fn test_review_edits_apply_to_plan() {
        let mut composer = composer();
        composer.load_plan(reviewable_plan());
        composer
            .update_scene_prompt(1, "a new prompt".to_string())
            .unwrap();
        composer
            .update_scene_script(0, "a new script".to_string())
            .unwrap();
        let plan = composer.plan().unwrap();
        assert_eq!(plan.scenes[1].prompt, "a new prompt");
        assert_eq!(plan.scenes[0].script, "a new script");
    }

    #[test]
    fn test_review_edits_rejected_outside_review() {
        let mut composer = composer();
        let err = composer
            .update_scene_prompt(0, "nope".to_string())
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidState { .. }));
    }

    #[test]
    fn test_resume_review_requires_error_state() {
        let mut composer = composer();
        assert!(matches!(
            composer.resume_review(),
            Err(PipelineError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_generate_with_all_scenes_done_skips_to_stitching() {
        let mut composer = composer();
        let mut plan = reviewable_plan();
        for (i, scene) in plan.scenes.iter_mut().enumerate() {
            scene.begin_generation();
            scene.complete(std::path::PathBuf::from(format!("/clips/{}.mp4", i)));
        }
        composer.load_plan(plan);
        composer.generate().await.unwrap();
        assert_eq!(composer.state(), RunState::Stitching);
        assert!(composer
            .plan()
            .unwrap()
            .scenes
            .iter()
            .all(|s| s.status == SceneStatus::Completed));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut composer = composer();
        composer.load_plan(reviewable_plan());
        composer.reset();
        assert_eq!(composer.state(), RunState::Idle);
        assert!(composer.plan().is_none());
    }
}
