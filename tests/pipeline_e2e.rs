//! End-to-end pipeline tests against a mock HTTP server.
//!
//! These drive the composer through plan -> review -> generate -> stitch and
//! pin down the resume, first-failure, seed-image, and retry behaviors.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reel_composer::assets::ClipStore;
use reel_composer::gemini::{GeminiClient, ImagePayload, RetryPolicy};
use reel_composer::persona;
use reel_composer::pipeline::{Composer, PipelineError, RunState};
use reel_composer::plan::{Plan, Scene, SceneStatus};
use reel_composer::planner::PlanRequest;
use reel_composer::stitcher::{Concatenator, StitchError};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SUBMIT_PATH: &str = "/v1beta/models/test-video:predictLongRunning";
const PLAN_PATH: &str = "/v1beta/models/test-script:generateContent";

fn composer_for(server: &MockServer, clips_dir: &Path) -> Composer {
    let mut client =
        GeminiClient::with_base_url("test-api-key".to_string(), server.uri()).unwrap();
    client.set_models("test-script".to_string(), "test-video".to_string());
    client.set_poll_interval(Duration::from_millis(2));

    let mut composer = Composer::new(client, ClipStore::new(clips_dir.to_path_buf()));
    composer.set_retry_policy(RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(2),
    });
    composer
}

fn plan_response(scenes: &[&str]) -> serde_json::Value {
    let inner = serde_json::json!({
        "title": "Test Reel",
        "scenes": scenes.iter().enumerate().map(|(i, prompt)| serde_json::json!({
            "sceneNumber": i + 1,
            "script": format!("script {}", i + 1),
            "prompt": prompt,
        })).collect::<Vec<_>>(),
    });
    serde_json::json!({
        "candidates": [{"content": {"parts": [{"text": inner.to_string()}]}}]
    })
}

/// Mount a planning endpoint returning the given scene prompts.
async fn mount_planner(server: &MockServer, scenes: &[&str]) {
    Mock::given(method("POST"))
        .and(path(PLAN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(plan_response(scenes)))
        .mount(server)
        .await;
}

/// Mount submit/poll/download mocks that succeed for any prompt.
async fn mount_successful_generation(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(SUBMIT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "operations/ok"
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1beta/operations/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "operations/ok",
            "done": true,
            "response": {
                "generateVideoResponse": {
                    "generatedSamples": [
                        {"video": {"uri": format!("{}/files/clip.mp4", server.uri())}}
                    ]
                }
            }
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/clip.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"clip-bytes".to_vec()))
        .mount(server)
        .await;
}

/// Submit request bodies received so far, in order.
async fn submit_bodies(server: &MockServer) -> Vec<serde_json::Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == SUBMIT_PATH)
        .map(|r| r.body_json().unwrap())
        .collect()
}

fn draft_request(brief: &str) -> PlanRequest<'_> {
    PlanRequest {
        brief,
        has_seed_image: false,
        persona: persona::find("director").unwrap(),
        metrics: None,
    }
}

/// Concatenates clip bytes in order; stands in for ffmpeg.
struct FakeConcatenator;

impl Concatenator for FakeConcatenator {
    async fn concat(&self, clips: &[PathBuf], output: &Path) -> Result<(), StitchError> {
        let mut joined = Vec::new();
        for clip in clips {
            joined.extend(std::fs::read(clip)?);
        }
        std::fs::write(output, joined)?;
        Ok(())
    }
}

#[tokio::test]
async fn test_full_run_plan_generate_stitch() {
    let server = MockServer::start().await;
    mount_planner(&server, &["p1", "p2"]).await;
    mount_successful_generation(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let mut composer = composer_for(&server, dir.path());

    composer.draft(&draft_request("a 10 second ad")).await.unwrap();
    assert_eq!(composer.state(), RunState::Review);
    assert_eq!(composer.plan().unwrap().scenes.len(), 2);

    composer.generate().await.unwrap();
    assert_eq!(composer.state(), RunState::Stitching);
    let plan = composer.plan().unwrap();
    assert!(plan
        .scenes
        .iter()
        .all(|s| s.status == SceneStatus::Completed));

    let output = composer.stitch(&FakeConcatenator).await.unwrap();
    assert_eq!(composer.state(), RunState::Finished);
    // Two clips of identical bytes, concatenated in order.
    assert_eq!(std::fs::read(output).unwrap(), b"clip-bytesclip-bytes");
}

#[tokio::test]
async fn test_first_scene_failure_halts_run() {
    let server = MockServer::start().await;
    mount_planner(&server, &["p1", "p2", "p3", "p4"]).await;

    // Scene 2's prompt is rejected by content policy; everything else is
    // allowed to generate.
    Mock::given(method("POST"))
        .and(path(SUBMIT_PATH))
        .and(body_partial_json(serde_json::json!({
            "instances": [{"prompt": "p2"}]
        })))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": {"code": 400, "status": "INVALID_ARGUMENT", "message": "unsafe"}
        })))
        .mount(&server)
        .await;
    mount_successful_generation(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let mut composer = composer_for(&server, dir.path());
    composer.draft(&draft_request("a 20 second ad")).await.unwrap();

    let err = composer.generate().await.unwrap_err();
    match err {
        PipelineError::Scene {
            scene_number,
            message,
        } => {
            assert_eq!(scene_number, 2);
            assert_eq!(message, "Content policy violation");
        }
        other => panic!("expected Scene error, got {:?}", other),
    }

    assert_eq!(composer.state(), RunState::Error);
    assert!(composer
        .last_error()
        .unwrap()
        .contains("Video generation failed on Scene 2"));

    let scenes = &composer.plan().unwrap().scenes;
    assert_eq!(scenes[0].status, SceneStatus::Completed);
    assert_eq!(scenes[1].status, SceneStatus::Failed);
    assert_eq!(scenes[1].error.as_deref(), Some("Content policy violation"));
    // Later scenes are never attempted.
    assert_eq!(scenes[2].status, SceneStatus::Pending);
    assert_eq!(scenes[3].status, SceneStatus::Pending);
    let bodies = submit_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
}

#[tokio::test]
async fn test_resume_starts_at_first_unfinished_scene() {
    let server = MockServer::start().await;
    mount_successful_generation(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let mut composer = composer_for(&server, dir.path());

    // Two scenes already carry clips from an earlier run.
    let done1 = dir.path().join("done1.mp4");
    let done2 = dir.path().join("done2.mp4");
    std::fs::write(&done1, b"one").unwrap();
    std::fs::write(&done2, b"two").unwrap();

    let mut plan = Plan::new(
        "resumed".to_string(),
        vec![
            Scene::new(1, "s1".into(), "p1".into()),
            Scene::new(2, "s2".into(), "p2".into()),
            Scene::new(3, "s3".into(), "p3".into()),
            Scene::new(4, "s4".into(), "p4".into()),
        ],
    );
    plan.scenes[0].begin_generation();
    plan.scenes[0].complete(done1.clone());
    plan.scenes[1].begin_generation();
    plan.scenes[1].complete(done2.clone());

    composer.load_plan(plan);
    composer.generate().await.unwrap();
    assert_eq!(composer.state(), RunState::Stitching);

    // Only the two unfinished scenes hit the API, in order.
    let bodies = submit_bodies(&server).await;
    let prompts: Vec<&str> = bodies
        .iter()
        .map(|b| b["instances"][0]["prompt"].as_str().unwrap())
        .collect();
    assert_eq!(prompts, vec!["p3", "p4"]);

    // The carried-forward clips are untouched.
    let scenes = &composer.plan().unwrap().scenes;
    assert_eq!(scenes[0].clip.as_deref(), Some(done1.as_path()));
    assert_eq!(scenes[1].clip.as_deref(), Some(done2.as_path()));
    assert!(scenes.iter().all(|s| s.status == SceneStatus::Completed));
}

#[tokio::test]
async fn test_seed_image_attached_to_first_scene_only() {
    let server = MockServer::start().await;
    mount_successful_generation(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let mut composer = composer_for(&server, dir.path());
    composer.set_seed_image(Some(ImagePayload {
        data: "c2VlZA==".to_string(),
        mime_type: "image/png".to_string(),
    }));

    composer.load_plan(Plan::new(
        "seeded".to_string(),
        vec![
            Scene::new(1, "s1".into(), "p1".into()),
            Scene::new(2, "s2".into(), "p2".into()),
        ],
    ));
    composer.generate().await.unwrap();

    let bodies = submit_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    assert_eq!(
        bodies[0]["instances"][0]["image"]["bytesBase64Encoded"],
        "c2VlZA=="
    );
    assert_eq!(bodies[0]["instances"][0]["image"]["mimeType"], "image/png");
    // The second scene's request carries no image field at all.
    assert!(bodies[1]["instances"][0].get("image").is_none());
}

#[tokio::test]
async fn test_persistent_rate_limit_exhausts_retries_then_fails_scene() {
    let server = MockServer::start().await;
    mount_planner(&server, &["p1"]).await;

    Mock::given(method("POST"))
        .and(path(SUBMIT_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "error": {"code": 429, "status": "RESOURCE_EXHAUSTED", "message": "quota"}
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut composer = composer_for(&server, dir.path());
    composer.draft(&draft_request("a 2 second clip")).await.unwrap();

    let err = composer.generate().await.unwrap_err();
    assert!(matches!(err, PipelineError::Scene { scene_number: 1, .. }));

    // The policy allows 3 attempts; all of them were made, then the scene
    // failed with the quota classification.
    let bodies = submit_bodies(&server).await;
    assert_eq!(bodies.len(), 3);
    let scenes = &composer.plan().unwrap().scenes;
    assert_eq!(scenes[0].status, SceneStatus::Failed);
    assert_eq!(scenes[0].error.as_deref(), Some("Quota Exceeded"));
}

#[tokio::test]
async fn test_fatal_error_does_not_retry() {
    let server = MockServer::start().await;
    mount_planner(&server, &["p1"]).await;

    Mock::given(method("POST"))
        .and(path(SUBMIT_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": {"code": 404, "status": "NOT_FOUND", "message": "no such model"}
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut composer = composer_for(&server, dir.path());
    composer.draft(&draft_request("a 2 second clip")).await.unwrap();

    let err = composer.generate().await.unwrap_err();
    assert!(matches!(err, PipelineError::Scene { .. }));

    // Exactly one attempt: credential errors abort immediately.
    let bodies = submit_bodies(&server).await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(
        composer.plan().unwrap().scenes[0].error.as_deref(),
        Some("API Key Error")
    );
}

#[tokio::test]
async fn test_planning_credential_error_enters_error_state() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(PLAN_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": {"code": 404, "status": "NOT_FOUND", "message": "key not found"}
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut composer = composer_for(&server, dir.path());
    let err = composer
        .draft(&draft_request("anything"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Planning(_)));
    assert_eq!(composer.state(), RunState::Error);
    assert!(composer.last_error().unwrap().contains("API Key Error"));
}

#[tokio::test]
async fn test_scene_count_mismatch_is_accepted() {
    let server = MockServer::start().await;
    // The brief asks for 4 scenes (20 seconds), the model returns 2.
    mount_planner(&server, &["p1", "p2"]).await;

    let dir = tempfile::tempdir().unwrap();
    let mut composer = composer_for(&server, dir.path());
    composer.draft(&draft_request("a 20 second ad")).await.unwrap();

    assert_eq!(composer.state(), RunState::Review);
    assert_eq!(composer.plan().unwrap().scenes.len(), 2);
}

#[tokio::test]
async fn test_resume_review_after_failure_allows_regenerate() {
    let server = MockServer::start().await;
    mount_planner(&server, &["p1"]).await;

    // First submit attempt fails hard, later attempts succeed.
    Mock::given(method("POST"))
        .and(path(SUBMIT_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "error": {"code": 500, "status": "INTERNAL", "message": "backend error"}
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_successful_generation(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let mut composer = composer_for(&server, dir.path());
    composer.draft(&draft_request("a 2 second clip")).await.unwrap();

    assert!(composer.generate().await.is_err());
    assert_eq!(composer.state(), RunState::Error);

    // The user resumes into review and retries; the failed scene is
    // re-attempted and the run reaches stitching.
    composer.resume_review().unwrap();
    composer.generate().await.unwrap();
    assert_eq!(composer.state(), RunState::Stitching);
    assert_eq!(
        composer.plan().unwrap().scenes[0].status,
        SceneStatus::Completed
    );
}

#[tokio::test]
async fn test_stitch_with_no_clips_fails_without_invoking_concatenator() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut composer = composer_for(&server, dir.path());

    // A plan with no scenes sails straight to stitching, where the empty
    // clip list is rejected before any concatenation work happens.
    composer.load_plan(Plan::new("empty".to_string(), vec![]));
    composer.generate().await.unwrap();
    assert_eq!(composer.state(), RunState::Stitching);

    let err = composer.stitch(&PanickingConcatenator).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Stitch(StitchError::NothingToStitch)
    ));
    assert_eq!(composer.state(), RunState::Error);
}

#[tokio::test]
async fn test_clip_read_failure_during_stitch_enters_error_state() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut composer = composer_for(&server, dir.path());

    let mut plan = Plan::new(
        "broken".to_string(),
        vec![Scene::new(1, "s".into(), "p".into())],
    );
    plan.scenes[0].begin_generation();
    plan.scenes[0].complete(dir.path().join("gone.mp4"));
    composer.load_plan(plan);
    composer.generate().await.unwrap();

    let err = composer.stitch(&FailingReader).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Stitch(StitchError::ClipUnreadable { scene_number: 1, .. })
    ));
    assert_eq!(composer.state(), RunState::Error);
    assert!(composer
        .last_error()
        .unwrap()
        .contains("Could not read the clip for Scene 1"));
}

/// A concatenator that must never be invoked.
struct PanickingConcatenator;

impl Concatenator for PanickingConcatenator {
    async fn concat(&self, _clips: &[PathBuf], _output: &Path) -> Result<(), StitchError> {
        panic!("concatenator must not run for an empty clip list");
    }
}

/// A concatenator that fails like a missing per-scene download.
struct FailingReader;

impl Concatenator for FailingReader {
    async fn concat(&self, clips: &[PathBuf], _output: &Path) -> Result<(), StitchError> {
        Err(StitchError::ClipUnreadable {
            scene_number: 1,
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("missing {}", clips[0].display()),
            ),
        })
    }
}
