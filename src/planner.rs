//! Scene planning: turns a free-form brief into a reviewable [`Plan`].
//!
//! The number of scenes is derived from a duration expression in the brief
//! ("a 20 second spot" -> 4 scenes); the script model then fills in a title,
//! per-scene scripts, and video prompts.

use crate::gemini::{GeminiClient, GeminiError, PlanPayload};
use crate::persona::Persona;
use crate::plan::{MarketingMetrics, Plan, Scene};

/// Shortest commercial the planner will target, in seconds.
pub const MIN_DURATION_SECS: u32 = 5;

/// Longest commercial the planner will target, in seconds.
pub const MAX_DURATION_SECS: u32 = 30;

/// Each scene covers roughly this many seconds of output.
pub const SECONDS_PER_SCENE: u32 = 5;

/// Scene count used when the brief names no duration.
pub const DEFAULT_SCENE_COUNT: u32 = 3;

/// Everything the planner needs to draft one plan.
#[derive(Debug, Clone)]
pub struct PlanRequest<'a> {
    /// The user's free-form brief.
    pub brief: &'a str,
    /// Whether a seed image accompanies the brief. The image itself stays
    /// with the pipeline; planning only needs to know it exists.
    pub has_seed_image: bool,
    pub persona: &'a Persona,
    /// Profile metrics, consumed by the marketer persona.
    pub metrics: Option<&'a MarketingMetrics>,
}

/// Extract a requested duration in seconds from the brief, if present.
///
/// Matches an integer followed by a seconds word (`seconds`, `second`,
/// `sec`, `s`) as a whole word, allowing whitespace and a single hyphen in
/// between ("12 second", "12-second", "30s"). Case-insensitive.
pub fn requested_duration_secs(text: &str) -> Option<u32> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if let Ok(value) = text[start..i].parse::<u32>() {
            let mut j = i;
            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            if j < bytes.len() && bytes[j] == b'-' {
                j += 1;
            }
            if seconds_unit_at(bytes, j) {
                return Some(value);
            }
        }
    }
    None
}

/// Whether a seconds unit word starts at `pos` and ends on a word boundary.
fn seconds_unit_at(bytes: &[u8], pos: usize) -> bool {
    const UNITS: [&str; 4] = ["seconds", "second", "sec", "s"];
    let rest = &bytes[pos.min(bytes.len())..];
    for unit in UNITS {
        let unit = unit.as_bytes();
        if rest.len() >= unit.len() && rest[..unit.len()].eq_ignore_ascii_case(unit) {
            let boundary = rest
                .get(unit.len())
                .map_or(true, |b| !b.is_ascii_alphanumeric());
            if boundary {
                return true;
            }
        }
    }
    false
}

/// Derive the scene count for a brief.
///
/// A found duration is clamped to [`MIN_DURATION_SECS`, `MAX_DURATION_SECS`]
/// and divided into [`SECONDS_PER_SCENE`]-second scenes, rounding up; briefs
/// without a duration get [`DEFAULT_SCENE_COUNT`] scenes.
pub fn scene_count_for(text: &str) -> u32 {
    match requested_duration_secs(text) {
        Some(duration) => {
            let clamped = duration.clamp(MIN_DURATION_SECS, MAX_DURATION_SECS);
            clamped.div_ceil(SECONDS_PER_SCENE)
        }
        None => DEFAULT_SCENE_COUNT,
    }
}

/// Compose the full planning prompt: persona instruction, optional metrics
/// context, seed-image note, task statement, and the user brief.
pub fn compose_planning_prompt(request: &PlanRequest<'_>, scene_count: u32) -> String {
    let mut prompt = format!(
        "You are an AI video production agent with the following persona: \"{}\".\n",
        request.persona.instruction
    );

    if let (true, Some(metrics)) = (request.persona.uses_marketing_data(), request.metrics) {
        prompt.push_str(&format!(
            "\nCRITICAL DATA CONTEXT:\n\
             You are analyzing the user's {} profile.\n\
             - Avg engagement: {}\n\
             - Top demographic: {}\n\
             - Retention dropoff point: {}\n\n\
             STRATEGY:\n\
             - The video MUST counter the retention dropoff at {} with a visual change or surprise exactly then.\n\
             - Tailor the visual style to appeal to {}.\n",
            metrics.platform,
            metrics.engagement_rate,
            metrics.top_demographic,
            metrics.retention_dropoff,
            metrics.retention_dropoff,
            metrics.top_demographic,
        ));
    }

    prompt.push_str(&format!(
        "\nTask: based on the user request, create a plan for a short video composed of \
         exactly {} connected scenes. For each scene provide a script and a detailed \
         visual prompt for a text-to-video generation model.\n",
        scene_count
    ));

    if request.has_seed_image {
        prompt.push_str(
            "The user has provided a starting image for the first scene. The prompt for \
             scene 1 should describe an action or evolution based on this image.\n",
        );
    }

    prompt.push_str(&format!("\nUser request: \"{}\"\n", request.brief));
    prompt
}

/// Build a pending [`Plan`] from the model's payload.
///
/// A scene-count mismatch between what was requested and what came back is
/// logged as a warning and accepted as-is; an empty plan is an error.
pub fn plan_from_payload(
    payload: PlanPayload,
    request: &PlanRequest<'_>,
    requested_scenes: u32,
) -> Result<Plan, GeminiError> {
    if payload.scenes.is_empty() {
        return Err(GeminiError::EmptyPlan);
    }
    if payload.scenes.len() as u32 != requested_scenes {
        log::warn!(
            "Model returned {} scenes, expected {}. Accepting the returned plan.",
            payload.scenes.len(),
            requested_scenes
        );
    }

    let scenes = payload
        .scenes
        .into_iter()
        .map(|s| Scene::new(s.scene_number, s.script, s.prompt))
        .collect();
    let mut plan = Plan::new(payload.title, scenes);
    plan.persona_id = Some(request.persona.id.to_string());
    plan.marketing = request.metrics.cloned();
    Ok(plan)
}

/// Draft a plan for the given request.
///
/// Credential failures (`MissingApiKey`, `Auth`) pass through untouched so
/// callers can prompt for re-authorization; everything else surfaces as the
/// underlying planning failure.
pub async fn draft_plan(
    client: &GeminiClient,
    request: &PlanRequest<'_>,
) -> Result<Plan, GeminiError> {
    let scene_count = scene_count_for(request.brief);
    log::info!(
        "Drafting a {}-scene plan with persona '{}'",
        scene_count,
        request.persona.id
    );

    let prompt = compose_planning_prompt(request, scene_count);
    let payload = client.generate_plan(&prompt).await?;
    plan_from_payload(payload, request, scene_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::PlannedScene;
    use crate::persona;
    use crate::plan::SceneStatus;

    #[test]
    fn test_duration_extraction() {
        assert_eq!(requested_duration_secs("make a 12 second ad"), Some(12));
        assert_eq!(requested_duration_secs("a 30s teaser"), Some(30));
        assert_eq!(requested_duration_secs("a 15-second spot"), Some(15));
        assert_eq!(requested_duration_secs("about 20 sec please"), Some(20));
        assert_eq!(requested_duration_secs("20 SECONDS of action"), Some(20));
        assert_eq!(requested_duration_secs("something cool"), None);
    }

    #[test]
    fn test_duration_requires_word_boundary() {
        // "3 sandwiches" is not "3 s".
        assert_eq!(requested_duration_secs("3 sandwiches"), None);
        // "secs" matches neither "sec" nor "s" on a boundary.
        assert_eq!(requested_duration_secs("5 secs"), None);
        assert_eq!(requested_duration_secs("version 2 series"), None);
    }

    #[test]
    fn test_scene_count_examples() {
        assert_eq!(scene_count_for("make a 12 second ad"), 3);
        assert_eq!(scene_count_for("a 2 second clip"), 1);
        assert_eq!(scene_count_for("something cool"), 3);
    }

    #[test]
    fn test_scene_count_clamps_both_ends() {
        // Below range: clamp to 5 -> 1 scene.
        assert_eq!(scene_count_for("1 second sting"), 1);
        // Above range: clamp to 30 -> 6 scenes.
        assert_eq!(scene_count_for("a 90 second epic"), 6);
        assert_eq!(scene_count_for("a 30 second spot"), 6);
        assert_eq!(scene_count_for("a 5 second bumper"), 1);
    }

    #[test]
    fn test_scene_count_rounds_up() {
        assert_eq!(scene_count_for("an 11 second ad"), 3);
        assert_eq!(scene_count_for("a 16 second ad"), 4);
    }

    fn request<'a>(brief: &'a str, metrics: Option<&'a MarketingMetrics>) -> PlanRequest<'a> {
        PlanRequest {
            brief,
            has_seed_image: false,
            persona: persona::find(if metrics.is_some() { "marketer" } else { "director" })
                .unwrap(),
            metrics,
        }
    }

    #[test]
    fn test_prompt_carries_persona_and_brief() {
        let req = request("launch our new espresso line", None);
        let prompt = compose_planning_prompt(&req, 3);
        assert!(prompt.contains("cinematographic director"));
        assert!(prompt.contains("exactly 3 connected scenes"));
        assert!(prompt.contains("launch our new espresso line"));
        assert!(!prompt.contains("CRITICAL DATA CONTEXT"));
        assert!(!prompt.contains("starting image"));
    }

    #[test]
    fn test_prompt_includes_metrics_for_marketer() {
        let metrics = MarketingMetrics::demo();
        let req = request("grow the channel", Some(&metrics));
        let prompt = compose_planning_prompt(&req, 4);
        assert!(prompt.contains("CRITICAL DATA CONTEXT"));
        assert!(prompt.contains("TikTok"));
        assert!(prompt.contains("Gen Z (18-24)"));
    }

    #[test]
    fn test_prompt_notes_seed_image() {
        let mut req = request("a drifting paper boat", None);
        req.has_seed_image = true;
        let prompt = compose_planning_prompt(&req, 2);
        assert!(prompt.contains("starting image"));
    }

    fn payload(scene_count: usize) -> PlanPayload {
        let json = serde_json::json!({
            "title": "Test Reel",
            "scenes": (1..=scene_count).map(|n| serde_json::json!({
                "sceneNumber": n,
                "script": format!("script {}", n),
                "prompt": format!("prompt {}", n),
            })).collect::<Vec<_>>(),
        });
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_plan_from_payload_marks_scenes_pending() {
        let req = request("a 12 second ad", None);
        let plan = plan_from_payload(payload(3), &req, 3).unwrap();
        assert_eq!(plan.title, "Test Reel");
        assert_eq!(plan.scenes.len(), 3);
        assert!(plan
            .scenes
            .iter()
            .all(|s| s.status == SceneStatus::Pending));
        assert_eq!(plan.persona_id.as_deref(), Some("director"));
    }

    #[test]
    fn test_plan_from_payload_accepts_count_mismatch() {
        // The model ignored the requested count; the plan is kept anyway.
        let req = request("a 20 second ad", None);
        let plan = plan_from_payload(payload(2), &req, 4).unwrap();
        assert_eq!(plan.scenes.len(), 2);
    }

    #[test]
    fn test_plan_from_payload_rejects_empty() {
        let req = request("anything", None);
        let result = plan_from_payload(payload(0), &req, 3);
        assert!(matches!(result, Err(GeminiError::EmptyPlan)));
    }

    #[test]
    fn test_plan_from_payload_fixes_bad_numbering() {
        let bad = PlanPayload {
            title: "t".to_string(),
            scenes: vec![
                PlannedScene {
                    scene_number: 4,
                    script: "a".to_string(),
                    prompt: "p".to_string(),
                },
                PlannedScene {
                    scene_number: 9,
                    script: "b".to_string(),
                    prompt: "q".to_string(),
                },
            ],
        };
        let req = request("x", None);
        let plan = plan_from_payload(bad, &req, 2).unwrap();
        let numbers: Vec<u32> = plan.scenes.iter().map(|s| s.number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }
}
