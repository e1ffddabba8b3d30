//! ClipStore - on-disk home for generated scene clips and stitched outputs.
//!
//! Clips live under one directory per plan. Filenames mix the scene number
//! with a short prompt hash, so regenerating a scene with an edited prompt
//! lands in a fresh file instead of overwriting the old clip.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// On-disk store for generated clips, one subdirectory per plan.
pub struct ClipStore {
    root: PathBuf,
}

impl ClipStore {
    /// Create a store rooted at `root`. Directories are created on demand.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create a store under the platform cache directory,
    /// e.g. `~/.cache/reel-composer/clips/`.
    pub fn with_default_dir() -> Self {
        let root = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("reel-composer")
            .join("clips");
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Destination path for one scene's clip.
    pub fn clip_path(&self, plan_id: Uuid, scene_number: u32, prompt: &str) -> PathBuf {
        self.plan_dir(plan_id).join(format!(
            "scene-{}-{}.mp4",
            scene_number,
            prompt_hash(prompt)
        ))
    }

    /// Destination path for the stitched output of a plan.
    pub fn output_path(&self, plan_id: Uuid) -> PathBuf {
        self.plan_dir(plan_id).join("output.mp4")
    }

    /// Ensure the plan's directory exists.
    pub fn ensure_plan_dir(&self, plan_id: Uuid) -> Result<(), std::io::Error> {
        std::fs::create_dir_all(self.plan_dir(plan_id))
    }

    /// Remove all stored files for a plan. Missing directories are fine.
    pub fn clear_plan(&self, plan_id: Uuid) -> Result<(), std::io::Error> {
        match std::fs::remove_dir_all(self.plan_dir(plan_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Total size in bytes of everything stored for a plan.
    pub fn plan_size_bytes(&self, plan_id: Uuid) -> Result<u64, std::io::Error> {
        let dir = self.plan_dir(plan_id);
        if !dir.exists() {
            return Ok(0);
        }
        let mut total = 0;
        for entry in std::fs::read_dir(dir)? {
            let metadata = entry?.metadata()?;
            if metadata.is_file() {
                total += metadata.len();
            }
        }
        Ok(total)
    }

    fn plan_dir(&self, plan_id: Uuid) -> PathBuf {
        self.root.join(plan_id.to_string())
    }
}

/// Short deterministic hash of a prompt (first 8 hex chars of sha256).
fn prompt_hash(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..4])
}
