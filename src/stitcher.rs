//! Clip concatenation.
//!
//! The pipeline only depends on the [`Concatenator`] seam; the shipped
//! implementation stages clips into a scratch directory and runs ffmpeg's
//! concat demuxer in copy mode, so clips are joined without re-encoding.

use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Errors from the stitching step.
#[derive(Debug, thiserror::Error)]
pub enum StitchError {
    #[error("No clips were generated, so there is nothing to stitch")]
    NothingToStitch,

    /// A specific clip could not be read back from disk.
    #[error("Could not read the clip for Scene {scene_number}")]
    ClipUnreadable {
        scene_number: u32,
        source: std::io::Error,
    },

    #[error("ffmpeg not found. Install it and make sure it is on PATH")]
    FfmpegNotFound,

    #[error("A file processing error occurred during video stitching: {0}")]
    Processing(String),

    #[error("IO error during stitching: {0}")]
    Io(#[from] std::io::Error),
}

/// Joins ordered clips into one output file.
#[allow(async_fn_in_trait)]
pub trait Concatenator {
    /// Concatenate `clips` in order into `output`.
    ///
    /// `clips` must be non-empty; implementations fail with
    /// [`StitchError::NothingToStitch`] otherwise.
    async fn concat(&self, clips: &[PathBuf], output: &Path) -> Result<(), StitchError>;
}

/// Name of the staged copy of the clip at position `index`.
fn staged_name(index: usize) -> String {
    format!("scene{}.mp4", index)
}

/// Concat-demuxer manifest listing the staged entries in order.
fn build_manifest(clip_count: usize) -> String {
    (0..clip_count)
        .map(|i| format!("file '{}'\n", staged_name(i)))
        .collect()
}

/// ffmpeg-backed concatenation without re-encoding.
#[derive(Debug, Default)]
pub struct FfmpegConcatenator;

impl FfmpegConcatenator {
    pub fn new() -> Self {
        Self
    }
}

impl Concatenator for FfmpegConcatenator {
    async fn concat(&self, clips: &[PathBuf], output: &Path) -> Result<(), StitchError> {
        if clips.is_empty() {
            return Err(StitchError::NothingToStitch);
        }

        let staging = std::env::temp_dir()
            .join("reel-composer")
            .join(format!("stitch-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&staging).await?;

        let result = stage_and_run(clips, output, &staging).await;

        // Best effort; a leftover scratch directory is harmless.
        let _ = tokio::fs::remove_dir_all(&staging).await;
        result
    }
}

async fn stage_and_run(
    clips: &[PathBuf],
    output: &Path,
    staging: &Path,
) -> Result<(), StitchError> {
    for (i, clip) in clips.iter().enumerate() {
        tokio::fs::copy(clip, staging.join(staged_name(i)))
            .await
            .map_err(|e| StitchError::ClipUnreadable {
                scene_number: i as u32 + 1,
                source: e,
            })?;
    }

    let manifest_path = staging.join("list.txt");
    tokio::fs::write(&manifest_path, build_manifest(clips.len())).await?;

    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    // ffmpeg runs inside the staging directory, so the output path must not
    // be relative to the caller's working directory.
    let output = if output.is_absolute() {
        output.to_path_buf()
    } else {
        std::env::current_dir()?.join(output)
    };

    log::info!("Stitching {} clips into {}", clips.len(), output.display());
    let result = tokio::process::Command::new("ffmpeg")
        .current_dir(staging)
        .args(["-y", "-f", "concat", "-safe", "0", "-i", "list.txt", "-c", "copy"])
        .arg(&output)
        .output()
        .await;

    let output_data = match result {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StitchError::FfmpegNotFound)
        }
        Err(e) => return Err(StitchError::Io(e)),
    };

    if !output_data.status.success() {
        let stderr = String::from_utf8_lossy(&output_data.stderr);
        // The interesting part of ffmpeg's stderr is the tail.
        let tail: String = stderr
            .lines()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join("\n");
        log::error!("ffmpeg concat failed: {}", tail);
        return Err(StitchError::Processing(tail));
    }

    Ok(())
}
