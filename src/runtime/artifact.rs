//! Serialization of the end-of-run artifact.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use super::signals::SignalMsg;

#[derive(Serialize)]
struct RunArtifact<'a> {
    contexts: &'a HashMap<String, HashMap<String, String>>,
    channels: &'a HashMap<String, SignalMsg>,
}

/// Writes the run artifact (`<execName>_run.json`) next to the running
/// executable: every workflow's final variable map under its prefixed key,
/// and every published signal under its qualified step identifier. Runs once,
/// after all workflow tasks have finished.
pub fn write_run_artifact(
    contexts: &HashMap<String, HashMap<String, String>>,
    channels: &HashMap<String, SignalMsg>,
) -> Result<PathBuf> {
    let exe = std::env::current_exe().context("could not determine executable path")?;
    let path = artifact_path(&exe);
    write_run_artifact_to(&path, contexts, channels)?;
    Ok(path)
}

/// The artifact path for a given executable: `<dir>/<stem>_run.json`.
pub fn artifact_path(exe: &Path) -> PathBuf {
    let dir = exe.parent().unwrap_or_else(|| Path::new("."));
    let stem = exe
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workflow".to_string());
    dir.join(format!("{}_run.json", stem))
}

pub fn write_run_artifact_to(
    path: &Path,
    contexts: &HashMap<String, HashMap<String, String>>,
    channels: &HashMap<String, SignalMsg>,
) -> Result<()> {
    let artifact = RunArtifact { contexts, channels };
    let json = serde_json::to_string_pretty(&artifact)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write run artifact {}", path.display()))?;
    Ok(())
}
