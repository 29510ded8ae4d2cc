//! Boundary to the native llama.cpp predictor.
//!
//! The predictor is synchronous and not re-entrant; callers serialize access
//! (see `runtime::local`). The native backend links only when the
//! `llama-cpp` feature is enabled; default builds still resolve and check
//! model paths but predictions return an unavailability error.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

#[cfg(feature = "llama-cpp")]
mod native;

/// Generation parameters for one prediction.
#[derive(Debug, Clone, Copy)]
pub struct PredictOptions {
    pub max_tokens: i32,
    pub temp: f32,
    pub top_k: i32,
    pub top_p: f32,
}

impl Default for PredictOptions {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            temp: 0.8,
            top_k: 40,
            top_p: 0.9,
        }
    }
}

/// A loaded GGUF model handle, cached by the local inference client.
#[derive(Debug)]
pub struct Model {
    path: PathBuf,
    #[cfg(feature = "llama-cpp")]
    native: native::NativeModel,
}

impl Model {
    /// Loads the model at `path`. Missing files are an inference error
    /// surfaced to the calling step.
    pub fn load(path: &Path, threads: i32) -> Result<Self> {
        if !path.is_file() {
            bail!("model file not found: {}", path.display());
        }

        #[cfg(feature = "llama-cpp")]
        {
            let native = native::NativeModel::load(path, threads)?;
            Ok(Self {
                path: path.to_path_buf(),
                native,
            })
        }

        #[cfg(not(feature = "llama-cpp"))]
        {
            let _ = threads;
            Ok(Self {
                path: path.to_path_buf(),
            })
        }
    }

    /// Runs the model on `prompt`, starting from a fresh context so
    /// independent predictions cannot corrupt each other's positions.
    pub fn predict(&self, prompt: &str, opts: &PredictOptions) -> Result<String> {
        #[cfg(feature = "llama-cpp")]
        {
            self.native.predict(prompt, opts).map_err(|e| {
                anyhow::anyhow!("prediction failed for {}: {}", self.path.display(), e)
            })
        }

        #[cfg(not(feature = "llama-cpp"))]
        {
            let _ = (prompt, opts);
            bail!(
                "local inference unavailable for {}: llmc was built without the `llama-cpp` feature",
                self.path.display()
            );
        }
    }
}
