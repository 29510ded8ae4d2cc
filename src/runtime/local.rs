//! Local inference client for `local_llm` steps.
//!
//! Models are cached by absolute path and shared across tasks within the
//! process. The native backend is not re-entrant, so in-process predictions
//! serialize behind a single process-wide lock; for true parallelism the
//! runtime opts into subprocess workers via `LLMC_SUBPROCESS`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::config;
use crate::llama::{Model, PredictOptions};
use crate::worker::{Handler, WorkerClient};

// Serializes every in-process prediction, regardless of which task or which
// model handle issues it.
static PREDICT_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

const DEFAULT_MAX_TOKENS: u32 = 256;

/// Client for locally-run models. Generated programs create one per
/// workflow; instances are never shared across workflows.
pub struct LocalLlamaRuntime {
    models: Mutex<HashMap<PathBuf, Arc<Model>>>,
    worker: Mutex<Option<Arc<WorkerClient>>>,
}

impl Default for LocalLlamaRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalLlamaRuntime {
    /// Creates the runtime. When the environment opts into subprocess mode a
    /// worker child is started; if that fails the runtime falls back to
    /// in-process inference with a diagnostic on stderr.
    pub fn new() -> Self {
        let worker = if config::get().use_subprocess {
            match WorkerClient::spawn() {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    eprintln!("failed to start worker client: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Self {
            models: Mutex::new(HashMap::new()),
            worker: Mutex::new(worker),
        }
    }

    /// Runs the model named by `model_spec` on `prompt` and returns the
    /// completion text. `max_tokens` of zero falls back to 256.
    pub async fn generate(
        &self,
        prompt: &str,
        model_spec: &str,
        max_tokens: u32,
    ) -> Result<String> {
        let model_path = resolve_model_path(model_spec);

        // Subprocess mode: the child loads and predicts; requests from
        // parallel callers interleave on the wire.
        let worker = self.worker.lock().unwrap().clone();
        if let Some(client) = worker {
            return client
                .send_request(&model_path.to_string_lossy(), prompt, max_tokens)
                .await;
        }

        let model = self.load_model(&model_path)?;
        let opts = PredictOptions {
            max_tokens: if max_tokens > 0 {
                max_tokens as i32
            } else {
                DEFAULT_MAX_TOKENS as i32
            },
            ..PredictOptions::default()
        };

        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || {
            let _guard = PREDICT_LOCK.lock().unwrap();
            model.predict(&prompt, &opts)
        })
        .await
        .context("prediction task panicked")?
    }

    /// Loads a model, reusing the cached handle when the absolute path was
    /// seen before.
    fn load_model(&self, path: &Path) -> Result<Arc<Model>> {
        let abs = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

        let mut models = self.models.lock().unwrap();
        if let Some(model) = models.get(&abs) {
            return Ok(Arc::clone(model));
        }

        let model = Arc::new(Model::load(&abs, config::get().llama_threads)?);
        models.insert(abs, Arc::clone(&model));
        Ok(model)
    }

    /// Shuts down the worker subprocess, if any. Called by generated
    /// programs after all workflow tasks have finished.
    pub async fn close(&self) {
        let client = self.worker.lock().unwrap().take();
        if let Some(client) = client {
            if let Err(e) = client.close().await {
                eprintln!("failed to close worker client: {}", e);
            }
        }
    }
}

#[async_trait]
impl Handler for LocalLlamaRuntime {
    async fn generate(&self, prompt: &str, model_spec: &str, max_tokens: u32) -> Result<String> {
        LocalLlamaRuntime::generate(self, prompt, model_spec, max_tokens).await
    }
}

/// Resolves a model spec to a filesystem path:
/// `file:` prefixes strip to a literal path; path-like specs (`/`, `./`,
/// `../`) gain a `.gguf` suffix when missing; anything else is a logical
/// name under `./models/`.
pub fn resolve_model_path(spec: &str) -> PathBuf {
    if let Some(path) = spec.strip_prefix("file:") {
        return PathBuf::from(path);
    }

    if spec.starts_with('/') || spec.starts_with("./") || spec.starts_with("../") {
        if spec.ends_with(".gguf") {
            return PathBuf::from(spec);
        }
        return PathBuf::from(format!("{}.gguf", spec));
    }

    if spec.ends_with(".gguf") {
        return PathBuf::from(format!("./models/{}", spec));
    }
    PathBuf::from(format!("./models/{}.gguf", spec))
}
