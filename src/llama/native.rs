//! llama.cpp-backed predictor, compiled only with the `llama-cpp` feature.

use std::num::NonZeroU32;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel, Special};
use llama_cpp_2::sampling::LlamaSampler;
use once_cell::sync::OnceCell;

use super::PredictOptions;

static BACKEND: OnceCell<LlamaBackend> = OnceCell::new();

fn backend() -> Result<&'static LlamaBackend> {
    BACKEND.get_or_try_init(|| {
        LlamaBackend::init().map_err(|e| anyhow!("failed to initialize llama backend: {}", e))
    })
}

pub(super) struct NativeModel {
    model: LlamaModel,
    threads: i32,
}

impl NativeModel {
    pub(super) fn load(path: &Path, threads: i32) -> Result<Self> {
        let backend = backend()?;
        let params = LlamaModelParams::default();
        let model = LlamaModel::load_from_file(backend, path, &params)
            .with_context(|| format!("failed to load model {}", path.display()))?;
        Ok(Self { model, threads })
    }

    // A fresh context per call: the KV cache starts empty, so positions from
    // earlier predictions cannot leak into this one.
    pub(super) fn predict(&self, prompt: &str, opts: &PredictOptions) -> Result<String> {
        let backend = backend()?;
        let ctx_params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(2048))
            .with_n_threads(self.threads);
        let mut ctx = self
            .model
            .new_context(backend, ctx_params)
            .context("failed to create llama context")?;

        let tokens = self
            .model
            .str_to_token(prompt, AddBos::Always)
            .context("failed to tokenize prompt")?;

        let mut batch = LlamaBatch::new(tokens.len().max(1), 1);
        let last = tokens.len().saturating_sub(1);
        for (i, token) in tokens.iter().enumerate() {
            batch.add(*token, i as i32, &[0], i == last)?;
        }
        ctx.decode(&mut batch).context("prompt decode failed")?;

        let mut sampler = LlamaSampler::chain_simple([
            LlamaSampler::top_k(opts.top_k),
            LlamaSampler::top_p(opts.top_p, 1),
            LlamaSampler::temp(opts.temp),
            LlamaSampler::dist(1234),
        ]);

        let mut output = String::new();
        let mut n_cur = tokens.len() as i32;
        for _ in 0..opts.max_tokens {
            let token = sampler.sample(&ctx, batch.n_tokens() - 1);
            if self.model.is_eog_token(token) {
                break;
            }
            output.push_str(
                &self
                    .model
                    .token_to_str(token, Special::Tokenize)
                    .unwrap_or_default(),
            );

            batch.clear();
            batch.add(token, n_cur, &[0], true)?;
            ctx.decode(&mut batch).context("token decode failed")?;
            n_cur += 1;
        }

        Ok(output)
    }
}
