//! Centralized configuration for llmc.
//!
//! Settings come from environment variables with sensible defaults. The
//! global instance is loaded once and shared by the compiler CLI, the
//! runtime services, and worker processes.

use once_cell::sync::Lazy;

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLAMA_THREADS: i32 = 4;

/// Environment flag that opts generated programs into subprocess workers.
pub const SUBPROCESS_ENV: &str = "LLMC_SUBPROCESS";

/// Internal flag marking a child process as an inference worker. Set by the
/// worker client when spawning; never set by users.
pub const WORKER_ENV: &str = "LLMC_WORKER";

/// Runtime configuration shared across a process.
#[derive(Debug, Clone)]
pub struct Config {
    // Remote LLM settings
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,

    // Local inference settings
    pub llama_threads: i32,

    // Worker settings
    pub use_subprocess: bool,
    pub worker_mode: bool,
}

static GLOBAL: Lazy<Config> = Lazy::new(Config::from_env);

/// Returns the process-wide configuration, loading it from the environment
/// on first use.
pub fn get() -> &'static Config {
    &GLOBAL
}

impl Config {
    /// Loads configuration from the current process environment.
    pub fn from_env() -> Self {
        Self {
            openai_api_key: env_or("OPENAI_API_KEY", ""),
            openai_base_url: env_or("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
            openai_model: env_or("OPENAI_MODEL", DEFAULT_OPENAI_MODEL),
            llama_threads: env_int("LLAMA_THREADS", DEFAULT_LLAMA_THREADS),
            use_subprocess: env_bool(SUBPROCESS_ENV),
            worker_mode: env_bool(WORKER_ENV),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}

fn env_int(key: &str, default: i32) -> i32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str) -> bool {
    match std::env::var(key) {
        Ok(v) => parse_bool(&v),
        Err(_) => false,
    }
}

/// Accepts "1", "true", "yes" (any case) as true.
pub(crate) fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}
