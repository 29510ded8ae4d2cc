//! Subprocess inference workers.
//!
//! When a runtime opts into subprocess isolation (`LLMC_SUBPROCESS`), local
//! inference runs in child processes, one process per inference domain,
//! since the native backend is not re-entrant. Parent and child exchange
//! line-delimited JSON frames over the child's standard streams; request and
//! response correlate through string identifiers. Out-of-band status goes to
//! file descriptor 3 when available so the JSON channel stays pristine.

use std::io::Write;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

mod client;
mod server;

pub use client::WorkerClient;
pub use server::{run_if_worker, serve};

/// Request frame, one JSON object per line on the worker's stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model_spec: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub max_tokens: u32,
}

/// Response frame, one JSON object per line on the worker's stdout. An empty
/// `err` means success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub val: String,
    #[serde(default)]
    pub err: String,
}

/// Serves worker requests. Implemented by the in-process inference runtime;
/// test transports substitute their own.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn generate(&self, prompt: &str, model_spec: &str, max_tokens: u32) -> Result<String>;
}

/// Writer for worker status announcements: file descriptor 3 when the parent
/// provided one, standard error otherwise.
pub(crate) fn status_writer() -> Box<dyn Write + Send> {
    #[cfg(unix)]
    {
        use std::os::unix::io::FromRawFd;
        // Duplicate fd 3 so the returned File owns its own descriptor.
        let fd = unsafe { libc::fcntl(3, libc::F_GETFD) };
        if fd != -1 {
            let dup = unsafe { libc::dup(3) };
            if dup != -1 {
                return Box::new(unsafe { std::fs::File::from_raw_fd(dup) });
            }
        }
    }
    Box::new(std::io::stderr())
}
