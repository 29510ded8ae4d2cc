//! Parent-side worker management: spawn, request correlation, lifecycle.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;

use crate::config;

use super::{Request, Response};

struct PendingTable {
    waiters: HashMap<String, oneshot::Sender<Response>>,
    closed: bool,
}

/// Owns one worker subprocess. Requests may be sent concurrently from any
/// number of tasks; a background reader routes each response to its waiter
/// by id.
pub struct WorkerClient {
    writer: tokio::sync::Mutex<Option<Box<dyn AsyncWrite + Send + Unpin>>>,
    child: tokio::sync::Mutex<Option<Child>>,
    pending: Arc<Mutex<PendingTable>>,
    next_id: AtomicU64,
}

impl WorkerClient {
    /// Spawns the current executable as a worker child. The child inherits
    /// the parent environment minus the subprocess flag (preventing
    /// recursive worker spawning) and with the worker flag set.
    pub fn spawn() -> Result<Self> {
        let exe = std::env::current_exe().context("could not determine executable path")?;

        let mut child = Command::new(&exe)
            .env_remove(config::SUBPROCESS_ENV)
            .env(config::WORKER_ENV, "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to spawn worker {}", exe.display()))?;

        let stdin = child.stdin.take().context("worker stdin unavailable")?;
        let stdout = child.stdout.take().context("worker stdout unavailable")?;

        Ok(Self::new(Box::new(stdin), stdout, Some(child)))
    }

    /// Builds a client over arbitrary streams. Used by in-memory transports
    /// in tests; production clients come from [`WorkerClient::spawn`].
    pub fn from_streams(
        writer: impl AsyncWrite + Send + Unpin + 'static,
        reader: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        Self::new(Box::new(writer), reader, None)
    }

    fn new(
        writer: Box<dyn AsyncWrite + Send + Unpin>,
        reader: impl AsyncRead + Send + Unpin + 'static,
        child: Option<Child>,
    ) -> Self {
        let pending = Arc::new(Mutex::new(PendingTable {
            waiters: HashMap::new(),
            closed: false,
        }));

        tokio::spawn(read_loop(reader, Arc::clone(&pending)));

        Self {
            writer: tokio::sync::Mutex::new(Some(writer)),
            child: tokio::sync::Mutex::new(child),
            pending,
            next_id: AtomicU64::new(0),
        }
    }

    /// Sends one request and waits for its response. Requests from
    /// concurrent tasks interleave on the wire; ids keep them correlated.
    pub async fn send_request(
        &self,
        model_spec: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String> {
        let id = (self.next_id.fetch_add(1, Ordering::Relaxed) + 1).to_string();

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().unwrap();
            if pending.closed {
                bail!("worker connection closed");
            }
            pending.waiters.insert(id.clone(), tx);
        }

        let req = Request {
            id: id.clone(),
            model_spec: model_spec.to_string(),
            prompt: prompt.to_string(),
            max_tokens,
        };
        let mut frame = serde_json::to_string(&req)?;
        frame.push('\n');

        {
            let mut writer = self.writer.lock().await;
            let writer = writer.as_mut().context("worker stdin closed")?;
            if let Err(e) = writer.write_all(frame.as_bytes()).await {
                self.pending.lock().unwrap().waiters.remove(&id);
                return Err(e).context("failed to write worker request");
            }
            writer.flush().await?;
        }

        let resp = rx
            .await
            .map_err(|_| anyhow!("worker exited before responding to request {}", id))?;
        if !resp.err.is_empty() {
            bail!("{}", resp.err);
        }
        Ok(resp.val)
    }

    /// Closes the worker's stdin (ending its serve loop) and waits for the
    /// child to exit.
    pub async fn close(&self) -> Result<()> {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        if let Some(mut child) = self.child.lock().await.take() {
            child.wait().await.context("failed waiting for worker exit")?;
        }
        Ok(())
    }

    /// Process id of the worker subprocess, if one is attached and running.
    pub async fn pid(&self) -> Option<u32> {
        self.child.lock().await.as_ref().and_then(|c| c.id())
    }
}

async fn read_loop(reader: impl AsyncRead + Unpin, pending: Arc<Mutex<PendingTable>>) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Response>(&line) {
                    Ok(resp) => {
                        let waiter = pending.lock().unwrap().waiters.remove(&resp.id);
                        if let Some(tx) = waiter {
                            let _ = tx.send(resp);
                        }
                    }
                    Err(e) => {
                        eprintln!("worker client decode error: {}", e);
                        break;
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                eprintln!("worker client read error: {}", e);
                break;
            }
        }
    }

    // Dropping the senders wakes every outstanding waiter with an error
    // instead of leaving it blocked forever.
    let mut pending = pending.lock().unwrap();
    pending.closed = true;
    pending.waiters.clear();
}
