//! Child-side serve loop: read request frames, run inference, write
//! response frames, exit when stdin closes.

use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::config;
use crate::runtime::local::LocalLlamaRuntime;

use super::{status_writer, Handler, Request, Response};

/// Reads line-delimited JSON requests from `reader`, serves each through
/// `handler`, and writes line-delimited JSON responses to `writer`. Returns
/// cleanly when the request stream ends. Malformed lines produce an error
/// response rather than terminating the loop.
pub async fn serve<R, W>(reader: R, mut writer: W, handler: &dyn Handler) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<Request>(&line) {
            Ok(req) => {
                match handler
                    .generate(&req.prompt, &req.model_spec, req.max_tokens)
                    .await
                {
                    Ok(val) => Response {
                        id: req.id,
                        val,
                        err: String::new(),
                    },
                    Err(e) => Response {
                        id: req.id,
                        val: String::new(),
                        err: e.to_string(),
                    },
                }
            }
            Err(e) => Response {
                id: String::new(),
                val: String::new(),
                err: format!("invalid request: {}", e),
            },
        };

        let mut frame = serde_json::to_string(&resp)?;
        frame.push('\n');
        writer.write_all(frame.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Entry gate for generated programs: when this process was spawned as a
/// worker (`LLMC_WORKER=1`), serve inference requests over stdio and return
/// true so the caller exits without running the scheduler.
pub async fn run_if_worker() -> bool {
    if !config::get().worker_mode {
        return false;
    }

    let mut status = status_writer();
    let _ = writeln!(status, "llmc worker: starting (pid={})", std::process::id());

    let runtime = LocalLlamaRuntime::new();
    if let Err(e) = serve(tokio::io::stdin(), tokio::io::stdout(), &runtime).await {
        let _ = writeln!(status, "worker input error: {}", e);
    }

    let _ = writeln!(status, "llmc worker: exiting (pid={})", std::process::id());
    true
}
