//! Worker protocol round-trips over in-memory transports.

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::io::{split, AsyncBufReadExt, AsyncWriteExt, BufReader};

use llmc::worker::{serve, Handler, Request, Response, WorkerClient};

/// Echoes back what it was asked, tagged with the model spec.
struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
    async fn generate(&self, prompt: &str, model_spec: &str, max_tokens: u32) -> Result<String> {
        if prompt == "fail" {
            bail!("backend exploded");
        }
        Ok(format!("{}|{}|{}", model_spec, prompt, max_tokens))
    }
}

#[tokio::test]
async fn round_trip_through_serve_loop() {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = split(server_io);
    let (client_read, client_write) = split(client_io);

    let server = tokio::spawn(async move {
        let handler = EchoHandler;
        serve(server_read, server_write, &handler).await
    });

    let client = WorkerClient::from_streams(client_write, client_read);
    let val = client.send_request("./models/tiny.gguf", "hello", 32).await.unwrap();
    assert_eq!(val, "./models/tiny.gguf|hello|32");

    client.close().await.unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn concurrent_requests_all_reach_their_waiters() {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = split(server_io);
    let (client_read, client_write) = split(client_io);

    let server = tokio::spawn(async move {
        let handler = EchoHandler;
        serve(server_read, server_write, &handler).await
    });

    let client = std::sync::Arc::new(WorkerClient::from_streams(client_write, client_read));

    let mut requests = Vec::new();
    for i in 0..16 {
        let client = std::sync::Arc::clone(&client);
        requests.push(tokio::spawn(async move {
            let prompt = format!("prompt-{}", i);
            let val = client.send_request("m", &prompt, i).await.unwrap();
            (i, val)
        }));
    }

    for handle in requests {
        let (i, val) = handle.await.unwrap();
        assert_eq!(val, format!("m|prompt-{}|{}", i, i));
    }

    client.close().await.unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn responses_correlate_even_when_delivered_out_of_order() {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (server_read, mut server_write) = split(server_io);
    let (client_read, client_write) = split(client_io);

    const N: usize = 8;

    // A hand-rolled responder that holds every request until all have
    // arrived, then answers in reverse order.
    let responder = tokio::spawn(async move {
        let mut lines = BufReader::new(server_read).lines();
        let mut batch = Vec::new();
        while batch.len() < N {
            let line = lines.next_line().await.unwrap().unwrap();
            let req: Request = serde_json::from_str(&line).unwrap();
            batch.push(req);
        }
        for req in batch.into_iter().rev() {
            let resp = Response {
                id: req.id,
                val: format!("answer to {}", req.prompt),
                err: String::new(),
            };
            let mut frame = serde_json::to_string(&resp).unwrap();
            frame.push('\n');
            server_write.write_all(frame.as_bytes()).await.unwrap();
        }
    });

    let client = std::sync::Arc::new(WorkerClient::from_streams(client_write, client_read));

    let mut waiters = Vec::new();
    for i in 0..N {
        let client = std::sync::Arc::clone(&client);
        waiters.push(tokio::spawn(async move {
            let prompt = format!("q{}", i);
            let val = client.send_request("m", &prompt, 0).await.unwrap();
            (i, val)
        }));
    }

    for handle in waiters {
        let (i, val) = handle.await.unwrap();
        assert_eq!(val, format!("answer to q{}", i));
    }

    responder.await.unwrap();
}

#[tokio::test]
async fn handler_errors_come_back_as_error_frames() {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = split(server_io);
    let (client_read, client_write) = split(client_io);

    tokio::spawn(async move {
        let handler = EchoHandler;
        let _ = serve(server_read, server_write, &handler).await;
    });

    let client = WorkerClient::from_streams(client_write, client_read);
    let err = client.send_request("m", "fail", 0).await.unwrap_err();
    assert!(err.to_string().contains("backend exploded"));
}

#[tokio::test]
async fn malformed_request_lines_get_error_responses() {
    let (mut client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = split(server_io);

    tokio::spawn(async move {
        let handler = EchoHandler;
        let _ = serve(server_read, server_write, &handler).await;
    });

    client_io.write_all(b"this is not json\n").await.unwrap();

    let mut lines = BufReader::new(client_io).lines();
    let line = lines.next_line().await.unwrap().unwrap();
    let resp: Response = serde_json::from_str(&line).unwrap();
    assert!(resp.err.contains("invalid request"));
}

#[tokio::test]
async fn server_exits_cleanly_when_input_closes() {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = split(server_io);

    let server = tokio::spawn(async move {
        let handler = EchoHandler;
        serve(server_read, server_write, &handler).await
    });

    drop(client_io);
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn eof_drains_pending_waiters() {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (client_read, client_write) = split(client_io);

    let client = std::sync::Arc::new(WorkerClient::from_streams(client_write, client_read));

    let waiter = {
        let client = std::sync::Arc::clone(&client);
        tokio::spawn(async move { client.send_request("m", "never answered", 0).await })
    };

    // Give the request time to get registered, then hang up without
    // responding.
    tokio::task::yield_now().await;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    drop(server_io);

    let err = waiter.await.unwrap().unwrap_err();
    assert!(err.to_string().contains("worker exited before responding"));

    // The connection is now closed for new requests too.
    let err = client.send_request("m", "late", 0).await.unwrap_err();
    assert!(err.to_string().contains("worker connection closed"));
}

#[tokio::test]
async fn request_ids_are_distinct_and_monotonic() {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (server_read, mut server_write) = split(server_io);
    let (client_read, client_write) = split(client_io);

    let observer = tokio::spawn(async move {
        let mut lines = BufReader::new(server_read).lines();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let line = lines.next_line().await.unwrap().unwrap();
            let req: Request = serde_json::from_str(&line).unwrap();
            ids.push(req.id.clone());
            let resp = Response {
                id: req.id,
                val: "ok".to_string(),
                err: String::new(),
            };
            let mut frame = serde_json::to_string(&resp).unwrap();
            frame.push('\n');
            server_write.write_all(frame.as_bytes()).await.unwrap();
        }
        ids
    });

    let client = WorkerClient::from_streams(client_write, client_read);
    for _ in 0..3 {
        client.send_request("m", "p", 0).await.unwrap();
    }

    let ids = observer.await.unwrap();
    assert_eq!(ids, vec!["1", "2", "3"]);
}
