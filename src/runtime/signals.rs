//! Cross-workflow coordination keyed by qualified step identifiers.
//!
//! Each key carries at most one terminal message: the producing step's value
//! or error. Waiters block (optionally with a timeout) until the message is
//! published; a side table retains every publication so the final run
//! artifact sees all outcomes even after waiters have observed them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// One-shot terminal message describing a step outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalMsg {
    pub val: String,
    pub err: Option<String>,
}

impl SignalMsg {
    pub fn ok(val: impl Into<String>) -> Self {
        Self {
            val: val.into(),
            err: None,
        }
    }

    pub fn err(err: impl Into<String>) -> Self {
        Self {
            val: String::new(),
            err: Some(err.into()),
        }
    }

    pub fn is_err(&self) -> bool {
        self.err.is_some()
    }
}

struct BusState {
    // One latch per key. The sender is kept alive here so receivers created
    // before or after publication both observe the message.
    channels: HashMap<String, watch::Sender<Option<SignalMsg>>>,
    // Retains the first publication per key for post-run serialization.
    published: HashMap<String, SignalMsg>,
}

/// Process-wide publish/subscribe bus. Cloning shares the underlying state;
/// the scheduler creates one bus and hands clones to every workflow task.
#[derive(Clone)]
pub struct SignalBus {
    state: Arc<Mutex<BusState>>,
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalBus {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState {
                channels: HashMap::new(),
                published: HashMap::new(),
            })),
        }
    }

    fn sender(&self, key: &str) -> watch::Sender<Option<SignalMsg>> {
        let mut state = self.state.lock().unwrap();
        state
            .channels
            .entry(key.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .clone()
    }

    /// Publishes the terminal message for `key`. Publication is single-shot:
    /// the first message wins for waiters and for the side table; later
    /// publications on the same key are dropped.
    pub fn publish(&self, key: &str, msg: SignalMsg) {
        let sender = {
            let mut state = self.state.lock().unwrap();
            if state.published.contains_key(key) {
                return;
            }
            state.published.insert(key.to_string(), msg.clone());
            state
                .channels
                .entry(key.to_string())
                .or_insert_with(|| watch::channel(None).0)
                .clone()
        };
        sender.send_replace(Some(msg));
    }

    /// Returns a receiver observing the latch for `key`, creating it lazily.
    /// Subscribing after publication still observes the message.
    pub fn subscribe(&self, key: &str) -> watch::Receiver<Option<SignalMsg>> {
        self.sender(key).subscribe()
    }

    /// Blocks until the message for `key` is published. A zero
    /// `timeout_secs` waits indefinitely; otherwise the wait fails after
    /// that many seconds.
    pub async fn wait(&self, key: &str, timeout_secs: u64) -> Result<SignalMsg> {
        let mut rx = self.subscribe(key);

        let recv = async {
            loop {
                if let Some(msg) = rx.borrow_and_update().clone() {
                    return msg;
                }
                // Sender lives in the bus map, so changed() cannot error
                // while the bus is alive.
                if rx.changed().await.is_err() {
                    return SignalMsg::err(format!("signal channel for {} closed", key));
                }
            }
        };

        if timeout_secs == 0 {
            Ok(recv.await)
        } else {
            tokio::time::timeout(Duration::from_secs(timeout_secs), recv)
                .await
                .map_err(|_| anyhow!("timed out waiting for {}", key))
        }
    }

    /// Returns a copy of every publication recorded so far, keyed by
    /// qualified step identifier. Errors stay `None` on success so the run
    /// artifact serializes them as null.
    pub fn snapshot(&self) -> HashMap<String, SignalMsg> {
        self.state.lock().unwrap().published.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_wait_delivers() {
        let bus = SignalBus::new();
        bus.publish("1_wf.1_1/1_step", SignalMsg::ok("hello"));

        let msg = bus.wait("1_wf.1_1/1_step", 0).await.unwrap();
        assert_eq!(msg.val, "hello");
        assert!(msg.err.is_none());
    }

    #[tokio::test]
    async fn wait_then_publish_delivers() {
        let bus = SignalBus::new();
        let waiter = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.wait("k", 5).await })
        };

        tokio::task::yield_now().await;
        bus.publish("k", SignalMsg::ok("v"));

        let msg = waiter.await.unwrap().unwrap();
        assert_eq!(msg.val, "v");
    }

    #[tokio::test]
    async fn multiple_waiters_all_observe_the_message() {
        let bus = SignalBus::new();
        let mut waiters = Vec::new();
        for _ in 0..3 {
            let bus = bus.clone();
            waiters.push(tokio::spawn(async move { bus.wait("shared", 5).await }));
        }

        tokio::task::yield_now().await;
        bus.publish("shared", SignalMsg::ok("once"));

        for waiter in waiters {
            assert_eq!(waiter.await.unwrap().unwrap().val, "once");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_when_nothing_is_published() {
        let bus = SignalBus::new();
        let err = bus.wait("never", 1).await.unwrap_err();
        assert!(err.to_string().contains("timed out waiting for never"));
    }

    #[tokio::test]
    async fn first_publication_wins() {
        let bus = SignalBus::new();
        bus.publish("k", SignalMsg::ok("first"));
        bus.publish("k", SignalMsg::ok("second"));

        assert_eq!(bus.wait("k", 0).await.unwrap().val, "first");
        assert_eq!(bus.snapshot()["k"].val, "first");
    }

    #[tokio::test]
    async fn snapshot_survives_drained_waiters() {
        let bus = SignalBus::new();
        bus.publish("k", SignalMsg::ok("kept"));
        let _ = bus.wait("k", 0).await.unwrap();

        let snap = bus.snapshot();
        assert_eq!(snap["k"].val, "kept");
        assert!(snap["k"].err.is_none());
    }

    #[tokio::test]
    async fn snapshot_excludes_subscribe_only_keys() {
        let bus = SignalBus::new();
        let _rx = bus.subscribe("unpublished");
        bus.publish("published", SignalMsg::err("boom"));

        let snap = bus.snapshot();
        assert!(!snap.contains_key("unpublished"));
        assert_eq!(snap["published"].err.as_deref(), Some("boom"));
    }

    #[test]
    fn error_serializes_as_null_on_success() {
        let json = serde_json::to_string(&SignalMsg::ok("v")).unwrap();
        assert!(json.contains("\"err\":null"));

        let json = serde_json::to_string(&SignalMsg::err("boom")).unwrap();
        assert!(json.contains("\"err\":\"boom\""));
    }
}
