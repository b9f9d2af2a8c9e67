// tests/common/mod.rs
pub use axum::Router;
pub use serde_json::json;
pub use tokio::task::JoinHandle;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use reqwest::Client;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::cache::token::{RefreshParams, Token};
use crate::registry::{RegistrySettings, TokenRegistry};
use crate::resilience::retry::RetrySettings;
use crate::sources::{AuthServer, RefreshOutcome};

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

pub fn build_reqwest_client() -> Client {
    Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .expect("reqwest client")
}

/// What the scripted server answers on its next call.
#[derive(Debug, Clone)]
pub enum Reply {
    Token(&'static str, ChronoDuration),
    Refused,
    Unreachable,
    /// the call itself panics, as a buggy auth server would
    Panic,
}

/// In-process auth server. Answers come from per-operation queues (default: a fresh
/// 50 minute token), optionally held back by a gate until the test releases them.
pub struct ScriptedAuthServer {
    fetch_replies: Mutex<VecDeque<Reply>>,
    refresh_replies: Mutex<VecDeque<Reply>>,
    gate: Option<Semaphore>,
    pub fetch_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub last_params: Mutex<Option<RefreshParams>>,
}

impl ScriptedAuthServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(None))
    }

    /// Every call waits for a permit from `release`.
    pub fn gated() -> Arc<Self> {
        Arc::new(Self::build(Some(Semaphore::new(0))))
    }

    fn build(gate: Option<Semaphore>) -> Self {
        Self {
            fetch_replies: Mutex::new(VecDeque::new()),
            refresh_replies: Mutex::new(VecDeque::new()),
            gate,
            fetch_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            last_params: Mutex::new(None),
        }
    }

    pub fn script_fetch(&self, reply: Reply) {
        self.fetch_replies.lock().unwrap().push_back(reply);
    }

    pub fn script_refresh(&self, reply: Reply) {
        self.refresh_replies.lock().unwrap().push_back(reply);
    }

    pub fn release(&self, calls: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(calls);
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    async fn answer(&self, queue: &Mutex<VecDeque<Reply>>, default_value: String) -> Result<RefreshOutcome> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        let reply = queue.lock().unwrap().pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match reply {
            None => Ok(RefreshOutcome::Refreshed(Token::new(
                default_value,
                chrono::Utc::now() + ChronoDuration::minutes(50),
            ))),
            Some(Reply::Token(value, ttl)) => {
                Ok(RefreshOutcome::Refreshed(Token::new(value.to_owned(), chrono::Utc::now() + ttl)))
            }
            Some(Reply::Refused) => Ok(RefreshOutcome::Refused),
            Some(Reply::Unreachable) => Err(anyhow!("connection refused")),
            Some(Reply::Panic) => panic!("auth server bug"),
        }
    }
}

#[async_trait]
impl AuthServer for ScriptedAuthServer {
    async fn fetch_initial(&self, token_type: &str) -> Result<Token> {
        let n = self.fetch_calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.answer(&self.fetch_replies, format!("{}-fetch-{}", token_type, n)).await? {
            RefreshOutcome::Refreshed(token) => Ok(token),
            RefreshOutcome::Refused => Err(anyhow!("initial fetch refused")),
        }
    }

    async fn refresh(&self, token_type: &str, params: &RefreshParams) -> Result<RefreshOutcome> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_params.lock().unwrap() = Some(params.clone());
        self.answer(&self.refresh_replies, format!("{}-refresh-{}", token_type, n)).await
    }
}

/// Fast retries, periodic jobs effectively off, backup inside `dir`.
pub fn test_settings(dir: &Path) -> RegistrySettings {
    RegistrySettings {
        initial_fetch_retry: RetrySettings { base_delay_ms: 10, max_delay_ms: 20 },
        backup_path: dir.join("token_backup.json"),
        backup_interval: Duration::from_secs(3600),
        cleanup_interval: Duration::from_secs(3600),
        ..RegistrySettings::default()
    }
}

pub fn registry_with(dir: &Path, auth: Arc<ScriptedAuthServer>) -> TokenRegistry {
    TokenRegistry::new(test_settings(dir), auth).expect("registry")
}

/// Polls `condition` every few milliseconds; false when it did not hold within `timeout`.
pub async fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Forced snapshot that tolerates a background snapshot holding the single-flight guard.
pub async fn force_backup_eventually(registry: &TokenRegistry, path: &Path) -> bool {
    for _ in 0..100 {
        if registry.force_backup(Some(path)).await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
