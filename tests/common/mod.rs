//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use admin_gate::clock::MockClock;
use admin_gate::http::AppState;
use admin_gate::{GateConfig, HttpServer, Shutdown};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const ADMIN_PASSWORD: &str = "correct horse battery staple";

/// A running gate bound to an ephemeral loopback port.
pub struct TestGate {
    pub addr: SocketAddr,
    pub clock: MockClock,
    pub state: AppState,
    pub client: reqwest::Client,
    shutdown: Shutdown,
    _dir: TempDir,
}

impl TestGate {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn csrf_token(&self, path: &str) -> String {
        let body: Value = self
            .client
            .get(self.url(path))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        body["csrfToken"].as_str().unwrap().to_string()
    }

    pub async fn login(&self, password: &str) -> reqwest::Response {
        let token = self.csrf_token("/admin/csrf-token").await;
        self.client
            .post(self.url("/admin/login"))
            .header("x-csrf-token", token)
            .json(&serde_json::json!({ "password": password }))
            .send()
            .await
            .unwrap()
    }
}

impl Drop for TestGate {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Defaults tuned for tests: audit file in a temp dir, fixed clock at noon UTC.
pub fn test_config(dir: &TempDir) -> GateConfig {
    let mut config = GateConfig::default();
    config.audit.path = dir.path().join("audit-log.json").to_string_lossy().into_owned();
    config.audit.utc_offset_minutes = Some(0);
    config.admin.password = ADMIN_PASSWORD.to_string();
    config
}

/// Start a gate; `configure` adjusts the test defaults.
pub async fn spawn_gate<F>(configure: F) -> TestGate
where
    F: FnOnce(&mut GateConfig),
{
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    configure(&mut config);

    let clock = MockClock::from_rfc3339("2025-03-01T12:00:00Z").unwrap();
    let server = HttpServer::with_clock(config, Arc::new(clock.clone())).unwrap();
    let state = server.state().clone();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, signal).await.unwrap();
    });

    TestGate {
        addr,
        clock,
        state,
        client: reqwest::Client::new(),
        shutdown,
        _dir: dir,
    }
}
