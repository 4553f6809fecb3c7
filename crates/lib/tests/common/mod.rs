//! Shared helpers: start the gateway on a free port with a temp workspace.

#![allow(dead_code)]

use lib::config::Config;
use lib::gateway;
use std::path::PathBuf;
use std::time::Duration;

pub struct TestGateway {
    pub base_url: String,
    pub port: u16,
    pub dir: PathBuf,
    pub client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

/// Start the gateway and wait until GET /health answers.
pub async fn start_gateway(timeout_secs: u64) -> TestGateway {
    let port = free_port();
    let dir = std::env::temp_dir().join(format!("warden-gateway-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create temp dir");

    let mut config = Config::default();
    config.gateway.port = port;
    config.gateway.bind = "127.0.0.1".to_string();
    config.exec.workspace = dir.join("workspace");
    config.exec.fallback_dir = dir.clone();
    config.exec.timeout_secs = timeout_secs;

    let handle = tokio::spawn(async move {
        let _ = gateway::run_gateway(config).await;
    });

    let base_url = format!("http://127.0.0.1:{}", port);
    let client = reqwest::Client::new();
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(format!("{}/health", base_url)).send().await {
            Ok(resp) if resp.status().is_success() => {
                return TestGateway {
                    base_url,
                    port,
                    dir,
                    client,
                    handle,
                };
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    handle.abort();
    panic!(
        "gateway on port {} did not become healthy within 5s; last error: {:?}",
        port, last_err
    );
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn post_json(&self, path: &str, body: serde_json::Value) -> (u16, serde_json::Value) {
        let resp = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .expect("send request");
        let status = resp.status().as_u16();
        (status, resp.json().await.expect("parse JSON"))
    }

    pub async fn get_json(&self, path: &str) -> (u16, serde_json::Value) {
        let resp = self.client.get(self.url(path)).send().await.expect("send request");
        let status = resp.status().as_u16();
        (status, resp.json().await.expect("parse JSON"))
    }
}
