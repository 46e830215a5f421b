//! Nodes talking to each other over real HTTP on localhost.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};
use three_phase_commit::{
    cohort::{Cohort, LivenessChecker, RwMode, StaticLiveness},
    storage::InMemoryStorage,
    transport::http::{serve_until, HttpCommunicationHandler},
    EngineConfig, Phase, RecoveryConfig, ThreePhase,
};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};

struct Node {
    addr: SocketAddr,
    engine: ThreePhase,
    shutdown: Option<oneshot::Sender<()>>,
    server: JoinHandle<()>,
}

impl Node {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        // Pooled peer connections can hold a graceful shutdown open.
        if tokio::time::timeout(Duration::from_secs(1), &mut self.server).await.is_err() {
            self.server.abort();
        }
    }
}

/// Starts one node per listener, all in read-one/write-all mode over `hosts`.
fn start(listeners: Vec<TcpListener>, hosts: &[String]) -> Result<Vec<Node>> {
    let liveness: Arc<dyn LivenessChecker> = Arc::new(StaticLiveness::new(hosts.to_vec()));
    let mut nodes = Vec::new();

    for listener in listeners {
        let addr = listener.local_addr()?;
        let this_host = addr.to_string();
        let cohort = Cohort::new(
            this_host.clone(),
            RwMode::ReadOneWriteAll { nodes: hosts.len() },
            Arc::clone(&liveness),
        );
        let engine = ThreePhase::new(
            EngineConfig::new(this_host)
                .with_recovery(RecoveryConfig::from_phase_timeout(Duration::from_secs(30))),
            Arc::new(HttpCommunicationHandler::new(Duration::from_secs(2))?),
            Arc::new(InMemoryStorage::new()),
            Arc::new(cohort),
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let served = engine.clone();
        let node_liveness = Arc::clone(&liveness);
        let server = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.await;
            };
            let _ = serve_until(listener, served, node_liveness, shutdown).await;
        });

        nodes.push(Node {
            addr,
            engine,
            shutdown: Some(shutdown_tx),
            server,
        });
    }
    Ok(nodes)
}

async fn bind(n: usize) -> Result<(Vec<TcpListener>, Vec<String>)> {
    let mut listeners = Vec::new();
    let mut hosts = Vec::new();
    for _ in 0..n {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        hosts.push(listener.local_addr()?.to_string());
        listeners.push(listener);
    }
    Ok((listeners, hosts))
}

#[tokio::test]
async fn log_entry_commits_on_every_node() -> Result<()> {
    let (listeners, hosts) = bind(2).await?;
    let nodes = start(listeners, &hosts)?;
    let client = reqwest::Client::new();

    let response = client.get(nodes[0].url("/log/hello")).send().await?;
    assert_eq!(response.status(), StatusCode::OK);
    let id = response.text().await?;
    assert_eq!(id.len(), 21);

    for node in &nodes {
        assert_eq!(node.engine.status(&id), Some(Phase::Committed));
    }

    let response = client.get(nodes[1].url(&format!("/data/{id}"))).send().await?;
    assert_eq!(response.status(), StatusCode::OK);
    let value: Value = serde_json::from_slice(&response.bytes().await?)?;
    assert_eq!(value, json!({"entry": "hello"}));

    let stats = client.get(nodes[1].url("/stats")).send().await?.text().await?;
    assert!(stats.contains(&id));

    let overview = client.get(nodes[0].url("/")).send().await?.text().await?;
    assert!(overview.contains("====== Connections ======"));
    assert!(overview.contains(&hosts[1]));

    for node in nodes {
        node.stop().await;
    }
    Ok(())
}

#[tokio::test]
async fn peer_routes_answer_success_or_failure() -> Result<()> {
    let (listeners, hosts) = bind(1).await?;
    let nodes = start(listeners, &hosts)?;
    let client = reqwest::Client::new();

    let check = client.get(nodes[0].url("/3pc/check/unknown")).send().await?;
    assert_eq!(check.status(), StatusCode::BAD_REQUEST);
    assert_eq!(check.text().await?, "Failure");

    let init = client
        .post(nodes[0].url("/3pc/init"))
        .body(vec![1u8])
        .send()
        .await?;
    assert_eq!(init.status(), StatusCode::BAD_REQUEST);

    let read = client.get(nodes[0].url("/3pc/read/nothing")).send().await?;
    assert_eq!(read.status(), StatusCode::OK);
    assert!(read.bytes().await?.is_empty());

    let missing = client.get(nodes[0].url("/data/nothing")).send().await?;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    for node in nodes {
        node.stop().await;
    }
    Ok(())
}

#[tokio::test]
async fn dead_peer_rejects_the_write() -> Result<()> {
    let (mut listeners, hosts) = bind(2).await?;
    // Free the second port without serving it.
    drop(listeners.pop());
    let nodes = start(listeners, &hosts)?;
    let client = reqwest::Client::new();

    let response = client.get(nodes[0].url("/log/lost")).send().await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(!nodes[0].engine.stats().contains("lost"));

    for node in nodes {
        node.stop().await;
    }
    Ok(())
}
