//! Load generator for a running node.
//!
//! Each sender loops over `GET /log/hammer_<pid>_nail_<n>` until the deadline
//! and counts how many creates the cluster accepted.

use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::future::join_all;
use reqwest::Client;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::cli::HammerArgs;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HammerReport {
    pub succeeded: u64,
    pub failed: u64,
}

impl HammerReport {
    pub fn total(&self) -> u64 {
        self.succeeded + self.failed
    }

    fn absorb(&mut self, other: HammerReport) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
    }
}

pub async fn run(args: HammerArgs) -> Result<HammerReport> {
    let client = Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("building http client")?;
    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    let pid = std::process::id();

    info!(host = %args.host, threads = args.threads, seconds = args.seconds, "hammering");
    let senders = (0..args.threads.max(1)).map(|sender| {
        let client = client.clone();
        let host = args.host.clone();
        tokio::spawn(async move { hammer(client, host, pid, sender, deadline).await })
    });

    let mut report = HammerReport::default();
    for outcome in join_all(senders).await {
        report.absorb(outcome.context("sender task panicked")?);
    }
    info!(succeeded = report.succeeded, failed = report.failed, "hammer finished");
    Ok(report)
}

async fn hammer(client: Client, host: String, pid: u32, sender: usize, deadline: Instant) -> HammerReport {
    let mut report = HammerReport::default();
    let mut nail = 0u64;
    while Instant::now() < deadline {
        let url = format!("http://{host}/log/hammer_{pid}_{sender}_nail_{nail}");
        nail += 1;
        match client.get(&url).send().await {
            Ok(response) if response.status().is_success() => report.succeeded += 1,
            Ok(response) => {
                debug!(%url, status = %response.status(), "create refused");
                report.failed += 1;
            }
            Err(err) => {
                debug!(%url, error = %err, "create failed");
                report.failed += 1;
            }
        }
    }
    report
}
