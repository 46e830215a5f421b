//! TCP liveness probing.
//!
//! [`TcpCheckup`] keeps one alive/dead flag per host. Once started, a tokio task
//! per host tries to open a TCP connection every probe interval and flips the
//! flag when the outcome changes. Hosts start out dead until their first
//! successful probe.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

use crate::cohort::LivenessChecker;
use crate::error::CheckupError;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// Called with `(host, is_alive)` whenever a host changes state.
pub type StateChangeCallback = Arc<dyn Fn(&str, bool) + Send + Sync>;

struct CheckupState {
    alive: RwLock<HashMap<String, bool>>,
    probe_timeout: RwLock<Duration>,
    probe_interval: RwLock<Duration>,
    on_change: RwLock<Option<StateChangeCallback>>,
}

pub struct TcpCheckup {
    state: Arc<CheckupState>,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl TcpCheckup {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let alive = hosts.into_iter().map(|host| (host.into(), false)).collect();
        Self {
            state: Arc::new(CheckupState {
                alive: RwLock::new(alive),
                probe_timeout: RwLock::new(DEFAULT_PROBE_TIMEOUT),
                probe_interval: RwLock::new(DEFAULT_PROBE_INTERVAL),
                on_change: RwLock::new(None),
            }),
            stop_tx: Mutex::new(None),
        }
    }

    pub fn dead_hosts(&self) -> Vec<String> {
        self.hosts_where(false)
    }

    pub fn probe_timeout(&self) -> Duration {
        *self.state.probe_timeout.read()
    }

    pub fn set_probe_timeout(&self, probe_timeout: Duration) {
        *self.state.probe_timeout.write() = probe_timeout;
    }

    pub fn probe_interval(&self) -> Duration {
        *self.state.probe_interval.read()
    }

    pub fn set_probe_interval(&self, probe_interval: Duration) {
        *self.state.probe_interval.write() = probe_interval;
    }

    pub fn set_state_change_handler(&self, callback: StateChangeCallback) {
        *self.state.on_change.write() = Some(callback);
    }

    /// Spawns the probe tasks. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), CheckupError> {
        let mut stop_tx = self.stop_tx.lock();
        if stop_tx.is_some() {
            return Err(CheckupError::AlreadyRunning);
        }

        let (tx, rx) = watch::channel(false);
        let hosts: Vec<String> = self.state.alive.read().keys().cloned().collect();
        for host in hosts {
            tokio::spawn(probe_host(Arc::clone(&self.state), host, rx.clone()));
        }
        *stop_tx = Some(tx);
        Ok(())
    }

    pub fn stop(&self) -> Result<(), CheckupError> {
        let tx = self.stop_tx.lock().take().ok_or(CheckupError::AlreadyStopped)?;
        let _ = tx.send(true);
        Ok(())
    }

    fn hosts_where(&self, alive: bool) -> Vec<String> {
        let mut hosts: Vec<String> = self
            .state
            .alive
            .read()
            .iter()
            .filter(|(_, is_alive)| **is_alive == alive)
            .map(|(host, _)| host.clone())
            .collect();
        hosts.sort();
        hosts
    }
}

impl LivenessChecker for TcpCheckup {
    fn alive_hosts(&self) -> Vec<String> {
        self.hosts_where(true)
    }
}

impl Drop for TcpCheckup {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.get_mut().take() {
            let _ = tx.send(true);
        }
    }
}

async fn probe_host(state: Arc<CheckupState>, host: String, mut stop_rx: watch::Receiver<bool>) {
    loop {
        let interval = *state.probe_interval.read();
        tokio::select! {
            _ = stop_rx.changed() => {
                debug!(%host, "liveness probe stopped");
                return;
            }
            _ = sleep(interval) => {}
        }

        let probe_timeout = *state.probe_timeout.read();
        let is_alive = matches!(
            timeout(probe_timeout, TcpStream::connect(host.as_str())).await,
            Ok(Ok(_))
        );

        let changed = {
            let mut alive = state.alive.write();
            match alive.get_mut(&host) {
                Some(current) if *current != is_alive => {
                    *current = is_alive;
                    true
                }
                _ => false,
            }
        };

        if changed {
            info!(%host, alive = is_alive, "host changed state");
            let callback = state.on_change.read().clone();
            if let Some(callback) = callback {
                callback(&host, is_alive);
            }
        }
    }
}
