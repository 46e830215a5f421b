use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::cohort::RwMode;
use crate::config::{EngineConfig, RecoveryConfig};
use crate::error::ConfigError;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one node of the cluster.
    Serve(ServeArgs),
    /// Flood a node with create requests and report how many went through.
    Hammer(HammerArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Read and write a majority of nodes.
    Majority,
    /// Read one node, write all of them.
    Rowa,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Which of the `--host` entries is this node, counting from 1.
    #[arg(long)]
    pub node: usize,

    /// Every host of the cluster as `addr:port`, this node included.
    #[arg(long = "host", value_delimiter = ',', required = true)]
    pub hosts: Vec<String>,

    /// Recovery timers run on multiples of this. It must exceed one full round,
    /// i.e. the rpc timeout times the number of hosts.
    #[arg(long, default_value_t = 5000)]
    pub phase_timeout_ms: u64,

    /// Upper bound on a single call to a peer.
    #[arg(long, default_value_t = 500)]
    pub rpc_timeout_ms: u64,

    #[arg(long, default_value_t = 5000)]
    pub probe_interval_ms: u64,

    #[arg(long, value_enum, default_value_t = Mode::Majority)]
    pub mode: Mode,
}

impl ServeArgs {
    /// Checks that `--node` is in range and that a coordinator round where
    /// every call runs into the rpc timeout still ends before the phase
    /// timeout. Otherwise a prepared node can give up on peers that are about
    /// to be prepared.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.this_host().is_none() {
            return Err(ConfigError::NodeOutOfRange {
                node: self.node,
                hosts: self.hosts.len(),
            });
        }

        let round_ms = self.rpc_timeout_ms.saturating_mul(self.hosts.len() as u64);
        if round_ms >= self.phase_timeout_ms {
            return Err(ConfigError::RoundExceedsPhaseTimeout {
                hosts: self.hosts.len(),
                rpc_timeout_ms: self.rpc_timeout_ms,
                round_ms,
                phase_timeout_ms: self.phase_timeout_ms,
            });
        }
        Ok(())
    }

    /// The `--host` entry selected by `--node`, if it exists.
    pub fn this_host(&self) -> Option<&str> {
        self.node
            .checked_sub(1)
            .and_then(|index| self.hosts.get(index))
            .map(String::as_str)
    }

    pub fn engine_config(&self, node_id: &str) -> EngineConfig {
        let phase_timeout = Duration::from_millis(self.phase_timeout_ms);
        EngineConfig::new(node_id).with_recovery(RecoveryConfig::from_phase_timeout(phase_timeout))
    }

    pub fn rw_mode(&self) -> RwMode {
        let nodes = self.hosts.len();
        match self.mode {
            Mode::Majority => RwMode::ReadMajorityWriteMajority { nodes },
            Mode::Rowa => RwMode::ReadOneWriteAll { nodes },
        }
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }
}

#[derive(Args, Debug, Clone)]
pub struct HammerArgs {
    /// How long to keep sending requests.
    #[arg(long, default_value_t = 5)]
    pub seconds: u64,

    /// Number of concurrent senders.
    #[arg(long, default_value_t = 1)]
    pub threads: usize,

    /// Node to send requests to, as `addr:port`.
    pub host: String,
}
