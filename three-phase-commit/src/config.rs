//! Engine configuration.

use std::time::Duration;

/// Phase timeout used when none is configured.
pub const DEFAULT_PHASE_TIMEOUT: Duration = Duration::from_secs(1);

/// Timing of the per-transaction recovery tasks.
///
/// All four values are usually derived from one phase timeout through
/// [`RecoveryConfig::from_phase_timeout`]; tests tune them individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryConfig {
    pub phase_timeout: Duration,
    /// How long a prepared transaction waits before committing on its own.
    pub auto_commit_delay: Duration,
    /// Pause between two rounds of termination polling.
    pub termination_interval: Duration,
    /// How long a finished transaction stays in the registry.
    pub retention: Duration,
}

impl RecoveryConfig {
    /// Auto-commit and poll peers on the scale of two timeouts, keep finished
    /// transactions around for a hundred.
    ///
    /// A full coordinator round has to fit inside one phase timeout, otherwise
    /// a prepared node can poll peers that are about to be prepared and abort.
    pub fn from_phase_timeout(phase_timeout: Duration) -> Self {
        Self {
            phase_timeout,
            auto_commit_delay: phase_timeout * 2,
            termination_interval: phase_timeout * 2,
            retention: phase_timeout * 100,
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self::from_phase_timeout(DEFAULT_PHASE_TIMEOUT)
    }
}

/// Identity and timing of one engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// This node's own destination identifier, as it appears in peer lists.
    pub node_id: String,
    pub recovery: RecoveryConfig,
}

impl EngineConfig {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            recovery: RecoveryConfig::default(),
        }
    }

    pub fn with_recovery(mut self, recovery: RecoveryConfig) -> Self {
        self.recovery = recovery;
        self
    }
}
