//! The per-node engine handle.
//!
//! [`ThreePhase`] owns everything one node needs to take part in transactions:
//! its collaborators, its registry and its timing. The protocol itself lives in
//! [`crate::coordinator`], [`crate::participant`] and [`crate::recovery`], each
//! adding methods to this type.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::warn;

use crate::cohort::NodeSet;
use crate::comm::CommunicationHandler;
use crate::config::{EngineConfig, RecoveryConfig};
use crate::registry::TransactionRegistry;
use crate::storage::Storage;
use crate::transaction::Phase;

/// Cheaply cloneable handle to one node's engine.
///
/// Clones share the same registry, so recovery tasks can hold their own handle
/// while the server keeps its own.
#[derive(Clone)]
pub struct ThreePhase {
    pub(crate) state: Arc<EngineState>,
}

pub(crate) struct EngineState {
    pub(crate) config: EngineConfig,
    pub(crate) comm: Arc<dyn CommunicationHandler>,
    pub(crate) storage: Arc<dyn Storage>,
    pub(crate) nodes: Arc<dyn NodeSet>,
    pub(crate) registry: TransactionRegistry,
}

impl ThreePhase {
    pub fn new(
        config: EngineConfig,
        comm: Arc<dyn CommunicationHandler>,
        storage: Arc<dyn Storage>,
        nodes: Arc<dyn NodeSet>,
    ) -> Self {
        Self {
            state: Arc::new(EngineState {
                config,
                comm,
                storage,
                nodes,
                registry: TransactionRegistry::new(),
            }),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.state.config.node_id
    }

    pub fn recovery_config(&self) -> &RecoveryConfig {
        &self.state.config.recovery
    }

    /// Current phase of `id`, or `None` if this node doesn't know it (never
    /// initialized here, or already garbage-collected).
    pub fn status(&self, id: &str) -> Option<Phase> {
        self.state.registry.phase(id)
    }

    pub fn peers(&self, id: &str) -> Option<Vec<String>> {
        self.state.registry.peers(id)
    }

    /// Number of transactions currently held in the registry.
    pub fn pending(&self) -> usize {
        self.state.registry.len()
    }

    pub fn stats(&self) -> String {
        self.state.storage.stats()
    }

    /// Runs a recovery task on the current tokio runtime.
    ///
    /// Outside a runtime the task is dropped with a warning; the transaction then
    /// only moves on through explicit RPCs.
    pub(crate) fn spawn_task<F>(&self, task: &'static str, id: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(future);
            }
            Err(_) => warn!(%id, task, "no tokio runtime, recovery task not scheduled"),
        }
    }
}
