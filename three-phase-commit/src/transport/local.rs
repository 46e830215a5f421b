//! In-process network of engines.
//!
//! [`LocalNetwork`] delivers every call by invoking the destination engine's
//! participant method directly. It is a test and demo transport: destinations
//! can be partitioned away or slowed down, and every call attempt lands in a
//! log (cleared with [`LocalNetwork::clear_calls`]) so callers can assert on the
//! exact traffic a transaction produced.
//!
//! Registered engines are held weakly. Each engine owns an `Arc` to the
//! network, so a strong handle here would keep both alive forever; once the
//! last outside handle to an engine is dropped its destination turns
//! unreachable.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::time::sleep;

use crate::comm::{CommError, CommunicationHandler};
use crate::engine::{EngineState, ThreePhase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Initialize,
    Abort,
    PreCommit,
    DoCommit,
    CheckCommit,
    ReadData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: Operation,
    pub destination: String,
}

#[derive(Default)]
pub struct LocalNetwork {
    nodes: RwLock<HashMap<String, Weak<EngineState>>>,
    partitioned: RwLock<HashSet<String>>,
    delays: RwLock<HashMap<(Operation, String), Duration>>,
    calls: Mutex<Vec<Call>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `engine` reachable under its own node id.
    pub fn register(&self, engine: &ThreePhase) {
        self.nodes
            .write()
            .insert(engine.node_id().to_string(), Arc::downgrade(&engine.state));
    }

    /// The engine registered as `destination`, if it is still alive.
    pub fn node(&self, destination: &str) -> Option<ThreePhase> {
        let state = self.nodes.read().get(destination)?.upgrade()?;
        Some(ThreePhase { state })
    }

    /// Cuts `destination` off: calls to it fail until [`heal`](Self::heal).
    pub fn partition(&self, destination: &str) {
        self.partitioned.write().insert(destination.to_string());
    }

    pub fn heal(&self, destination: &str) {
        self.partitioned.write().remove(destination);
    }

    /// Holds every `operation` call to `destination` for `delay` before delivering it.
    pub fn delay(&self, operation: Operation, destination: &str, delay: Duration) {
        self.delays
            .write()
            .insert((operation, destination.to_string()), delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Destinations that received `operation`, in call order.
    pub fn destinations(&self, operation: Operation) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.operation == operation)
            .map(|call| call.destination.clone())
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    async fn route(&self, operation: Operation, destination: &str) -> Result<ThreePhase, CommError> {
        self.calls.lock().push(Call {
            operation,
            destination: destination.to_string(),
        });

        let delay = self
            .delays
            .read()
            .get(&(operation, destination.to_string()))
            .copied();
        if let Some(delay) = delay {
            sleep(delay).await;
        }

        if self.partitioned.read().contains(destination) {
            return Err(CommError::unreachable(destination, "partitioned"));
        }
        self.node(destination)
            .ok_or_else(|| CommError::unreachable(destination, "unknown destination"))
    }
}

#[async_trait]
impl CommunicationHandler for LocalNetwork {
    async fn initialize_transaction(&self, record: &[u8], destination: &str) -> Result<bool, CommError> {
        let node = self.route(Operation::Initialize, destination).await?;
        Ok(node.initialize_transaction(record).is_ok())
    }

    async fn abort(&self, id: &str, destination: &str) -> Result<bool, CommError> {
        let node = self.route(Operation::Abort, destination).await?;
        Ok(node.abort(id).is_ok())
    }

    async fn pre_commit(&self, id: &str, destination: &str) -> Result<bool, CommError> {
        let node = self.route(Operation::PreCommit, destination).await?;
        Ok(node.pre_commit(id).is_ok())
    }

    async fn do_commit(&self, id: &str, destination: &str) -> Result<bool, CommError> {
        let node = self.route(Operation::DoCommit, destination).await?;
        Ok(node.do_commit(id).is_ok())
    }

    async fn check_commit(&self, id: &str, destination: &str) -> Result<bool, CommError> {
        let node = self.route(Operation::CheckCommit, destination).await?;
        Ok(node.check_commit(id))
    }

    async fn read_data(&self, request: &[u8], destination: &str) -> Result<Vec<u8>, CommError> {
        let node = self.route(Operation::ReadData, destination).await?;
        Ok(node.local_read(request).unwrap_or_default())
    }
}
