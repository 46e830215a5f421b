//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{sleep, Instant};

use three_phase_commit::{
    cohort::{Cohort, NodeSet, RwMode, StaticLiveness},
    comm::{CommError, CommunicationHandler},
    error::{NodeSetError, StorageError},
    storage::{InMemoryStorage, Storage},
    transaction::TransactionRecord,
    transport::local::{Call, LocalNetwork, Operation},
    EngineConfig, RecoveryConfig, ThreePhase,
};

/// Recovery timing long enough that no background task fires during a test.
pub fn quiet_recovery() -> RecoveryConfig {
    RecoveryConfig::from_phase_timeout(Duration::from_secs(60))
}

pub fn encoded(id: &str, peers: &[&str], payload: &[u8]) -> Vec<u8> {
    let peers = peers.iter().map(|peer| peer.to_string()).collect();
    TransactionRecord::new(id, peers, payload.to_vec())
        .encode()
        .unwrap()
}

pub fn hosts(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

/// Polls `condition` until it holds or `within` has elapsed.
pub async fn wait_for(within: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + within;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(10)).await;
    }
}

/// Communication handler that answers from a script and records every call.
///
/// Calls succeed unless the destination was told to refuse (`Ok(false)`) or
/// fail (`Err`) for that operation.
#[derive(Default)]
pub struct ScriptedComm {
    refusals: Mutex<HashMap<Operation, HashSet<String>>>,
    failures: Mutex<HashMap<Operation, HashSet<String>>>,
    reads: Mutex<HashMap<String, Vec<u8>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedComm {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refuse(&self, operation: Operation, destination: &str) {
        self.refusals
            .lock()
            .entry(operation)
            .or_default()
            .insert(destination.to_string());
    }

    pub fn fail(&self, operation: Operation, destination: &str) {
        self.failures
            .lock()
            .entry(operation)
            .or_default()
            .insert(destination.to_string());
    }

    /// What `destination` answers to a read.
    pub fn answer_reads(&self, destination: &str, response: &[u8]) {
        self.reads
            .lock()
            .insert(destination.to_string(), response.to_vec());
    }

    /// Calls as `(operation, destination)` pairs, in order.
    pub fn calls(&self) -> Vec<(Operation, String)> {
        self.calls
            .lock()
            .iter()
            .map(|call| (call.operation, call.destination.clone()))
            .collect()
    }

    pub fn count(&self, operation: Operation) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    fn answer(&self, operation: Operation, destination: &str) -> Result<bool, CommError> {
        self.calls.lock().push(Call {
            operation,
            destination: destination.to_string(),
        });

        let listed = |table: &Mutex<HashMap<Operation, HashSet<String>>>| {
            table
                .lock()
                .get(&operation)
                .is_some_and(|destinations| destinations.contains(destination))
        };
        if listed(&self.failures) {
            return Err(CommError::unreachable(destination, "scripted failure"));
        }
        Ok(!listed(&self.refusals))
    }
}

#[async_trait]
impl CommunicationHandler for ScriptedComm {
    async fn initialize_transaction(&self, _record: &[u8], destination: &str) -> Result<bool, CommError> {
        self.answer(Operation::Initialize, destination)
    }

    async fn abort(&self, _id: &str, destination: &str) -> Result<bool, CommError> {
        self.answer(Operation::Abort, destination)
    }

    async fn pre_commit(&self, _id: &str, destination: &str) -> Result<bool, CommError> {
        self.answer(Operation::PreCommit, destination)
    }

    async fn do_commit(&self, _id: &str, destination: &str) -> Result<bool, CommError> {
        self.answer(Operation::DoCommit, destination)
    }

    async fn check_commit(&self, _id: &str, destination: &str) -> Result<bool, CommError> {
        self.answer(Operation::CheckCommit, destination)
    }

    async fn read_data(&self, _request: &[u8], destination: &str) -> Result<Vec<u8>, CommError> {
        self.answer(Operation::ReadData, destination)?;
        Ok(self.reads.lock().get(destination).cloned().unwrap_or_default())
    }
}

/// Node set that always hands out the same hosts, or always fails.
pub struct FixedNodes {
    hosts: Result<Vec<String>, NodeSetError>,
    requests: AtomicUsize,
}

impl FixedNodes {
    pub fn new(hosts: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            hosts: Ok(hosts),
            requests: AtomicUsize::new(0),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            hosts: Err(NodeSetError::NotEnoughHosts {
                required: 3,
                alive: 1,
            }),
            requests: AtomicUsize::new(0),
        })
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn hand_out(&self) -> Result<Vec<String>, NodeSetError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        match &self.hosts {
            Ok(hosts) => Ok(hosts.clone()),
            Err(NodeSetError::NotEnoughHosts { required, alive }) => Err(NodeSetError::NotEnoughHosts {
                required: *required,
                alive: *alive,
            }),
        }
    }
}

impl NodeSet for FixedNodes {
    fn create_set(&self) -> Result<Vec<String>, NodeSetError> {
        self.hand_out()
    }

    fn read_set(&self) -> Result<Vec<String>, NodeSetError> {
        self.hand_out()
    }

    fn update_set(&self) -> Result<Vec<String>, NodeSetError> {
        self.hand_out()
    }

    fn delete_set(&self) -> Result<Vec<String>, NodeSetError> {
        self.hand_out()
    }
}

/// In-memory storage that can be told to refuse staging or fail commits.
#[derive(Default)]
pub struct FlakyStorage {
    inner: InMemoryStorage,
    refuse_prepare: AtomicBool,
    fail_commit: AtomicBool,
}

impl FlakyStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refuse_prepare(&self, refuse: bool) {
        self.refuse_prepare.store(refuse, Ordering::SeqCst);
    }

    pub fn fail_commit(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }

    pub fn staged_len(&self) -> usize {
        self.inner.staged_len()
    }
}

impl Storage for FlakyStorage {
    fn read(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.inner.read(key)
    }

    fn prepare(&self, transaction_id: &[u8], value: &[u8]) -> bool {
        !self.refuse_prepare.load(Ordering::SeqCst) && self.inner.prepare(transaction_id, value)
    }

    fn commit(&self, transaction_id: &[u8]) -> Result<(), StorageError> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(StorageError::NothingStaged(
                String::from_utf8_lossy(transaction_id).into_owned(),
            ));
        }
        self.inner.commit(transaction_id)
    }

    fn abort(&self, transaction_id: &[u8]) -> bool {
        self.inner.abort(transaction_id)
    }

    fn merge(&self, request: &[u8], responses: &[Vec<u8>]) -> Option<Vec<u8>> {
        self.inner.merge(request, responses)
    }

    fn stats(&self) -> String {
        self.inner.stats()
    }
}

/// A single engine wired to scripted collaborators.
pub struct Harness {
    pub engine: ThreePhase,
    pub comm: Arc<ScriptedComm>,
    pub storage: Arc<FlakyStorage>,
    pub nodes: Arc<FixedNodes>,
}

impl Harness {
    pub fn new(peers: &[&str]) -> Self {
        Self::with_nodes(FixedNodes::new(hosts(peers)))
    }

    pub fn with_nodes(nodes: Arc<FixedNodes>) -> Self {
        Self::build(nodes, quiet_recovery())
    }

    /// A harness whose recovery tasks actually run, on `recovery`'s timers.
    pub fn with_recovery(peers: &[&str], recovery: RecoveryConfig) -> Self {
        Self::build(FixedNodes::new(hosts(peers)), recovery)
    }

    fn build(nodes: Arc<FixedNodes>, recovery: RecoveryConfig) -> Self {
        let comm = ScriptedComm::new();
        let storage = FlakyStorage::new();
        let engine = ThreePhase::new(
            EngineConfig::new("h1").with_recovery(recovery),
            comm.clone(),
            storage.clone(),
            nodes.clone(),
        );
        Self {
            engine,
            comm,
            storage,
            nodes,
        }
    }
}

/// Engines `h1..=hn` talking over a [`LocalNetwork`], all in read-one/write-all mode.
pub struct Cluster {
    pub network: Arc<LocalNetwork>,
    nodes: Vec<ThreePhase>,
}

impl Cluster {
    pub fn new(n: usize, recovery: RecoveryConfig) -> Self {
        let names: Vec<String> = (1..=n).map(|i| format!("h{i}")).collect();
        let network = Arc::new(LocalNetwork::new());

        let nodes = names
            .iter()
            .map(|name| {
                let cohort = Cohort::new(
                    name.clone(),
                    RwMode::ReadOneWriteAll { nodes: n },
                    StaticLiveness::new(names.clone()),
                );
                let engine = ThreePhase::new(
                    EngineConfig::new(name.clone()).with_recovery(recovery),
                    network.clone(),
                    Arc::new(InMemoryStorage::new()),
                    Arc::new(cohort),
                );
                network.register(&engine);
                engine
            })
            .collect();

        Self { network, nodes }
    }

    /// Node `i`, counting from 1.
    pub fn node(&self, i: usize) -> &ThreePhase {
        &self.nodes[i - 1]
    }

    pub fn nodes(&self) -> &[ThreePhase] {
        &self.nodes
    }

    pub fn hosts(&self) -> Vec<String> {
        self.nodes
            .iter()
            .map(|node| node.node_id().to_string())
            .collect()
    }

    /// Initializes `id` on every node, as the coordinator's first round would.
    pub fn initialize_everywhere(&self, id: &str, payload: &[u8]) {
        let hosts = self.hosts();
        let peers: Vec<&str> = hosts.iter().map(String::as_str).collect();
        let record = encoded(id, &peers, payload);
        for node in &self.nodes {
            node.initialize_transaction(&record).unwrap();
        }
    }
}

/// Runs `future` and fails the test if it takes longer than `limit`.
pub async fn within<F: Future>(limit: Duration, future: F) -> F::Output {
    tokio::time::timeout(limit, future)
        .await
        .expect("operation timed out")
}
