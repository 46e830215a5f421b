//! Three-phase commit across a cluster of cooperating nodes.
//!
//! A transaction either takes effect on every participating node or on none.
//! Unlike two-phase commit, a participant that has acknowledged "prepared" can
//! resolve the transaction on its own (auto-commit or the termination protocol)
//! instead of blocking on a coordinator that may never come back.
//!
//! # Architecture
//!
//! Every node runs one [`engine::ThreePhase`] instance which plays both roles:
//!
//! - **Coordinator**: drives Init → PreCommit → DoCommit rounds across a peer set
//!   obtained from a [`cohort::NodeSet`], talking to peers (itself included)
//!   through a [`comm::CommunicationHandler`].
//! - **Participant**: answers those calls, tracking one [`transaction::Phase`] per
//!   transaction in a [`registry::TransactionRegistry`] and staging/applying
//!   values in a [`storage::Storage`].
//!
//! Recovery tasks (auto-commit, termination polling, garbage collection) are
//! plain tokio tasks scoped to one transaction. They never get cancelled: a task
//! that wakes up re-reads the phase under the registry lock and does nothing if a
//! concurrent call already moved the transaction on.
//!
//! # Modules
//!
//! - [`transaction`]: phases, the transaction record and its wire encoding
//! - [`registry`]: lock-protected map of in-flight transactions
//! - [`storage`]: storage contract plus an in-memory implementation
//! - [`comm`]: RPC contract used to reach peers
//! - [`cohort`]: node-set selection under a replication mode
//! - [`checkup`]: TCP liveness probing feeding the cohort
//! - [`config`]: timing configuration
//! - [`engine`]: the per-node handle tying everything together
//! - [`participant`], [`recovery`], [`coordinator`]: protocol logic
//! - [`transport`]: HTTP wiring and an in-process network
//! - [`cli`], [`hammer`]: command-line surface of the binary

pub mod checkup;
pub mod cli;
pub mod cohort;
pub mod comm;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod hammer;
pub mod participant;
pub mod recovery;
pub mod registry;
pub mod storage;
pub mod transaction;
pub mod transport;

pub use config::{EngineConfig, RecoveryConfig};
pub use engine::ThreePhase;
pub use transaction::Phase;
