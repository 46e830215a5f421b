//! Error types shared across the crate.

use thiserror::Error;

use crate::comm::CommError;
use crate::transaction::Phase;

/// Why a participant refused an operation.
#[derive(Debug, Error)]
pub enum TxError {
    #[error("could not decode transaction: {0}")]
    Decode(#[from] bincode::Error),

    #[error("transaction {0} already exists")]
    AlreadyExists(String),

    #[error("transaction {0} not found")]
    NotFound(String),

    #[error("transaction {id} is {actual}, expected {expected}")]
    WrongPhase {
        id: String,
        expected: Phase,
        actual: Phase,
    },

    #[error("transaction {0} was already committed")]
    AlreadyCommitted(String),

    #[error("storage refused to stage transaction {0}")]
    StorageRefused(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no staged value for transaction {0}")]
    NothingStaged(String),
}

/// Raised by a [`crate::cohort::NodeSet`] when no peer set can be formed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeSetError {
    #[error("not enough alive hosts: need {required}, have {alive}")]
    NotEnoughHosts { required: usize, alive: usize },
}

/// Failure of a client-facing coordinator operation.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error(transparent)]
    NodeSet(#[from] NodeSetError),

    #[error("transaction {id} did not commit on every peer")]
    Rejected { id: String },

    #[error("read from {destination} failed: {source}")]
    ReadFailed {
        destination: String,
        #[source]
        source: CommError,
    },

    #[error("could not merge read results")]
    MergeFailed,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CheckupError {
    #[error("checkup is already running")]
    AlreadyRunning,

    #[error("checkup is already stopped")]
    AlreadyStopped,
}

/// A node configuration the protocol cannot run safely with.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("--node {node} does not name one of the {hosts} hosts")]
    NodeOutOfRange { node: usize, hosts: usize },

    #[error(
        "a round over {hosts} hosts can take {round_ms} ms ({hosts} x {rpc_timeout_ms} ms rpc timeout), \
         which must stay below the {phase_timeout_ms} ms phase timeout"
    )]
    RoundExceedsPhaseTimeout {
        hosts: usize,
        rpc_timeout_ms: u64,
        round_ms: u64,
        phase_timeout_ms: u64,
    },
}
