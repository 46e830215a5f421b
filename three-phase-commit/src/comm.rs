//! Contract for reaching other nodes.
//!
//! Each call targets one destination and mirrors a participant operation on
//! that node. Implementations must bound the latency of every call: the
//! coordinator issues calls one after another and has no deadline of its own, so
//! a call that never returns stalls the whole round.
//!
//! For the protocol an `Err` means the same as `Ok(false)`. The distinction is
//! only ever logged.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommError {
    #[error("{destination} is unreachable: {reason}")]
    Unreachable { destination: String, reason: String },

    #[error("call to {destination} timed out")]
    Timeout { destination: String },

    #[error("{destination} answered with unexpected status {status}")]
    Rejected { destination: String, status: u16 },

    /// The transport can only carry UTF-8 read keys.
    #[error("read key for {destination} is not valid utf-8")]
    InvalidKey { destination: String },
}

impl CommError {
    pub fn unreachable(destination: &str, reason: impl ToString) -> Self {
        CommError::Unreachable {
            destination: destination.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
pub trait CommunicationHandler: Send + Sync {
    /// Sends an encoded [`crate::transaction::TransactionRecord`].
    async fn initialize_transaction(&self, record: &[u8], destination: &str) -> Result<bool, CommError>;

    async fn abort(&self, id: &str, destination: &str) -> Result<bool, CommError>;

    async fn pre_commit(&self, id: &str, destination: &str) -> Result<bool, CommError>;

    async fn do_commit(&self, id: &str, destination: &str) -> Result<bool, CommError>;

    /// Asks whether `destination` considers the transaction committed or prepared.
    async fn check_commit(&self, id: &str, destination: &str) -> Result<bool, CommError>;

    async fn read_data(&self, request: &[u8], destination: &str) -> Result<Vec<u8>, CommError>;
}
