use std::fmt;

use serde::{Deserialize, Serialize};

/// A node's local view of where one transaction stands.
///
/// Transitions only move forward: `Uncertain → Prepared → Committed`, with
/// `Aborted` reachable from either non-terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Storage has staged the value; not yet allowed to apply it.
    Uncertain,
    /// Promised to commit if asked. Recovery timers are running.
    Prepared,
    Committed,
    Aborted,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Committed | Phase::Aborted)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Uncertain => "uncertain",
            Phase::Prepared => "prepared",
            Phase::Committed => "committed",
            Phase::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// A transaction as tracked by one node's registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub id: String,
    pub peers: Vec<String>,
    pub payload: Vec<u8>,
    pub phase: Phase,
}

impl TransactionRecord {
    pub fn new(id: impl Into<String>, peers: Vec<String>, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            peers,
            payload,
            phase: Phase::Uncertain,
        }
    }

    /// Encodes the record for an `InitializeTransaction` call. The phase stays local.
    pub fn encode(&self) -> bincode::Result<Vec<u8>> {
        let wire = WireTransaction {
            peers: self.peers.clone(),
            data: self.payload.clone(),
            transaction_id: self.id.clone(),
        };
        bincode::serialize(&wire)
    }

    /// Decodes a record received from a coordinator; it always starts `Uncertain`.
    pub fn decode(bytes: &[u8]) -> bincode::Result<Self> {
        let wire: WireTransaction = bincode::deserialize(bytes)?;
        Ok(Self::new(wire.transaction_id, wire.peers, wire.data))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireTransaction {
    peers: Vec<String>,
    data: Vec<u8>,
    transaction_id: String,
}
