//! Coordinator side: drives a transaction through its three rounds.
//!
//! Rounds run one after the other and every peer must acknowledge each round.
//! Calls inside a round are issued sequentially; a peer that never answers
//! stalls the round until the [`CommunicationHandler`] gives up on it.
//!
//! [`CommunicationHandler`]: crate::comm::CommunicationHandler

use std::fmt;

use nanoid::nanoid;
use tracing::{debug, error, info, warn};

use crate::comm::CommError;
use crate::engine::ThreePhase;
use crate::error::OperationError;
use crate::transaction::TransactionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Round {
    Init,
    PreCommit,
    DoCommit,
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Round::Init => "init",
            Round::PreCommit => "precommit",
            Round::DoCommit => "commit",
        };
        f.write_str(name)
    }
}

impl ThreePhase {
    /// Runs transaction `id` carrying `payload` across `peers`.
    ///
    /// Returns true only if every peer acknowledged every round. A failed Init
    /// or PreCommit round is followed by a best-effort abort on every peer. A
    /// partially failed DoCommit round is not rolled back: peers that missed the
    /// commit are already prepared and finish through their own recovery.
    pub async fn commit_tx(&self, id: &str, payload: &[u8], peers: &[String]) -> bool {
        info!(%id, peers = peers.len(), "starting transaction");
        let record = TransactionRecord::new(id, peers.to_vec(), payload.to_vec());
        let encoded = match record.encode() {
            Ok(encoded) => encoded,
            Err(err) => {
                error!(%id, error = %err, "could not encode transaction");
                return false;
            }
        };

        for round in [Round::Init, Round::PreCommit] {
            if !self.run_round(round, id, &encoded, peers).await {
                warn!(%id, %round, "round failed, aborting transaction");
                self.abort_all(id, peers).await;
                return false;
            }
        }

        let committed = self.run_round(Round::DoCommit, id, &encoded, peers).await;
        if committed {
            info!(%id, "transaction committed on every peer");
        } else {
            warn!(%id, "commit round incomplete, stragglers will recover on their own");
        }
        committed
    }

    /// Creates a new value on the create set. Returns the transaction id.
    pub async fn create(&self, payload: &[u8]) -> Result<String, OperationError> {
        let peers = self.state.nodes.create_set()?;
        self.commit_new(payload, &peers).await
    }

    pub async fn update(&self, payload: &[u8]) -> Result<String, OperationError> {
        let peers = self.state.nodes.update_set()?;
        self.commit_new(payload, &peers).await
    }

    pub async fn delete(&self, payload: &[u8]) -> Result<String, OperationError> {
        let peers = self.state.nodes.delete_set()?;
        self.commit_new(payload, &peers).await
    }

    /// Reads `key` from every node of the read set and merges the answers.
    ///
    /// Any node that cannot be read fails the whole read.
    pub async fn read(&self, key: &[u8]) -> Result<Vec<u8>, OperationError> {
        let nodes = self.state.nodes.read_set()?;

        let mut responses = Vec::with_capacity(nodes.len());
        for node in nodes {
            match self.state.comm.read_data(key, &node).await {
                Ok(response) => responses.push(response),
                Err(source) => {
                    warn!(%node, error = %source, "read failed");
                    return Err(OperationError::ReadFailed {
                        destination: node,
                        source,
                    });
                }
            }
        }

        self.state
            .storage
            .merge(key, &responses)
            .ok_or(OperationError::MergeFailed)
    }

    async fn commit_new(&self, payload: &[u8], peers: &[String]) -> Result<String, OperationError> {
        let id = nanoid!();
        if self.commit_tx(&id, payload, peers).await {
            Ok(id)
        } else {
            Err(OperationError::Rejected { id })
        }
    }

    /// Calls `round` on every peer until one of them fails.
    ///
    /// The commit round keeps going past a failure so that as many peers as
    /// possible commit right away.
    async fn run_round(&self, round: Round, id: &str, encoded: &[u8], peers: &[String]) -> bool {
        debug!(%id, %round, "starting round");
        let mut unanimous = true;
        for peer in peers {
            let acknowledged = match self.call(round, id, encoded, peer).await {
                Ok(true) => true,
                Ok(false) => {
                    warn!(%id, %round, %peer, "peer refused");
                    false
                }
                Err(err) => {
                    warn!(%id, %round, %peer, error = %err, "peer did not answer");
                    false
                }
            };

            if !acknowledged {
                unanimous = false;
                if round != Round::DoCommit {
                    break;
                }
            }
        }
        unanimous
    }

    async fn call(&self, round: Round, id: &str, encoded: &[u8], peer: &str) -> Result<bool, CommError> {
        let comm = &self.state.comm;
        match round {
            Round::Init => comm.initialize_transaction(encoded, peer).await,
            Round::PreCommit => comm.pre_commit(id, peer).await,
            Round::DoCommit => comm.do_commit(id, peer).await,
        }
    }

    /// Best-effort abort on every peer; failures are only logged.
    async fn abort_all(&self, id: &str, peers: &[String]) {
        for peer in peers {
            match self.state.comm.abort(id, peer).await {
                Ok(true) => {}
                Ok(false) => debug!(%id, %peer, "peer had nothing to abort"),
                Err(err) => debug!(%id, %peer, error = %err, "abort did not reach peer"),
            }
        }
    }
}
