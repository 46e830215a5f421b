//! Participant side of the protocol: the calls a coordinator (possibly this
//! very node) makes on every peer.
//!
//! Each mutating call takes the registry's exclusive lock for its whole
//! check-then-act sequence, so two calls for the same transaction never
//! interleave. The storage call happens under that lock too, in the documented
//! order: stage before inserting, apply or discard before moving the phase.

use tracing::{debug, error, info, warn};

use crate::engine::ThreePhase;
use crate::error::TxError;
use crate::transaction::{Phase, TransactionRecord};

impl ThreePhase {
    /// Registers a transaction sent by a coordinator and stages its payload.
    ///
    /// Rejected if the record cannot be decoded, if this node already holds a
    /// transaction with the same id, or if storage refuses to stage the value.
    /// A rejection leaves both the registry and storage untouched.
    pub fn initialize_transaction(&self, encoded: &[u8]) -> Result<(), TxError> {
        let record = TransactionRecord::decode(encoded).inspect_err(|err| {
            warn!(error = %err, len = encoded.len(), "could not decode transaction");
        })?;
        let id = record.id.clone();

        let mut transactions = self.state.registry.write();
        if transactions.contains_key(&id) {
            debug!(%id, "transaction already initialized");
            return Err(TxError::AlreadyExists(id));
        }

        if !self.state.storage.prepare(id.as_bytes(), &record.payload) {
            warn!(%id, "storage refused to stage transaction");
            return Err(TxError::StorageRefused(id));
        }

        transactions.insert(id.clone(), record);
        debug!(%id, "transaction initialized");
        Ok(())
    }

    /// Moves an `Uncertain` transaction to `Prepared` and starts its recovery
    /// tasks (auto-commit and termination polling).
    pub fn pre_commit(&self, id: &str) -> Result<(), TxError> {
        {
            let mut transactions = self.state.registry.write();
            let record = lookup(&mut transactions, id)?;
            expect_phase(record, Phase::Uncertain)?;
            record.phase = Phase::Prepared;
        }

        debug!(%id, "transaction prepared");
        self.schedule_auto_commit(id);
        self.schedule_termination_protocol(id);
        Ok(())
    }

    /// Applies a `Prepared` transaction.
    pub fn do_commit(&self, id: &str) -> Result<(), TxError> {
        {
            let mut transactions = self.state.registry.write();
            let record = lookup(&mut transactions, id)?;
            expect_phase(record, Phase::Prepared)?;

            // On failure the record stays prepared.
            self.state.storage.commit(id.as_bytes()).inspect_err(|err| {
                error!(%id, error = %err, "storage could not apply prepared transaction");
            })?;
            record.phase = Phase::Committed;
        }

        info!(%id, "transaction committed");
        self.schedule_cleanup(id);
        Ok(())
    }

    /// Discards any transaction that hasn't committed.
    ///
    /// Aborting an already aborted transaction succeeds again without side effects.
    pub fn abort(&self, id: &str) -> Result<(), TxError> {
        let previous = {
            let mut transactions = self.state.registry.write();
            let record = lookup(&mut transactions, id)?;
            if record.phase == Phase::Committed {
                debug!(%id, "refusing to abort committed transaction");
                return Err(TxError::AlreadyCommitted(id.to_string()));
            }

            self.state.storage.abort(id.as_bytes());
            std::mem::replace(&mut record.phase, Phase::Aborted)
        };

        if previous != Phase::Aborted {
            info!(%id, from = %previous, "transaction aborted");
            self.schedule_cleanup(id);
        }
        Ok(())
    }

    /// Whether this node has committed or is ready to commit `id`.
    ///
    /// `Prepared` counts as ready: such a node has promised to commit and will
    /// get there on its own. Unknown ids report false.
    pub fn check_commit(&self, id: &str) -> bool {
        matches!(self.status(id), Some(Phase::Committed | Phase::Prepared))
    }

    /// Reads a committed value from this node's storage only.
    pub fn local_read(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.state.storage.read(key)
    }
}

fn lookup<'a>(
    transactions: &'a mut crate::registry::Transactions,
    id: &str,
) -> Result<&'a mut TransactionRecord, TxError> {
    transactions.get_mut(id).ok_or_else(|| {
        debug!(%id, "transaction not found");
        TxError::NotFound(id.to_string())
    })
}

fn expect_phase(record: &TransactionRecord, expected: Phase) -> Result<(), TxError> {
    if record.phase == expected {
        return Ok(());
    }
    debug!(id = %record.id, %expected, actual = %record.phase, "transaction in wrong phase");
    Err(TxError::WrongPhase {
        id: record.id.clone(),
        expected,
        actual: record.phase,
    })
}
