//! The table of transactions a node currently knows about.
//!
//! One exclusive lock covers inserts, removals and every check-then-mutate of a
//! record's phase. Plain phase reads share the lock. Transactions with different
//! ids never coordinate with each other beyond contending for this lock.

use std::collections::HashMap;

use parking_lot::{RwLock, RwLockWriteGuard};

use crate::transaction::{Phase, TransactionRecord};

pub type Transactions = HashMap<String, TransactionRecord>;

#[derive(Default)]
pub struct TransactionRegistry {
    transactions: RwLock<Transactions>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclusive access for a check-then-mutate sequence.
    ///
    /// Callers must not hold the guard across an `.await`.
    pub fn write(&self) -> RwLockWriteGuard<'_, Transactions> {
        self.transactions.write()
    }

    pub fn phase(&self, id: &str) -> Option<Phase> {
        self.transactions.read().get(id).map(|record| record.phase)
    }

    pub fn peers(&self, id: &str) -> Option<Vec<String>> {
        self.transactions.read().get(id).map(|record| record.peers.clone())
    }

    pub fn remove(&self, id: &str) -> Option<TransactionRecord> {
        self.transactions.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.transactions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.read().is_empty()
    }
}
