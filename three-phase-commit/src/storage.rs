//! Per-node storage that stages, applies and discards transaction values.
//!
//! The engine only talks to the [`Storage`] trait. [`InMemoryStorage`] is the
//! implementation the binary ships with: committed values live in memory and
//! vanish with the process, which matches the engine's own lack of durability.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::error::StorageError;

/// Storage contract consumed by the engine.
///
/// Values are staged and applied under the transaction id that carried them.
pub trait Storage: Send + Sync {
    fn read(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Stages `value` for `transaction_id`. Returns false if the id is already staged.
    fn prepare(&self, transaction_id: &[u8], value: &[u8]) -> bool;

    /// Applies the staged value for `transaction_id`.
    fn commit(&self, transaction_id: &[u8]) -> Result<(), StorageError>;

    /// Drops the staged value. Returns false if nothing was staged.
    fn abort(&self, transaction_id: &[u8]) -> bool;

    /// Combines the answers several nodes gave for the same read request.
    fn merge(&self, request: &[u8], responses: &[Vec<u8>]) -> Option<Vec<u8>>;

    /// Human-readable diagnostics.
    fn stats(&self) -> String;
}

#[derive(Default)]
struct Tables {
    staged: BTreeMap<Vec<u8>, Vec<u8>>,
    committed: BTreeMap<Vec<u8>, Vec<u8>>,
}

/// Thread-safe in-memory storage.
///
/// Both tables sit behind one mutex so a commit moves a value from `staged` to
/// `committed` atomically. `BTreeMap` keeps the stats output in key order.
#[derive(Default)]
pub struct InMemoryStorage {
    tables: Mutex<Tables>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of values staged but neither committed nor aborted.
    pub fn staged_len(&self) -> usize {
        self.tables.lock().staged.len()
    }
}

impl Storage for InMemoryStorage {
    fn read(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.tables.lock().committed.get(key).cloned()
    }

    fn prepare(&self, transaction_id: &[u8], value: &[u8]) -> bool {
        let mut tables = self.tables.lock();
        if tables.staged.contains_key(transaction_id) {
            return false;
        }
        tables.staged.insert(transaction_id.to_vec(), value.to_vec());
        true
    }

    fn commit(&self, transaction_id: &[u8]) -> Result<(), StorageError> {
        let mut tables = self.tables.lock();
        let value = tables.staged.remove(transaction_id).ok_or_else(|| {
            StorageError::NothingStaged(String::from_utf8_lossy(transaction_id).into_owned())
        })?;
        tables.committed.insert(transaction_id.to_vec(), value);
        Ok(())
    }

    fn abort(&self, transaction_id: &[u8]) -> bool {
        self.tables.lock().staged.remove(transaction_id).is_some()
    }

    /// Unions the JSON objects returned by each node.
    ///
    /// Empty responses (a node that has nothing for the key) are skipped. Any
    /// response that is not a JSON object fails the whole merge. Returns `None`
    /// when no node contributed anything.
    fn merge(&self, _request: &[u8], responses: &[Vec<u8>]) -> Option<Vec<u8>> {
        let mut merged = Map::new();
        let mut contributed = false;

        for response in responses.iter().filter(|response| !response.is_empty()) {
            match serde_json::from_slice::<Value>(response) {
                Ok(Value::Object(fields)) => {
                    merged.extend(fields);
                    contributed = true;
                }
                _ => return None,
            }
        }

        if !contributed {
            return None;
        }
        serde_json::to_vec(&Value::Object(merged)).ok()
    }

    fn stats(&self) -> String {
        let tables = self.tables.lock();
        let mut output = String::from("In Memory Storage Statistics\n");
        for (key, value) in &tables.committed {
            let _ = writeln!(
                output,
                "{}\t{}",
                String::from_utf8_lossy(key),
                String::from_utf8_lossy(value)
            );
        }
        let _ = writeln!(output, "staged\t{}", tables.staged.len());
        output
    }
}
