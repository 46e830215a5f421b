//! Choosing which nodes take part in an operation.
//!
//! A [`Cohort`] combines a replication mode ([`RwMode`]) with a liveness source
//! and hands the coordinator a random subset of alive hosts big enough for the
//! requested operation.

use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::error::NodeSetError;

/// Peer sets for each kind of client operation.
///
/// An error means the operation cannot run at all and must fail before any
/// RPC is issued.
pub trait NodeSet: Send + Sync {
    fn create_set(&self) -> Result<Vec<String>, NodeSetError>;
    fn read_set(&self) -> Result<Vec<String>, NodeSetError>;
    fn update_set(&self) -> Result<Vec<String>, NodeSetError>;
    fn delete_set(&self) -> Result<Vec<String>, NodeSetError>;
}

/// Anything that knows which hosts are currently reachable.
pub trait LivenessChecker: Send + Sync {
    fn alive_hosts(&self) -> Vec<String>;
}

impl<T: LivenessChecker + ?Sized> LivenessChecker for Arc<T> {
    fn alive_hosts(&self) -> Vec<String> {
        (**self).alive_hosts()
    }
}

/// A fixed alive set.
#[derive(Debug, Clone, Default)]
pub struct StaticLiveness {
    hosts: Vec<String>,
}

impl StaticLiveness {
    pub fn new(hosts: Vec<String>) -> Self {
        Self { hosts }
    }
}

impl LivenessChecker for StaticLiveness {
    fn alive_hosts(&self) -> Vec<String> {
        self.hosts.clone()
    }
}

/// How many nodes each operation needs, for a cluster of `nodes` hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RwMode {
    ReadOneWriteAll { nodes: usize },
    ReadMajorityWriteMajority { nodes: usize },
}

impl RwMode {
    pub fn nodes_to_create(self) -> usize {
        match self {
            RwMode::ReadOneWriteAll { nodes } => nodes,
            RwMode::ReadMajorityWriteMajority { nodes } => majority(nodes),
        }
    }

    pub fn nodes_to_read(self) -> usize {
        match self {
            RwMode::ReadOneWriteAll { .. } => 1,
            RwMode::ReadMajorityWriteMajority { nodes } => majority(nodes),
        }
    }

    pub fn nodes_to_update(self) -> usize {
        match self {
            RwMode::ReadOneWriteAll { nodes } | RwMode::ReadMajorityWriteMajority { nodes } => nodes,
        }
    }

    pub fn nodes_to_delete(self) -> usize {
        self.nodes_to_update()
    }
}

fn majority(nodes: usize) -> usize {
    nodes / 2 + 1
}

pub struct Cohort<L> {
    mode: RwMode,
    liveness: L,
    this_host: String,
}

impl<L: LivenessChecker> Cohort<L> {
    pub fn new(this_host: impl Into<String>, mode: RwMode, liveness: L) -> Self {
        Self {
            mode,
            liveness,
            this_host: this_host.into(),
        }
    }

    pub fn alive_set(&self) -> Vec<String> {
        self.liveness.alive_hosts()
    }

    fn nodes(&self, required: usize) -> Result<Vec<String>, NodeSetError> {
        if required == 1 {
            return Ok(vec![self.this_host.clone()]);
        }

        let mut alive = self.liveness.alive_hosts();
        if alive.len() < required {
            return Err(NodeSetError::NotEnoughHosts {
                required,
                alive: alive.len(),
            });
        }

        // Shuffle so the same hosts don't take every request.
        alive.shuffle(&mut rand::thread_rng());
        alive.truncate(required);
        Ok(alive)
    }
}

impl<L: LivenessChecker> NodeSet for Cohort<L> {
    fn create_set(&self) -> Result<Vec<String>, NodeSetError> {
        self.nodes(self.mode.nodes_to_create())
    }

    fn read_set(&self) -> Result<Vec<String>, NodeSetError> {
        self.nodes(self.mode.nodes_to_read())
    }

    fn update_set(&self) -> Result<Vec<String>, NodeSetError> {
        self.nodes(self.mode.nodes_to_update())
    }

    fn delete_set(&self) -> Result<Vec<String>, NodeSetError> {
        self.nodes(self.mode.nodes_to_delete())
    }
}
