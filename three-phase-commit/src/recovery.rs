//! Timeout-driven recovery for transactions whose coordinator went quiet.
//!
//! Three kinds of task exist, each scoped to a single transaction:
//!
//! - **Auto-commit**: a prepared transaction commits on its own after
//!   [`RecoveryConfig::auto_commit_delay`](crate::RecoveryConfig).
//! - **Termination protocol**: while prepared, the node polls its peers'
//!   `check_commit` and follows them: any peer ready means commit, every peer
//!   explicitly not ready means abort, anything else means ask again later.
//!   A commit that fails locally leaves the transaction prepared, so the
//!   node simply keeps polling.
//! - **Cleanup**: a finished transaction is dropped from the registry after the
//!   retention window.
//!
//! None of these tasks can be cancelled. Each one re-reads the phase when it
//! wakes up and the participant calls it makes are phase-guarded, so a task that
//! lost a race simply has no effect.

use futures_util::future::join_all;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::engine::ThreePhase;
use crate::transaction::Phase;

/// Answers collected from one round of termination polling.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub ready: usize,
    pub not_ready: usize,
    pub unreachable: usize,
}

/// What a prepared node should do after a polling round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Commit,
    Abort,
    KeepPolling,
}

impl Tally {
    /// `others` is the number of peers polled (every peer but this node).
    pub fn decide(&self, others: usize) -> Decision {
        if self.ready > 0 {
            Decision::Commit
        } else if self.unreachable == 0 && self.not_ready == others {
            Decision::Abort
        } else {
            Decision::KeepPolling
        }
    }
}

impl ThreePhase {
    pub(crate) fn schedule_auto_commit(&self, id: &str) {
        let engine = self.clone();
        let id_owned = id.to_string();
        self.spawn_task("auto-commit", id, async move {
            engine.auto_commit(&id_owned).await;
        });
    }

    pub(crate) fn schedule_termination_protocol(&self, id: &str) {
        let engine = self.clone();
        let id_owned = id.to_string();
        self.spawn_task("termination", id, async move {
            engine.termination_protocol(&id_owned).await;
        });
    }

    pub(crate) fn schedule_cleanup(&self, id: &str) {
        let engine = self.clone();
        let id_owned = id.to_string();
        self.spawn_task("cleanup", id, async move {
            engine.cleanup(&id_owned).await;
        });
    }

    /// Waits out the auto-commit delay, then commits `id` if it is still prepared.
    ///
    /// A commit the storage refuses is retried every phase timeout for as long
    /// as the transaction stays prepared. Returns whether this call committed
    /// the transaction.
    pub async fn auto_commit(&self, id: &str) -> bool {
        let config = *self.recovery_config();
        sleep(config.auto_commit_delay).await;
        loop {
            if self.status(id) != Some(Phase::Prepared) {
                return false;
            }

            info!(%id, "transaction still prepared, committing without coordinator");
            match self.do_commit(id) {
                Ok(()) => return true,
                Err(err) => {
                    warn!(%id, error = %err, retry_in = ?config.phase_timeout, "auto-commit failed");
                    sleep(config.phase_timeout).await;
                }
            }
        }
    }

    /// Polls the other peers of `id` until the transaction is resolved.
    ///
    /// Returns the phase this task moved the transaction to, or `None` if it
    /// stopped because something else resolved it first or there was nobody to
    /// ask.
    pub async fn termination_protocol(&self, id: &str) -> Option<Phase> {
        let interval = self.recovery_config().termination_interval;
        loop {
            sleep(interval).await;

            if self.status(id) != Some(Phase::Prepared) {
                return None;
            }
            let others: Vec<String> = self
                .peers(id)?
                .into_iter()
                .filter(|peer| peer != self.node_id())
                .collect();
            if others.is_empty() {
                debug!(%id, "no other peers to poll, leaving it to auto-commit");
                return None;
            }

            let tally = self.poll_peers(id, &others).await;
            match tally.decide(others.len()) {
                Decision::Commit => {
                    info!(%id, ready = tally.ready, "a peer is ready, committing");
                    match self.do_commit(id) {
                        Ok(()) => return Some(Phase::Committed),
                        Err(err) => warn!(%id, error = %err, "commit after polling failed, polling again"),
                    }
                }
                Decision::Abort => {
                    info!(%id, "no peer is ready, aborting");
                    return self.abort(id).ok().map(|_| Phase::Aborted);
                }
                Decision::KeepPolling if tally.unreachable > 1 => {
                    warn!(
                        %id,
                        not_ready = tally.not_ready,
                        unreachable = tally.unreachable,
                        "more than one peer unreachable, cannot decide yet"
                    );
                }
                Decision::KeepPolling => {
                    debug!(%id, ?tally, "termination round inconclusive");
                }
            }
        }
    }

    async fn poll_peers(&self, id: &str, peers: &[String]) -> Tally {
        let comm = &self.state.comm;
        let answers = join_all(peers.iter().map(|peer| comm.check_commit(id, peer))).await;

        let mut tally = Tally::default();
        for (peer, answer) in peers.iter().zip(answers) {
            match answer {
                Ok(true) => tally.ready += 1,
                Ok(false) => tally.not_ready += 1,
                Err(err) => {
                    debug!(%id, %peer, error = %err, "termination poll failed");
                    tally.unreachable += 1;
                }
            }
        }
        tally
    }

    /// Drops `id` from the registry once the retention window has passed.
    pub(crate) async fn cleanup(&self, id: &str) {
        sleep(self.recovery_config().retention).await;

        let mut transactions = self.state.registry.write();
        let finished = transactions
            .get(id)
            .is_some_and(|record| record.phase.is_terminal());
        if finished {
            transactions.remove(id);
            debug!(%id, "transaction removed from registry");
        }
    }
}
