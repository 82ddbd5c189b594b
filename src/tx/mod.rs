//! Transaction management.
//!
//! The store owns the transaction; the mapping layer only needs a guard
//! that marks the outcome and finishes it exactly once.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::storage::GraphStore;
use crate::Result;

/// Transaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxMode {
    ReadOnly,
    ReadWrite,
}

/// Opaque transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub u64);

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Undecided,
    Success,
    Failure,
}

/// Transaction guard with the store's begin / success / failure / finish
/// protocol.
///
/// Dropping an unfinished guard finishes it: committed when marked
/// [`success`](Transaction::success), rolled back otherwise.
pub struct Transaction {
    store: Arc<dyn GraphStore>,
    id: TxId,
    mode: TxMode,
    outcome: Outcome,
    finished: bool,
}

impl Transaction {
    pub(crate) fn begin(store: Arc<dyn GraphStore>, mode: TxMode) -> Result<Self> {
        let id = store.begin_tx(mode)?;
        debug!(tx = %id, ?mode, "transaction started");
        Ok(Self { store, id, mode, outcome: Outcome::Undecided, finished: false })
    }

    pub fn id(&self) -> TxId { self.id }

    pub fn mode(&self) -> TxMode { self.mode }

    /// Mark the transaction to be committed on finish.
    pub fn success(&mut self) {
        if self.outcome != Outcome::Failure {
            self.outcome = Outcome::Success;
        }
    }

    /// Mark the transaction to be rolled back on finish. Wins over `success`.
    pub fn failure(&mut self) {
        self.outcome = Outcome::Failure;
    }

    /// Commit or roll back according to the recorded outcome.
    pub fn finish(mut self) -> Result<()> {
        self.finish_inner()
    }

    /// Shorthand for `success()` + `finish()`.
    pub fn commit(mut self) -> Result<()> {
        self.success();
        self.finish_inner()
    }

    /// Shorthand for `failure()` + `finish()`.
    pub fn rollback(mut self) -> Result<()> {
        self.failure();
        self.finish_inner()
    }

    fn finish_inner(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        match self.outcome {
            Outcome::Success => {
                debug!(tx = %self.id, "transaction commit");
                self.store.commit_tx(self.id)
            }
            Outcome::Undecided | Outcome::Failure => {
                debug!(tx = %self.id, "transaction rollback");
                self.store.rollback_tx(self.id)
            }
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if let Err(e) = self.finish_inner() {
            tracing::warn!(tx = %self.id, error = %e, "failed to finish transaction on drop");
        }
    }
}
