//! Transaction coordination for deferred index writes.
//!
//! Mutating operations issued through a transactional client are buffered
//! (see [`WriteBuffer`]) and replayed against the backend only when the
//! surrounding transaction commits. The pieces:
//!
//! - [`Participant`]: the two-phase-commit contract a resource implements.
//!   The coordinator calls at most one `begin`, then `vote`, then exactly
//!   one of `finish`/`abort`.
//! - [`Transaction`] / [`TransactionManager`]: a single-coordinator
//!   implementation of that contract driving all joined participants.
//! - [`SearchParticipant`]: the search-index participant that owns a
//!   client's write buffer.
//!
//! One transaction is open per manager at a time. Sharing a client
//! between two concurrently open transactions (two managers) is
//! unsupported and rejected with
//! [`SearchError::TransactionConflict`](crate::SearchError::TransactionConflict).

mod buffer;
mod participant;

pub use buffer::{PendingOp, WriteBuffer};
pub use participant::{ParticipantRegistry, ParticipantStatus, SearchParticipant};

pub(crate) use participant::join_transaction;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::{debug, error};
use uuid::Uuid;

use crate::errors::SearchError;

/// Lock a mutex, recovering the data from a poisoned lock.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A resource enrolled in a transaction.
///
/// Driven externally by the coordinator: at most one `begin`, then `vote`,
/// then exactly one of `finish` / `abort`. `abort` may arrive at any phase
/// and must leave the participant with no pending work.
#[async_trait]
pub trait Participant: Send + Sync {
    /// Ordering key for multi-participant commits. Participants commit in
    /// ascending key order.
    fn sort_key(&self) -> String;

    /// First commit phase. No work is performed here by buffering
    /// participants.
    async fn begin(&self) -> Result<(), SearchError> {
        Ok(())
    }

    /// Pre-commit validation phase.
    async fn vote(&self) -> Result<(), SearchError> {
        Ok(())
    }

    /// Durable-commit phase: make all buffered work permanent.
    async fn finish(&self) -> Result<(), SearchError>;

    /// Discard all pending work.
    async fn abort(&self);

    /// Snapshot pending work for a later partial rollback.
    fn savepoint(&self) -> Box<dyn Savepoint>;
}

/// A restorable snapshot of one participant's pending work.
pub trait Savepoint: Send + Sync {
    /// Restore the participant's pending work to this snapshot.
    fn rollback(&self);
}

/// Snapshot of every participant in a transaction at one point in time.
pub struct TransactionSavepoint {
    savepoints: Vec<Box<dyn Savepoint>>,
}

impl TransactionSavepoint {
    /// Roll every participant back to this snapshot.
    pub fn rollback(&self) {
        for savepoint in &self.savepoints {
            savepoint.rollback();
        }
    }
}

/// One unit of work.
///
/// Participants join lazily; `commit` drives the two-phase protocol over
/// all of them in `sort_key` order, so database-style participants (whose
/// keys sort low) become durable before search-index writes are attempted.
pub struct Transaction {
    id: Uuid,
    participants: Mutex<Vec<Arc<dyn Participant>>>,
}

impl Transaction {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            participants: Mutex::new(Vec::new()),
        })
    }

    /// Stable identifier of this transaction.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Enroll a participant.
    pub fn join(&self, participant: Arc<dyn Participant>) {
        lock_unpoisoned(&self.participants).push(participant);
    }

    /// Number of enrolled participants.
    pub fn participant_count(&self) -> usize {
        lock_unpoisoned(&self.participants).len()
    }

    /// Take a savepoint across every enrolled participant.
    pub fn savepoint(&self) -> TransactionSavepoint {
        let participants = lock_unpoisoned(&self.participants);
        TransactionSavepoint {
            savepoints: participants.iter().map(|p| p.savepoint()).collect(),
        }
    }

    /// Commit the transaction.
    ///
    /// Runs `begin`, `vote`, and `finish` over all participants in
    /// `sort_key` order. A failure in any phase aborts every participant
    /// and propagates the error; work already made durable by earlier
    /// `finish` calls is not compensated.
    pub async fn commit(&self) -> Result<(), SearchError> {
        let mut participants = lock_unpoisoned(&self.participants).clone();
        participants.sort_by_key(|p| p.sort_key());

        debug!(txn_id = %self.id, participants = participants.len(), "committing transaction");

        for participant in &participants {
            if let Err(e) = participant.begin().await {
                error!(txn_id = %self.id, error = %e, "begin failed, aborting");
                self.abort_all(&participants).await;
                return Err(e);
            }
        }

        for participant in &participants {
            if let Err(e) = participant.vote().await {
                error!(txn_id = %self.id, error = %e, "vote failed, aborting");
                self.abort_all(&participants).await;
                return Err(e);
            }
        }

        for participant in &participants {
            if let Err(e) = participant.finish().await {
                // Earlier participants already committed durably; their
                // work stays. Remaining buffered work is discarded.
                error!(txn_id = %self.id, error = %e, "finish failed, aborting remaining work");
                self.abort_all(&participants).await;
                return Err(e);
            }
        }

        Ok(())
    }

    /// Abort the transaction, discarding all pending work. No backend
    /// calls occur.
    pub async fn abort(&self) {
        let participants = lock_unpoisoned(&self.participants).clone();
        debug!(txn_id = %self.id, participants = participants.len(), "aborting transaction");
        self.abort_all(&participants).await;
    }

    async fn abort_all(&self, participants: &[Arc<dyn Participant>]) {
        for participant in participants {
            participant.abort().await;
        }
    }
}

/// Hands out the current transaction and drives its lifecycle.
///
/// The manager owns the [`ParticipantRegistry`] tracking which clients
/// already have a live participant in the open transaction.
pub struct TransactionManager {
    current: Mutex<Option<Arc<Transaction>>>,
    participants: ParticipantRegistry,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self {
            current: Mutex::new(None),
            participants: ParticipantRegistry::new(),
        }
    }
}

impl TransactionManager {
    /// Create a manager with no open transaction.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The current transaction, opening one if none is active.
    pub fn current(&self) -> Arc<Transaction> {
        let mut current = lock_unpoisoned(&self.current);
        current.get_or_insert_with(Transaction::new).clone()
    }

    /// The current transaction, if one is open.
    pub fn active(&self) -> Option<Arc<Transaction>> {
        lock_unpoisoned(&self.current).clone()
    }

    /// Open a fresh transaction, replacing any open one. Pending work in a
    /// replaced transaction is simply dropped; finish or abort it first.
    pub fn begin(&self) -> Arc<Transaction> {
        let txn = Transaction::new();
        *lock_unpoisoned(&self.current) = Some(txn.clone());
        txn
    }

    /// Commit the current transaction, if any, and close it.
    pub async fn commit(&self) -> Result<(), SearchError> {
        let txn = lock_unpoisoned(&self.current).take();
        match txn {
            Some(txn) => txn.commit().await,
            None => Ok(()),
        }
    }

    /// Abort the current transaction, if any, and close it.
    pub async fn abort(&self) {
        let txn = lock_unpoisoned(&self.current).take();
        if let Some(txn) = txn {
            txn.abort().await;
        }
    }

    /// The per-client participant state map.
    pub fn registry(&self) -> &ParticipantRegistry {
        &self.participants
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every lifecycle call into a shared event log.
    struct RecordingParticipant {
        name: &'static str,
        key: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail_on_vote: bool,
        fail_on_finish: bool,
    }

    impl RecordingParticipant {
        fn new(name: &'static str, key: &'static str, log: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                key,
                log,
                fail_on_vote: false,
                fail_on_finish: false,
            }
        }

        fn record(&self, phase: &str) {
            lock_unpoisoned(&self.log).push(format!("{}:{}", self.name, phase));
        }
    }

    struct NoopSavepoint;

    impl Savepoint for NoopSavepoint {
        fn rollback(&self) {}
    }

    #[async_trait]
    impl Participant for RecordingParticipant {
        fn sort_key(&self) -> String {
            self.key.to_string()
        }

        async fn begin(&self) -> Result<(), SearchError> {
            self.record("begin");
            Ok(())
        }

        async fn vote(&self) -> Result<(), SearchError> {
            self.record("vote");
            if self.fail_on_vote {
                return Err(SearchError::query("vote rejected"));
            }
            Ok(())
        }

        async fn finish(&self) -> Result<(), SearchError> {
            self.record("finish");
            if self.fail_on_finish {
                return Err(SearchError::connection("backend down"));
            }
            Ok(())
        }

        async fn abort(&self) {
            self.record("abort");
        }

        fn savepoint(&self) -> Box<dyn Savepoint> {
            self.record("savepoint");
            Box::new(NoopSavepoint)
        }
    }

    fn log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn events(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        lock_unpoisoned(log).clone()
    }

    #[tokio::test]
    async fn test_commit_phases_run_in_sort_key_order() {
        let manager = TransactionManager::new();
        let log = log();
        let txn = manager.current();

        // Joined out of order; the search-style key sorts last.
        txn.join(Arc::new(RecordingParticipant::new(
            "search",
            "~~search-1",
            log.clone(),
        )));
        txn.join(Arc::new(RecordingParticipant::new(
            "db",
            "database-1",
            log.clone(),
        )));

        manager.commit().await.unwrap();

        assert_eq!(
            events(&log),
            vec![
                "db:begin",
                "search:begin",
                "db:vote",
                "search:vote",
                "db:finish",
                "search:finish",
            ]
        );
        assert!(manager.active().is_none());
    }

    #[tokio::test]
    async fn test_vote_failure_aborts_all_participants() {
        let manager = TransactionManager::new();
        let log = log();
        let txn = manager.current();

        let mut bad = RecordingParticipant::new("bad", "a", log.clone());
        bad.fail_on_vote = true;
        txn.join(Arc::new(bad));
        txn.join(Arc::new(RecordingParticipant::new("ok", "b", log.clone())));

        let err = manager.commit().await.unwrap_err();
        assert!(matches!(err, SearchError::QueryError(_)));

        let events = events(&log);
        assert!(events.contains(&"bad:abort".to_string()));
        assert!(events.contains(&"ok:abort".to_string()));
        // Nothing was made durable.
        assert!(!events.iter().any(|e| e.ends_with(":finish")));
    }

    #[tokio::test]
    async fn test_finish_failure_after_database_participant_committed() {
        // The vote phase performs no validation, so a dead search backend
        // surfaces only during finish, after lower-sorted participants
        // have already committed durably. This is the accepted
        // inconsistency window.
        let manager = TransactionManager::new();
        let log = log();
        let txn = manager.current();

        let mut search = RecordingParticipant::new("search", "~~search-1", log.clone());
        search.fail_on_finish = true;
        txn.join(Arc::new(search));
        txn.join(Arc::new(RecordingParticipant::new(
            "db",
            "database-1",
            log.clone(),
        )));

        let err = manager.commit().await.unwrap_err();
        assert!(matches!(err, SearchError::ConnectionError(_)));

        let events = events(&log);
        let db_finish = events.iter().position(|e| e == "db:finish").unwrap();
        let search_finish = events.iter().position(|e| e == "search:finish").unwrap();
        assert!(db_finish < search_finish);
    }

    #[tokio::test]
    async fn test_manager_reuses_current_until_closed() {
        let manager = TransactionManager::new();

        let first = manager.current();
        assert_eq!(first.id(), manager.current().id());

        manager.commit().await.unwrap();
        let second = manager.current();
        assert_ne!(first.id(), second.id());

        manager.abort().await;
        assert!(manager.active().is_none());
    }

    #[tokio::test]
    async fn test_transaction_savepoint_covers_all_participants() {
        let manager = TransactionManager::new();
        let log = log();
        let txn = manager.current();

        txn.join(Arc::new(RecordingParticipant::new("a", "a", log.clone())));
        txn.join(Arc::new(RecordingParticipant::new("b", "b", log.clone())));

        let savepoint = txn.savepoint();
        savepoint.rollback();

        let events = events(&log);
        assert_eq!(events.iter().filter(|e| e.ends_with(":savepoint")).count(), 2);
    }
}
