//! The search-index transaction participant and its state registry.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::client::ClientCore;
use crate::errors::SearchError;
use crate::txn::{lock_unpoisoned, Participant, PendingOp, Savepoint};

/// Diagnostic state of a client's participant within the open transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantStatus {
    /// A participant was created for the client in this transaction.
    Active,
    /// Further operations were enqueued after the participant was created.
    Changed,
}

struct ParticipantEntry {
    status: ParticipantStatus,
    txn_id: Uuid,
}

/// Tracks which clients have a live participant in the open transaction.
///
/// Owned by the [`TransactionManager`](crate::txn::TransactionManager) and
/// keyed by client id. An entry is created when the first operation for a
/// client is buffered in a fresh transaction and removed when that
/// transaction finishes or aborts, so at most one participant exists per
/// client per open transaction.
pub struct ParticipantRegistry {
    entries: DashMap<Uuid, ParticipantEntry>,
}

impl Default for ParticipantRegistry {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl ParticipantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The status of a client's participant, if one is live.
    pub fn status(&self, client_id: Uuid) -> Option<ParticipantStatus> {
        self.entries.get(&client_id).map(|e| e.status)
    }

    /// True if the client has a live participant.
    pub fn is_enrolled(&self, client_id: Uuid) -> bool {
        self.entries.contains_key(&client_id)
    }

    fn remove(&self, client_id: Uuid) {
        self.entries.remove(&client_id);
    }
}

/// Enroll a client in its manager's current transaction, or mark the
/// existing enrollment as changed.
///
/// Exactly one participant is created per client per transaction no matter
/// how many operations are enqueued. An enrollment left over from a
/// *different* open transaction is a precondition violation and is
/// rejected.
pub(crate) fn join_transaction(core: &Arc<ClientCore>) -> Result<(), SearchError> {
    let txn = core.manager.current();
    let registry = core.manager.registry();

    match registry.entries.entry(core.id) {
        Entry::Occupied(mut entry) => {
            if entry.get().txn_id != txn.id() {
                return Err(SearchError::TransactionConflict(format!(
                    "client {} is already enrolled in transaction {}",
                    core.id,
                    entry.get().txn_id
                )));
            }
            entry.get_mut().status = ParticipantStatus::Changed;
        }
        Entry::Vacant(entry) => {
            let participant = Arc::new(SearchParticipant::new(core.clone()));
            txn.join(participant);
            entry.insert(ParticipantEntry {
                status: ParticipantStatus::Active,
                txn_id: txn.id(),
            });
            debug!(client_id = %core.id, txn_id = %txn.id(), "joined transaction");
        }
    }

    Ok(())
}

/// The search-index side of a two-phase commit.
///
/// Owns one client's write buffer for the duration of a transaction:
/// replays it against the backend in insertion order on `finish`, discards
/// it on `abort`. `begin` and `vote` do nothing: buffering already
/// happened at enqueue time, and no pre-commit validation is performed, so
/// a dead backend surfaces only during `finish`, after lower-sorted
/// participants have committed.
pub struct SearchParticipant {
    core: Arc<ClientCore>,
}

impl SearchParticipant {
    pub(crate) fn new(core: Arc<ClientCore>) -> Self {
        Self { core }
    }
}

#[async_trait]
impl Participant for SearchParticipant {
    /// Sorts after database-style participants so domain writes are
    /// durable before index writes are attempted.
    fn sort_key(&self) -> String {
        format!("~~search-{}", self.core.id)
    }

    async fn finish(&self) -> Result<(), SearchError> {
        let pending = lock_unpoisoned(&self.core.buffer).len();
        debug!(client_id = %self.core.id, pending, "replaying buffered operations");

        loop {
            let op = {
                let mut buffer = lock_unpoisoned(&self.core.buffer);
                buffer.pop_front()
            };
            let Some(op) = op else { break };
            // A failure propagates to the coordinator with the buffer
            // partially drained; operations after the failing one are not
            // replayed.
            self.core.apply(op).await?;
        }

        self.core.manager.registry().remove(self.core.id);
        Ok(())
    }

    async fn abort(&self) {
        let discarded = {
            let mut buffer = lock_unpoisoned(&self.core.buffer);
            let n = buffer.len();
            buffer.clear();
            n
        };
        self.core.manager.registry().remove(self.core.id);
        debug!(client_id = %self.core.id, discarded, "aborted, buffer discarded");
    }

    fn savepoint(&self) -> Box<dyn Savepoint> {
        Box::new(SearchSavepoint {
            core: self.core.clone(),
            saved: lock_unpoisoned(&self.core.buffer).snapshot(),
        })
    }
}

/// A copy of the write buffer at savepoint time.
struct SearchSavepoint {
    core: Arc<ClientCore>,
    saved: Vec<PendingOp>,
}

impl Savepoint for SearchSavepoint {
    fn rollback(&self) {
        lock_unpoisoned(&self.core.buffer).restore(self.saved.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SearchClient;
    use crate::config::ClientConfig;
    use crate::memory::MemoryBackend;
    use crate::txn::TransactionManager;
    use crate::types::{DeleteRequest, IndexRequest};
    use serde_json::json;

    fn transactional_client() -> (SearchClient, Arc<MemoryBackend>, Arc<TransactionManager>) {
        let backend = Arc::new(MemoryBackend::new());
        let manager = TransactionManager::new();
        let client = SearchClient::builder(backend.clone(), ClientConfig::new("todos"))
            .transaction_manager(manager.clone())
            .build();
        (client, backend, manager)
    }

    fn index_request(id: &str) -> IndexRequest {
        IndexRequest::new("Todo", id, json!({"description": format!("task {id}")}))
    }

    #[tokio::test]
    async fn test_single_participant_for_many_enqueues() {
        let (client, _backend, manager) = transactional_client();

        for i in 0..5 {
            client.index_document(index_request(&i.to_string())).await.unwrap();
        }

        let txn = manager.current();
        assert_eq!(txn.participant_count(), 1);
        assert_eq!(
            manager.registry().status(client.id()),
            Some(ParticipantStatus::Changed)
        );
        assert_eq!(client.pending_operations(), 5);
    }

    #[tokio::test]
    async fn test_first_enqueue_marks_active() {
        let (client, _backend, manager) = transactional_client();

        client.index_document(index_request("1")).await.unwrap();

        assert_eq!(
            manager.registry().status(client.id()),
            Some(ParticipantStatus::Active)
        );
    }

    #[tokio::test]
    async fn test_finish_replays_in_order_and_clears_state() {
        let (client, backend, manager) = transactional_client();

        client.index_document(index_request("1")).await.unwrap();
        client
            .delete_document(DeleteRequest::new("Todo", "1").safe())
            .await
            .unwrap();
        client.index_document(index_request("2")).await.unwrap();

        assert_eq!(backend.write_calls(), 0);

        manager.commit().await.unwrap();

        assert_eq!(
            backend.journal(),
            vec!["index:Todo:1", "delete:Todo:1", "index:Todo:2"]
        );
        assert_eq!(client.pending_operations(), 0);
        assert!(!manager.registry().is_enrolled(client.id()));
    }

    #[tokio::test]
    async fn test_abort_discards_without_backend_calls() {
        let (client, backend, manager) = transactional_client();

        client.index_document(index_request("1")).await.unwrap();
        client.index_document(index_request("2")).await.unwrap();

        manager.abort().await;

        assert_eq!(backend.write_calls(), 0);
        assert_eq!(client.pending_operations(), 0);
        assert!(!manager.registry().is_enrolled(client.id()));
    }

    #[tokio::test]
    async fn test_partial_replay_stops_at_first_failure() {
        let (client, backend, manager) = transactional_client();

        client.index_document(index_request("1")).await.unwrap();
        client.index_document(index_request("2")).await.unwrap();
        client.index_document(index_request("3")).await.unwrap();

        backend.fail_writes_for_id("2");

        // Drive the participant directly to observe the partially drained
        // buffer before the coordinator's abort cleans it up.
        let participant = SearchParticipant::new(client.core().clone());
        let err = participant.finish().await.unwrap_err();
        assert!(matches!(err, SearchError::IndexError(_)));

        // "1" replayed, "2" failed, "3" never attempted.
        assert_eq!(backend.journal(), vec!["index:Todo:1", "index:Todo:2"]);
        assert!(backend.stored("Todo", "1").is_some());
        assert!(backend.stored("Todo", "3").is_none());
        assert_eq!(client.pending_operations(), 1);
        assert!(manager.registry().is_enrolled(client.id()));

        participant.abort().await;
        assert_eq!(client.pending_operations(), 0);
        assert!(!manager.registry().is_enrolled(client.id()));
    }

    #[tokio::test]
    async fn test_savepoint_rollback_discards_later_ops() {
        let (client, backend, manager) = transactional_client();

        client.index_document(index_request("1")).await.unwrap();
        client.index_document(index_request("2")).await.unwrap();

        let savepoint = manager.current().savepoint();

        client.index_document(index_request("3")).await.unwrap();
        client.index_document(index_request("4")).await.unwrap();
        assert_eq!(client.pending_operations(), 4);

        savepoint.rollback();
        assert_eq!(client.pending_operations(), 2);

        manager.commit().await.unwrap();
        assert_eq!(backend.journal(), vec!["index:Todo:1", "index:Todo:2"]);
    }

    #[tokio::test]
    async fn test_enqueue_from_second_open_transaction_rejected() {
        let (client, _backend, manager) = transactional_client();

        client.index_document(index_request("1")).await.unwrap();

        // A fresh transaction opened while the first is still pending.
        manager.begin();

        let err = client.index_document(index_request("2")).await.unwrap_err();
        assert!(matches!(err, SearchError::TransactionConflict(_)));
    }

    #[tokio::test]
    async fn test_two_clients_share_one_transaction() {
        let backend = Arc::new(MemoryBackend::new());
        let manager = TransactionManager::new();
        let a = SearchClient::builder(backend.clone(), ClientConfig::new("todos"))
            .transaction_manager(manager.clone())
            .build();
        let b = SearchClient::builder(backend.clone(), ClientConfig::new("todos"))
            .transaction_manager(manager.clone())
            .build();

        a.index_document(index_request("1")).await.unwrap();
        b.index_document(index_request("2")).await.unwrap();

        assert_eq!(manager.current().participant_count(), 2);

        manager.commit().await.unwrap();
        assert_eq!(backend.write_calls(), 2);
        assert!(!manager.registry().is_enrolled(a.id()));
        assert!(!manager.registry().is_enrolled(b.id()));
    }

    #[test]
    fn test_sort_key_sorts_after_database_keys() {
        let backend = Arc::new(MemoryBackend::new());
        let client = SearchClient::new(backend, ClientConfig::new("todos"));
        let participant = SearchParticipant::new(client.core().clone());

        assert!(participant.sort_key() > "sqlalchemy-connection".to_string());
        assert!(participant.sort_key().starts_with("~~search-"));
    }
}
