//! # search-tx
//!
//! A transaction-aware search index client. Domain objects are adapted
//! into search documents, and index/delete operations issued inside a
//! unit of work are buffered and replayed against the backend only when
//! that unit of work commits; an abort discards them without a single
//! backend call.
//!
//! ## Architecture
//!
//! - **Adapters** ([`adapter`]): render domain objects into documents,
//!   with per-type overrides resolved through an explicit registry.
//! - **Transactions** ([`txn`]): a two-phase-commit participant owning
//!   each client's write buffer, driven by a transaction manager.
//! - **Client** ([`client`]): the façade dispatching each mutating call
//!   to the buffer or straight to the backend.
//! - **Backends** ([`opensearch`], [`memory`]): implementations of the
//!   [`SearchBackend`] connector contract.
//! - **Queries** ([`query`]): structured query construction and typed
//!   result access.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use search_tx::{ClientConfig, MemoryBackend, SearchClient, TransactionManager};
//! use search_tx::IndexRequest;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), search_tx::SearchError> {
//! let manager = TransactionManager::new();
//! let client = SearchClient::builder(Arc::new(MemoryBackend::new()), ClientConfig::new("docs"))
//!     .transaction_manager(manager.clone())
//!     .build();
//!
//! // Buffered: nothing reaches the backend yet.
//! client
//!     .index_document(IndexRequest::new("Todo", "1", json!({"description": "ship it"})))
//!     .await?;
//!
//! // Replayed in order at commit time.
//! manager.commit().await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod client;
pub mod config;
pub mod errors;
pub mod interfaces;
pub mod memory;
pub mod opensearch;
pub mod query;
pub mod txn;
pub mod types;

pub use adapter::{AdapterRegistry, DefaultAdapter, DocumentAdapter, Indexable, TypeMapping};
pub use client::{SearchClient, SearchClientBuilder};
pub use config::ClientConfig;
pub use errors::SearchError;
pub use interfaces::SearchBackend;
pub use memory::MemoryBackend;
pub use opensearch::OpenSearchBackend;
pub use query::{QueryBuilder, ResultRecord, SearchResults};
pub use txn::{
    Participant, ParticipantRegistry, ParticipantStatus, PendingOp, Savepoint, Transaction,
    TransactionManager, TransactionSavepoint,
};
pub use types::{DeleteRequest, Document, IndexRequest, SearchParams};
