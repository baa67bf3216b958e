//! Search backend trait definition.
//!
//! This module defines the abstract interface for the search backend,
//! allowing for different implementations (OpenSearch, in-memory, etc.).

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::SearchError;
use crate::types::SearchParams;

/// Abstracts the underlying search backend (OpenSearch, in-memory, etc.).
///
/// This is the only surface the client core consumes from the engine.
/// Implementations are injected into [`SearchClient`](crate::SearchClient)
/// so tests can substitute an in-process backend.
///
/// All implementations must be `Send + Sync` to allow use across async
/// tasks, and all methods return `Result<T, SearchError>`.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Check whether the index exists.
    async fn index_exists(&self, index: &str) -> Result<bool, SearchError>;

    /// Create the index with the given settings document.
    async fn create_index(&self, index: &str, settings: &Value) -> Result<(), SearchError>;

    /// Delete the index.
    async fn delete_index(&self, index: &str) -> Result<(), SearchError>;

    /// Put the mapping for one document type.
    ///
    /// `body` is the composed mapping document for that type (a
    /// `properties` map, optionally carrying a `_parent` link).
    async fn put_mapping(
        &self,
        index: &str,
        doc_type: &str,
        body: &Value,
    ) -> Result<(), SearchError>;

    /// Delete the mapping for one document type.
    ///
    /// Returns [`SearchError::NotFound`] if no such type is known to the
    /// index.
    async fn delete_mapping(&self, index: &str, doc_type: &str) -> Result<(), SearchError>;

    /// Get the mappings currently used by the index, optionally narrowed
    /// to one document type.
    async fn get_mapping(
        &self,
        index: &str,
        doc_type: Option<&str>,
    ) -> Result<Value, SearchError>;

    /// Flush the index to durable storage.
    async fn flush(&self, index: &str, force: bool) -> Result<(), SearchError>;

    /// Refresh the index so recent writes become searchable.
    async fn refresh(&self, index: &str) -> Result<(), SearchError>;

    /// Add or replace one document.
    async fn index(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        body: &Value,
        parent: Option<&str>,
    ) -> Result<(), SearchError>;

    /// Delete one document.
    ///
    /// Returns [`SearchError::NotFound`] if the document does not exist;
    /// the caller decides whether that condition is recoverable.
    async fn delete(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        routing: Option<&str>,
    ) -> Result<(), SearchError>;

    /// Retrieve one document.
    ///
    /// Returns the raw get response (`_id`, `_type`, `_source`, ...), or
    /// [`SearchError::NotFound`] if the document does not exist.
    async fn get(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        routing: Option<&str>,
    ) -> Result<Value, SearchError>;

    /// Execute a search request.
    ///
    /// `doc_types` narrows the search to the given document types; an
    /// empty slice searches all types. Returns the raw search response.
    async fn search(
        &self,
        index: &str,
        doc_types: &[String],
        body: &Value,
        params: &SearchParams,
    ) -> Result<Value, SearchError>;

    /// Check if the search backend is healthy and reachable.
    async fn health_check(&self) -> Result<bool, SearchError>;
}
