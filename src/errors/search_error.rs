//! Search error types.
//!
//! This module defines the error types that can occur during search client
//! and backend operations.

use thiserror::Error;

/// Errors that can occur during search client operations.
#[derive(Error, Debug, Clone)]
pub enum SearchError {
    /// Failed to establish a connection to the search backend.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Invalid or incomplete client configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Search query execution failed.
    #[error("Query error: {0}")]
    QueryError(String),

    /// Failed to index a document.
    #[error("Index error: {0}")]
    IndexError(String),

    /// Failed to delete a document.
    #[error("Delete error: {0}")]
    DeleteError(String),

    /// Document or index not found. Recoverable on delete via the `safe`
    /// flag; surfaced unchanged otherwise.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Failed to create or update the search index.
    #[error("Index creation error: {0}")]
    IndexCreationError(String),

    /// A mapping operation referenced a document type that was never
    /// registered with the adapter registry.
    #[error("No mapping registered for document type '{0}'")]
    MappingNotRegistered(String),

    /// A client already enrolled in one open transaction was used from
    /// another. Sharing a client across concurrent transactions is
    /// unsupported; the later enqueue is rejected.
    #[error("Transaction conflict: {0}")]
    TransactionConflict(String),

    /// Failed to serialize data for the search backend.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Failed to parse a response from the search backend.
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl SearchError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a query error.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::QueryError(msg.into())
    }

    /// Create an index error.
    pub fn index(msg: impl Into<String>) -> Self {
        Self::IndexError(msg.into())
    }

    /// Create a delete error.
    pub fn delete(msg: impl Into<String>) -> Self {
        Self::DeleteError(msg.into())
    }

    /// Create a not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// True if this error is the distinguishable not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
