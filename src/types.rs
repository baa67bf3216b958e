//! Request and document types for search index operations.

use serde::Serialize;
use serde_json::Value;

/// A search-engine document produced by adapting a domain object.
///
/// `body` is the field map sent to the backend; `parent` is the optional
/// routing key colocating the document with its parent for join-style
/// queries.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    /// Document type tag.
    pub doc_type: String,
    /// Document identifier within its type.
    pub id: String,
    /// Document field map.
    pub body: Value,
    /// Optional parent/routing key.
    pub parent: Option<String>,
}

/// Request to index a raw document.
///
/// Buffered by default when the client is transactional; `immediate()`
/// forces a synchronous backend call regardless of transaction state.
#[derive(Debug, Clone)]
pub struct IndexRequest {
    /// Document identifier.
    pub id: String,
    /// Document type tag.
    pub doc_type: String,
    /// Document field map.
    pub body: Value,
    /// Optional parent/routing key.
    pub parent: Option<String>,
    /// Bypass transactional buffering.
    pub immediate: bool,
}

impl IndexRequest {
    /// Create an index request for the given document.
    pub fn new(doc_type: impl Into<String>, id: impl Into<String>, body: Value) -> Self {
        Self {
            id: id.into(),
            doc_type: doc_type.into(),
            body,
            parent: None,
            immediate: false,
        }
    }

    /// Set the parent/routing key.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Set the parent/routing key from an optional value.
    pub fn with_parent_opt(mut self, parent: Option<String>) -> Self {
        self.parent = parent;
        self
    }

    /// Execute synchronously against the backend, bypassing the buffer.
    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }
}

/// Request to delete a document.
///
/// `safe()` recovers a not-found condition into a silent success; the
/// default surfaces it to the caller.
#[derive(Debug, Clone)]
pub struct DeleteRequest {
    /// Document identifier.
    pub id: String,
    /// Document type tag.
    pub doc_type: String,
    /// Optional routing key (the parent key of the indexed document).
    pub routing: Option<String>,
    /// Treat a missing document as success.
    pub safe: bool,
    /// Bypass transactional buffering.
    pub immediate: bool,
}

impl DeleteRequest {
    /// Create a delete request for the given document.
    pub fn new(doc_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            doc_type: doc_type.into(),
            routing: None,
            safe: false,
            immediate: false,
        }
    }

    /// Set the routing key.
    pub fn with_routing(mut self, routing: impl Into<String>) -> Self {
        self.routing = Some(routing.into());
        self
    }

    /// Set the routing key from an optional value.
    pub fn with_routing_opt(mut self, routing: Option<String>) -> Self {
        self.routing = routing;
        self
    }

    /// Succeed silently if the document does not exist.
    pub fn safe(mut self) -> Self {
        self.safe = true;
        self
    }

    /// Execute synchronously against the backend, bypassing the buffer.
    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }
}

/// Additional parameters for a search request.
#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    /// Restrict returned source fields.
    pub fields: Option<Vec<String>>,
    /// Offset of the first hit to return.
    pub from: Option<u64>,
    /// Maximum number of hits to return.
    pub size: Option<u64>,
    /// Routing key for the request.
    pub routing: Option<String>,
}

impl SearchParams {
    /// Restrict returned source fields.
    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = Some(fields);
        self
    }

    /// Set result pagination.
    pub fn with_page(mut self, from: u64, size: u64) -> Self {
        self.from = Some(from);
        self.size = Some(size);
        self
    }

    /// Set the routing key.
    pub fn with_routing(mut self, routing: impl Into<String>) -> Self {
        self.routing = Some(routing.into());
        self
    }
}
