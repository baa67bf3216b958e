//! The capability interface for indexable domain objects.

use std::any::Any;

use serde_json::Value;

/// A domain object that can be rendered as a search document.
///
/// Implementing this trait is the direct route into the index: the object
/// itself supplies its mapping, type tag, id, and body. A registered
/// [`DocumentAdapter`](crate::adapter::DocumentAdapter) can override any
/// part of that rendering without the domain type changing.
pub trait Indexable: Any + Send + Sync {
    /// Field mapping (`properties`) for this object's document type.
    fn mapping(&self) -> Value;

    /// Document type tag.
    fn document_type(&self) -> &str;

    /// Document identifier within its type.
    fn document_id(&self) -> String;

    /// Document body.
    fn document(&self) -> Value;

    /// Optional parent/routing key colocating this document with its
    /// parent.
    fn parent_id(&self) -> Option<String> {
        None
    }
}
