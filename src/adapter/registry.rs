//! Adapter registry and the override adapter interface.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::adapter::Indexable;
use crate::errors::SearchError;
use crate::types::Document;

/// Overrides parts of a domain object's document rendering.
///
/// Every method receives the object and defaults to forwarding to the
/// object's own [`Indexable`] implementation, so an adapter only overrides
/// the aspects it cares about. Adapters are shared (`Arc`) and must be
/// stateless with respect to individual objects.
pub trait DocumentAdapter: Send + Sync {
    /// Field mapping for the object's document type.
    fn mapping(&self, obj: &dyn Indexable) -> Value {
        obj.mapping()
    }

    /// Document type tag.
    fn document_type(&self, obj: &dyn Indexable) -> String {
        obj.document_type().to_string()
    }

    /// Document identifier.
    fn document_id(&self, obj: &dyn Indexable) -> String {
        obj.document_id()
    }

    /// Document body.
    fn document(&self, obj: &dyn Indexable) -> Value {
        obj.document()
    }

    /// Optional parent/routing key.
    fn parent_id(&self, obj: &dyn Indexable) -> Option<String> {
        obj.parent_id()
    }
}

/// The fallback adapter: forwards everything to the object itself.
#[derive(Debug, Default)]
pub struct DefaultAdapter;

impl DocumentAdapter for DefaultAdapter {}

/// Mapping registration for one document type.
#[derive(Debug, Clone)]
pub struct TypeMapping {
    /// Field mapping (`properties`) for the type.
    pub properties: Value,
    /// Parent document type for join-style relationships.
    pub parent_type: Option<String>,
}

impl TypeMapping {
    /// Create a mapping registration from a `properties` map.
    pub fn new(properties: Value) -> Self {
        Self {
            properties,
            parent_type: None,
        }
    }

    /// Declare the parent document type.
    pub fn with_parent(mut self, parent_type: impl Into<String>) -> Self {
        self.parent_type = Some(parent_type.into());
        self
    }
}

/// Registry of document adapters and type mappings.
///
/// Adapters are keyed by the concrete domain type; [`resolve`] falls back
/// to [`DefaultAdapter`] when no specific adapter is registered, so types
/// that implement [`Indexable`] directly work without registration. The
/// mapping table drives the client's mapping-management operations and is
/// iterated in registration order.
///
/// [`resolve`]: AdapterRegistry::resolve
pub struct AdapterRegistry {
    adapters: HashMap<TypeId, Arc<dyn DocumentAdapter>>,
    mappings: Vec<(String, TypeMapping)>,
    fallback: Arc<dyn DocumentAdapter>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self {
            adapters: HashMap::new(),
            mappings: Vec::new(),
            fallback: Arc::new(DefaultAdapter),
        }
    }
}

impl AdapterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter for the concrete type `T`.
    ///
    /// A later registration for the same type replaces the earlier one.
    pub fn register_adapter<T: Indexable>(&mut self, adapter: Arc<dyn DocumentAdapter>) {
        self.adapters.insert(TypeId::of::<T>(), adapter);
    }

    /// Register the mapping for a document type.
    ///
    /// A later registration for the same type replaces the earlier one in
    /// place, preserving its position in the iteration order.
    pub fn register_mapping(&mut self, doc_type: impl Into<String>, mapping: TypeMapping) {
        let doc_type = doc_type.into();
        if let Some(entry) = self.mappings.iter_mut().find(|(t, _)| *t == doc_type) {
            entry.1 = mapping;
        } else {
            self.mappings.push((doc_type, mapping));
        }
    }

    /// Resolve the adapter for an object.
    ///
    /// Pure lookup: the adapter registered for the object's concrete type,
    /// or the fallback [`DefaultAdapter`].
    pub fn resolve<'a>(&'a self, obj: &dyn Indexable) -> &'a dyn DocumentAdapter {
        let type_id = obj.type_id();
        self.adapters
            .get(&type_id)
            .map(Arc::as_ref)
            .unwrap_or(self.fallback.as_ref())
    }

    /// Render an object into a [`Document`] through its resolved adapter.
    pub fn adapt(&self, obj: &dyn Indexable) -> Document {
        let adapter = self.resolve(obj);
        Document {
            doc_type: adapter.document_type(obj),
            id: adapter.document_id(obj),
            body: adapter.document(obj),
            parent: adapter.parent_id(obj),
        }
    }

    /// The registered mapping for a document type.
    pub fn mapping(&self, doc_type: &str) -> Result<&TypeMapping, SearchError> {
        self.mappings
            .iter()
            .find(|(t, _)| t == doc_type)
            .map(|(_, m)| m)
            .ok_or_else(|| SearchError::MappingNotRegistered(doc_type.to_string()))
    }

    /// All registered document types, in registration order.
    pub fn document_types(&self) -> impl Iterator<Item = &str> {
        self.mappings.iter().map(|(t, _)| t.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Todo {
        id: u64,
        description: String,
    }

    impl Indexable for Todo {
        fn mapping(&self) -> Value {
            json!({"description": {"type": "text", "analyzer": "content"}})
        }

        fn document_type(&self) -> &str {
            "Todo"
        }

        fn document_id(&self) -> String {
            self.id.to_string()
        }

        fn document(&self) -> Value {
            json!({"description": self.description})
        }
    }

    struct ShoutingAdapter;

    impl DocumentAdapter for ShoutingAdapter {
        fn document(&self, obj: &dyn Indexable) -> Value {
            let mut body = obj.document();
            if let Some(description) = body.get("description").and_then(Value::as_str) {
                let overridden = format!("Yeah! {description}");
                body["description"] = json!(overridden);
            }
            body
        }
    }

    fn todo() -> Todo {
        Todo {
            id: 42,
            description: "Finish the report".to_string(),
        }
    }

    #[test]
    fn test_default_resolution_uses_object_capabilities() {
        let registry = AdapterRegistry::new();
        let doc = registry.adapt(&todo());

        assert_eq!(doc.doc_type, "Todo");
        assert_eq!(doc.id, "42");
        assert_eq!(doc.body["description"], "Finish the report");
        assert!(doc.parent.is_none());
    }

    #[test]
    fn test_registered_adapter_overrides_document_body() {
        let mut registry = AdapterRegistry::new();
        registry.register_adapter::<Todo>(Arc::new(ShoutingAdapter));

        let doc = registry.adapt(&todo());

        // Only the overridden aspect changes; the rest forwards.
        assert_eq!(doc.doc_type, "Todo");
        assert_eq!(doc.id, "42");
        assert_eq!(doc.body["description"], "Yeah! Finish the report");
    }

    #[test]
    fn test_resolution_is_per_concrete_type() {
        struct Note;
        impl Indexable for Note {
            fn mapping(&self) -> Value {
                json!({})
            }
            fn document_type(&self) -> &str {
                "Note"
            }
            fn document_id(&self) -> String {
                "1".to_string()
            }
            fn document(&self) -> Value {
                json!({"description": "plain"})
            }
        }

        let mut registry = AdapterRegistry::new();
        registry.register_adapter::<Todo>(Arc::new(ShoutingAdapter));

        // Note has no adapter registered and falls back to itself.
        let doc = registry.adapt(&Note);
        assert_eq!(doc.body["description"], "plain");
    }

    #[test]
    fn test_mapping_lookup() {
        let mut registry = AdapterRegistry::new();
        registry.register_mapping(
            "Todo",
            TypeMapping::new(json!({"description": {"type": "text"}})),
        );
        registry.register_mapping(
            "Comment",
            TypeMapping::new(json!({"body": {"type": "text"}})).with_parent("Todo"),
        );

        let mapping = registry.mapping("Comment").unwrap();
        assert_eq!(mapping.parent_type.as_deref(), Some("Todo"));

        let err = registry.mapping("Missing").unwrap_err();
        assert!(matches!(err, SearchError::MappingNotRegistered(_)));

        let types: Vec<&str> = registry.document_types().collect();
        assert_eq!(types, vec!["Todo", "Comment"]);
    }

    #[test]
    fn test_mapping_reregistration_replaces_in_place() {
        let mut registry = AdapterRegistry::new();
        registry.register_mapping("Todo", TypeMapping::new(json!({"a": 1})));
        registry.register_mapping("Comment", TypeMapping::new(json!({"b": 2})));
        registry.register_mapping("Todo", TypeMapping::new(json!({"a": 3})));

        assert_eq!(registry.mapping("Todo").unwrap().properties, json!({"a": 3}));
        let types: Vec<&str> = registry.document_types().collect();
        assert_eq!(types, vec!["Todo", "Comment"]);
    }
}
