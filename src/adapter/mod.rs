//! Document adapter resolution.
//!
//! Domain objects become search documents through a capability interface
//! ([`Indexable`]) that types implement directly, and an override
//! interface ([`DocumentAdapter`]) whose methods default to forwarding to
//! the object's own implementation. Adapters are resolved through an
//! explicit registry keyed by concrete type; resolution is a pure function
//! of the object and the registry.

mod indexable;
mod registry;

pub use indexable::Indexable;
pub use registry::{AdapterRegistry, DefaultAdapter, DocumentAdapter, TypeMapping};
