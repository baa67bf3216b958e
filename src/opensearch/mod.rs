//! OpenSearch implementation of the search backend.
//!
//! This module provides a concrete implementation of `SearchBackend`
//! using OpenSearch as the engine, plus the fixed settings document
//! applied at index creation.

mod client;
mod index_settings;

pub use client::OpenSearchBackend;
pub use index_settings::create_index_settings;
