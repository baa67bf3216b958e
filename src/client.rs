//! The public search client.
//!
//! `SearchClient` fronts a [`SearchBackend`] with an explicit dispatch
//! policy on every mutating operation:
//!
//! 1. indexing disabled → drop the operation entirely;
//! 2. transactional and not marked immediate → enqueue into the write
//!    buffer and enroll in the current transaction;
//! 3. otherwise → call the backend synchronously.
//!
//! Buffered operations replay when the transaction commits; callers in
//! transactional mode must not depend on a result from index/delete.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::adapter::{AdapterRegistry, DocumentAdapter, Indexable, TypeMapping};
use crate::config::ClientConfig;
use crate::errors::SearchError;
use crate::interfaces::SearchBackend;
use crate::opensearch::{create_index_settings, OpenSearchBackend};
use crate::query::{QueryBuilder, ResultRecord, SearchResults};
use crate::txn::{
    join_transaction, lock_unpoisoned, PendingOp, TransactionManager, WriteBuffer,
};
use crate::types::{DeleteRequest, IndexRequest, SearchParams};

/// Shared state behind a [`SearchClient`] and its transaction
/// participants.
pub(crate) struct ClientCore {
    pub(crate) id: Uuid,
    pub(crate) config: ClientConfig,
    pub(crate) backend: Arc<dyn SearchBackend>,
    pub(crate) adapters: AdapterRegistry,
    pub(crate) manager: Arc<TransactionManager>,
    pub(crate) buffer: Mutex<WriteBuffer>,
}

impl ClientCore {
    /// Execute one operation against the backend with immediate
    /// semantics. Used both for direct dispatch and for replay during the
    /// commit phase.
    pub(crate) async fn apply(&self, op: PendingOp) -> Result<(), SearchError> {
        match op {
            PendingOp::Index {
                doc_type,
                id,
                body,
                parent,
            } => {
                self.backend
                    .index(&self.config.index, &doc_type, &id, &body, parent.as_deref())
                    .await
            }
            PendingOp::Delete {
                doc_type,
                id,
                routing,
                safe,
            } => {
                let result = self
                    .backend
                    .delete(&self.config.index, &doc_type, &id, routing.as_deref())
                    .await;
                match result {
                    Err(e) if e.is_not_found() && safe => {
                        debug!(doc_type = %doc_type, id = %id, "safe delete of missing document");
                        Ok(())
                    }
                    other => other,
                }
            }
        }
    }
}

/// A handle for interacting with one search index.
///
/// Cloning is cheap and clones share the same identity, buffer, and
/// configuration. Construct with [`SearchClient::new`], the
/// [builder](SearchClient::builder), or [`SearchClient::connect`].
#[derive(Clone)]
pub struct SearchClient {
    core: Arc<ClientCore>,
}

impl SearchClient {
    /// Create a client over the given backend with a default adapter
    /// registry and a fresh transaction manager.
    pub fn new(backend: Arc<dyn SearchBackend>, config: ClientConfig) -> Self {
        Self::builder(backend, config).build()
    }

    /// Start building a client.
    pub fn builder(backend: Arc<dyn SearchBackend>, config: ClientConfig) -> SearchClientBuilder {
        SearchClientBuilder {
            backend,
            config,
            manager: None,
            adapters: AdapterRegistry::new(),
        }
    }

    /// Connect to the configured OpenSearch endpoint, verify it is
    /// reachable, and optionally ensure the index exists.
    pub async fn connect(config: ClientConfig) -> Result<Self, SearchError> {
        let server = config
            .servers
            .first()
            .ok_or_else(|| SearchError::config("no servers configured"))?;
        let backend = Arc::new(OpenSearchBackend::new(server, config.timeout)?);
        let client = Self::new(backend, config);

        let healthy = client.core.backend.health_check().await?;
        if !healthy {
            return Err(SearchError::connection("search backend is unhealthy"));
        }
        info!(index = %client.core.config.index, "search backend connection verified");

        if client.core.config.ensure_index_on_start {
            client.ensure_index(false).await?;
        }
        Ok(client)
    }

    /// Stable identity of this client.
    pub fn id(&self) -> Uuid {
        self.core.id
    }

    /// The transaction manager this client enrolls with.
    pub fn transaction_manager(&self) -> &Arc<TransactionManager> {
        &self.core.manager
    }

    /// The adapter registry used to render domain objects.
    pub fn adapters(&self) -> &AdapterRegistry {
        &self.core.adapters
    }

    /// Number of operations buffered and awaiting commit.
    pub fn pending_operations(&self) -> usize {
        lock_unpoisoned(&self.core.buffer).len()
    }

    #[cfg(test)]
    pub(crate) fn core(&self) -> &Arc<ClientCore> {
        &self.core
    }

    /// Ensure the index exists with the fixed settings document, deleting
    /// and recreating it when `recreate` is set.
    pub async fn ensure_index(&self, recreate: bool) -> Result<(), SearchError> {
        let index = &self.core.config.index;
        let exists = self.core.backend.index_exists(index).await?;
        if recreate || !exists {
            if exists {
                self.core.backend.delete_index(index).await?;
            }
            self.core
                .backend
                .create_index(index, &create_index_settings())
                .await?;
            info!(index = %index, "created search index");
        }
        Ok(())
    }

    /// Delete the index.
    pub async fn delete_index(&self) -> Result<(), SearchError> {
        self.core.backend.delete_index(&self.core.config.index).await
    }

    /// Put the registered mapping for a document type, deleting any
    /// existing mapping first when `recreate` is set.
    ///
    /// Fails with [`SearchError::MappingNotRegistered`] when the type was
    /// never registered; passing an unmapped type here is a programming
    /// error.
    pub async fn ensure_mapping(&self, doc_type: &str, recreate: bool) -> Result<(), SearchError> {
        let body = {
            let mapping = self.core.adapters.mapping(doc_type)?;
            compose_mapping_body(mapping)
        };

        if recreate {
            match self
                .core
                .backend
                .delete_mapping(&self.core.config.index, doc_type)
                .await
            {
                Err(e) if e.is_not_found() => {}
                other => other?,
            }
        }

        debug!(doc_type = %doc_type, "putting mapping");
        self.core
            .backend
            .put_mapping(&self.core.config.index, doc_type, &body)
            .await
    }

    /// Delete the mapping for a document type.
    pub async fn delete_mapping(&self, doc_type: &str) -> Result<(), SearchError> {
        self.core
            .backend
            .delete_mapping(&self.core.config.index, doc_type)
            .await
    }

    /// Put mappings for every registered document type, in registration
    /// order.
    pub async fn ensure_all_mappings(&self, recreate: bool) -> Result<(), SearchError> {
        let doc_types: Vec<String> = self
            .core
            .adapters
            .document_types()
            .map(str::to_string)
            .collect();
        for doc_type in doc_types {
            self.ensure_mapping(&doc_type, recreate).await?;
        }
        Ok(())
    }

    /// The mappings currently used by the backend, optionally narrowed to
    /// one document type.
    pub async fn get_mappings(&self, doc_type: Option<&str>) -> Result<Value, SearchError> {
        self.core
            .backend
            .get_mapping(&self.core.config.index, doc_type)
            .await
    }

    /// Add or update the indexed document for a domain object.
    pub async fn index_object(&self, obj: &dyn Indexable) -> Result<(), SearchError> {
        let doc = self.core.adapters.adapt(obj);
        self.index_document(
            IndexRequest::new(doc.doc_type, doc.id, doc.body).with_parent_opt(doc.parent),
        )
        .await
    }

    /// Add or update the indexed documents for several objects.
    pub async fn index_objects<'a, I>(&self, objects: I) -> Result<(), SearchError>
    where
        I: IntoIterator<Item = &'a dyn Indexable>,
    {
        for obj in objects {
            self.index_object(obj).await?;
        }
        Ok(())
    }

    /// Delete the indexed document for a domain object.
    pub async fn delete_object(&self, obj: &dyn Indexable, safe: bool) -> Result<(), SearchError> {
        let doc = self.core.adapters.adapt(obj);
        let mut request = DeleteRequest::new(doc.doc_type, doc.id).with_routing_opt(doc.parent);
        if safe {
            request = request.safe();
        }
        self.delete_document(request).await
    }

    /// Add or update an indexed document from a raw source.
    #[instrument(skip(self, request), fields(doc_type = %request.doc_type, id = %request.id))]
    pub async fn index_document(&self, request: IndexRequest) -> Result<(), SearchError> {
        if self.core.config.disable_indexing {
            debug!("indexing disabled, dropping operation");
            return Ok(());
        }

        let op = PendingOp::Index {
            doc_type: request.doc_type,
            id: request.id,
            body: request.body,
            parent: request.parent,
        };

        if self.core.config.use_transaction && !request.immediate {
            join_transaction(&self.core)?;
            debug!("buffering index operation");
            lock_unpoisoned(&self.core.buffer).push(op);
            return Ok(());
        }

        self.core.apply(op).await
    }

    /// Delete an indexed document by type and id.
    #[instrument(skip(self, request), fields(doc_type = %request.doc_type, id = %request.id))]
    pub async fn delete_document(&self, request: DeleteRequest) -> Result<(), SearchError> {
        if self.core.config.disable_indexing {
            debug!("indexing disabled, dropping operation");
            return Ok(());
        }

        let op = PendingOp::Delete {
            doc_type: request.doc_type,
            id: request.id,
            routing: request.routing,
            safe: request.safe,
        };

        if self.core.config.use_transaction && !request.immediate {
            join_transaction(&self.core)?;
            debug!("buffering delete operation");
            lock_unpoisoned(&self.core.buffer).push(op);
            return Ok(());
        }

        self.core.apply(op).await
    }

    /// Flush the index to durable storage.
    pub async fn flush(&self, force: bool) -> Result<(), SearchError> {
        self.core.backend.flush(&self.core.config.index, force).await
    }

    /// Refresh the index so recent writes become searchable.
    pub async fn refresh(&self) -> Result<(), SearchError> {
        self.core.backend.refresh(&self.core.config.index).await
    }

    /// Retrieve the source document for a domain object.
    pub async fn get_object(&self, obj: &dyn Indexable) -> Result<ResultRecord, SearchError> {
        let doc = self.core.adapters.adapt(obj);
        self.get_document(&doc.doc_type, &doc.id, doc.parent.as_deref())
            .await
    }

    /// Retrieve a source document by type and id.
    pub async fn get_document(
        &self,
        doc_type: &str,
        id: &str,
        routing: Option<&str>,
    ) -> Result<ResultRecord, SearchError> {
        let raw = self
            .core
            .backend
            .get(&self.core.config.index, doc_type, id, routing)
            .await?;
        Ok(ResultRecord::new(raw))
    }

    /// Run a search with a caller-supplied body.
    #[instrument(skip(self, body, params), fields(doc_types = doc_types.len()))]
    pub async fn search(
        &self,
        body: Value,
        doc_types: &[String],
        params: &SearchParams,
    ) -> Result<SearchResults, SearchError> {
        let raw = self
            .core
            .backend
            .search(&self.core.config.index, doc_types, &body, params)
            .await?;
        Ok(SearchResults::new(raw))
    }

    /// Start building a query against the given document types.
    pub fn query<I, S>(&self, doc_types: I) -> QueryBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        QueryBuilder::new(
            self.clone(),
            doc_types.into_iter().map(Into::into).collect(),
        )
    }
}

fn compose_mapping_body(mapping: &TypeMapping) -> Value {
    let mut body = json!({ "properties": mapping.properties.clone() });
    if let Some(parent) = &mapping.parent_type {
        body["_parent"] = json!({ "type": parent });
    }
    body
}

/// Configures and builds a [`SearchClient`].
pub struct SearchClientBuilder {
    backend: Arc<dyn SearchBackend>,
    config: ClientConfig,
    manager: Option<Arc<TransactionManager>>,
    adapters: AdapterRegistry,
}

impl SearchClientBuilder {
    /// Enroll with an existing transaction manager instead of a fresh
    /// one. Clients sharing a manager share its transactions.
    pub fn transaction_manager(mut self, manager: Arc<TransactionManager>) -> Self {
        self.manager = Some(manager);
        self
    }

    /// Replace the adapter registry.
    pub fn adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = adapters;
        self
    }

    /// Register an adapter for the concrete type `T`.
    pub fn register_adapter<T: Indexable>(mut self, adapter: Arc<dyn DocumentAdapter>) -> Self {
        self.adapters.register_adapter::<T>(adapter);
        self
    }

    /// Register the mapping for a document type.
    pub fn register_mapping(mut self, doc_type: impl Into<String>, mapping: TypeMapping) -> Self {
        self.adapters.register_mapping(doc_type, mapping);
        self
    }

    /// Build the client.
    pub fn build(self) -> SearchClient {
        let core = ClientCore {
            id: Uuid::new_v4(),
            config: self.config,
            backend: self.backend,
            adapters: self.adapters,
            manager: self.manager.unwrap_or_else(TransactionManager::new),
            buffer: Mutex::new(WriteBuffer::default()),
        };
        debug!(client_id = %core.id, index = %core.config.index, "created search client");
        SearchClient {
            core: Arc::new(core),
        }
    }
}
