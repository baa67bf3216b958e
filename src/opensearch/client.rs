//! OpenSearch backend implementation.
//!
//! This module provides the concrete implementation of `SearchBackend`
//! using the OpenSearch Rust client.
//!
//! Modern engines are typeless, so the document-type contract is folded
//! onto a single index: every document carries a `doc_type` keyword
//! field, document ids are namespaced as `{doc_type}_{id}`, type-scoped
//! searches filter on `doc_type`, and responses are rewritten back to
//! external `(type, id)` form before they leave this module. The parent
//! key maps to request routing.

use std::time::Duration;

use async_trait::async_trait;
use opensearch::{
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    indices::{
        IndicesCreateParts, IndicesDeleteParts, IndicesExistsParts, IndicesFlushParts,
        IndicesGetMappingParts, IndicesPutMappingParts, IndicesRefreshParts,
    },
    DeleteByQueryParts, DeleteParts, GetParts, IndexParts, OpenSearch, SearchParts,
};
use serde_json::{json, Value};
use tracing::{debug, error, info};
use url::Url;

use crate::errors::SearchError;
use crate::interfaces::SearchBackend;
use crate::types::SearchParams;

/// A [`SearchBackend`] over an OpenSearch node.
pub struct OpenSearchBackend {
    client: OpenSearch,
    timeout: Duration,
}

impl OpenSearchBackend {
    /// Create a backend connected to the given endpoint.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, SearchError> {
        let parsed_url = Url::parse(url).map_err(|e| SearchError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| SearchError::connection(e.to_string()))?;

        info!(url = %url, "created OpenSearch backend");

        Ok(Self {
            client: OpenSearch::new(transport),
            timeout,
        })
    }

    /// Compose the stored document id from the external `(type, id)` pair.
    fn document_id(doc_type: &str, id: &str) -> String {
        format!("{}_{}", doc_type, id)
    }

    /// Rewrite a hit from stored form back to external `(type, id)` form.
    fn externalize_hit(hit: &mut Value) {
        let doc_type = hit["_source"]["doc_type"].as_str().map(str::to_string);
        if let Some(doc_type) = doc_type {
            if let Some(stored_id) = hit["_id"].as_str() {
                let prefix = format!("{}_", doc_type);
                let external = stored_id.strip_prefix(&prefix).unwrap_or(stored_id);
                hit["_id"] = json!(external);
            }
            hit["_type"] = json!(doc_type);
        }
    }
}

#[async_trait]
impl SearchBackend for OpenSearchBackend {
    async fn index_exists(&self, index: &str) -> Result<bool, SearchError> {
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .request_timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        Ok(response.status_code().is_success())
    }

    async fn create_index(&self, index: &str, settings: &Value) -> Result<(), SearchError> {
        let mut body = settings.clone();
        // The doc_type discriminator field backs type-scoped searches.
        if body.get("mappings").is_none() {
            body["mappings"] = json!({
                "properties": { "doc_type": { "type": "keyword" } }
            });
        }

        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(body)
            .request_timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SearchError::IndexCreationError(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Create index request failed");
            return Err(SearchError::IndexCreationError(format!(
                "Create index failed with status {}: {}",
                status, error_body
            )));
        }

        debug!(index = %index, "index created");
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<(), SearchError> {
        let response = self
            .client
            .indices()
            .delete(IndicesDeleteParts::Index(&[index]))
            .request_timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SearchError::delete(e.to_string()))?;

        let status = response.status_code();
        if status.as_u16() == 404 {
            return Err(SearchError::not_found(format!("index '{index}'")));
        }
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(SearchError::delete(format!(
                "Delete index failed with status {}: {}",
                status, error_body
            )));
        }
        Ok(())
    }

    async fn put_mapping(
        &self,
        index: &str,
        doc_type: &str,
        body: &Value,
    ) -> Result<(), SearchError> {
        let mut body = body.clone();
        if let Some(obj) = body.as_object_mut() {
            // Join-style parent links are expressed through routing, not
            // the schema, on a typeless engine.
            obj.remove("_parent");
        }
        if let Some(properties) = body.get_mut("properties").and_then(Value::as_object_mut) {
            properties
                .entry("doc_type".to_string())
                .or_insert(json!({ "type": "keyword" }));
        }

        let response = self
            .client
            .indices()
            .put_mapping(IndicesPutMappingParts::Index(&[index]))
            .body(body)
            .request_timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SearchError::index(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Put mapping request failed");
            return Err(SearchError::index(format!(
                "Put mapping failed with status {}: {}",
                status, error_body
            )));
        }

        debug!(doc_type = %doc_type, "mapping updated");
        Ok(())
    }

    /// Fields merged into the index schema cannot be removed again, so
    /// deleting a mapping removes that type's documents and leaves the
    /// schema in place.
    async fn delete_mapping(&self, index: &str, doc_type: &str) -> Result<(), SearchError> {
        let response = self
            .client
            .delete_by_query(DeleteByQueryParts::Index(&[index]))
            .body(json!({ "query": { "term": { "doc_type": doc_type } } }))
            .request_timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SearchError::delete(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(SearchError::delete(format!(
                "Delete mapping failed with status {}: {}",
                status, error_body
            )));
        }
        Ok(())
    }

    /// Returns the full index mappings; per-type narrowing is not
    /// expressible against a merged schema.
    async fn get_mapping(
        &self,
        index: &str,
        _doc_type: Option<&str>,
    ) -> Result<Value, SearchError> {
        let response = self
            .client
            .indices()
            .get_mapping(IndicesGetMappingParts::Index(&[index]))
            .request_timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SearchError::query(e.to_string()))?;

        let raw = response
            .json::<Value>()
            .await
            .map_err(|e| SearchError::parse(e.to_string()))?;
        Ok(raw[index]["mappings"].clone())
    }

    async fn flush(&self, index: &str, force: bool) -> Result<(), SearchError> {
        let response = self
            .client
            .indices()
            .flush(IndicesFlushParts::Index(&[index]))
            .force(force)
            .request_timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            return Err(SearchError::index(format!(
                "Flush failed with status {}",
                status
            )));
        }
        Ok(())
    }

    async fn refresh(&self, index: &str) -> Result<(), SearchError> {
        let response = self
            .client
            .indices()
            .refresh(IndicesRefreshParts::Index(&[index]))
            .request_timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            return Err(SearchError::index(format!(
                "Refresh failed with status {}",
                status
            )));
        }
        Ok(())
    }

    async fn index(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        body: &Value,
        parent: Option<&str>,
    ) -> Result<(), SearchError> {
        let doc_id = Self::document_id(doc_type, id);

        let mut doc = body.clone();
        let fields = doc
            .as_object_mut()
            .ok_or_else(|| SearchError::serialization("document body must be a JSON object"))?;
        fields.insert("doc_type".to_string(), json!(doc_type));

        let mut request = self
            .client
            .index(IndexParts::IndexId(index, &doc_id))
            .body(doc)
            .request_timeout(self.timeout);
        if let Some(parent) = parent {
            request = request.routing(parent);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SearchError::index(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Index request failed");
            return Err(SearchError::index(format!(
                "Index failed with status {}: {}",
                status, error_body
            )));
        }

        debug!(doc_id = %doc_id, "document indexed");
        Ok(())
    }

    async fn delete(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        routing: Option<&str>,
    ) -> Result<(), SearchError> {
        let doc_id = Self::document_id(doc_type, id);

        let mut request = self
            .client
            .delete(DeleteParts::IndexId(index, &doc_id))
            .request_timeout(self.timeout);
        if let Some(routing) = routing {
            request = request.routing(routing);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SearchError::delete(e.to_string()))?;

        let status = response.status_code();
        if status.as_u16() == 404 {
            return Err(SearchError::not_found(format!("{doc_type}/{id}")));
        }
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Delete request failed");
            return Err(SearchError::delete(format!(
                "Delete failed with status {}: {}",
                status, error_body
            )));
        }

        debug!(doc_id = %doc_id, "document deleted");
        Ok(())
    }

    async fn get(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        routing: Option<&str>,
    ) -> Result<Value, SearchError> {
        let doc_id = Self::document_id(doc_type, id);

        let mut request = self
            .client
            .get(GetParts::IndexId(index, &doc_id))
            .request_timeout(self.timeout);
        if let Some(routing) = routing {
            request = request.routing(routing);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SearchError::query(e.to_string()))?;

        let status = response.status_code();
        if status.as_u16() == 404 {
            return Err(SearchError::not_found(format!("{doc_type}/{id}")));
        }
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(SearchError::query(format!(
                "Get failed with status {}: {}",
                status, error_body
            )));
        }

        let mut raw = response
            .json::<Value>()
            .await
            .map_err(|e| SearchError::parse(e.to_string()))?;
        raw["_id"] = json!(id);
        raw["_type"] = json!(doc_type);
        Ok(raw)
    }

    async fn search(
        &self,
        index: &str,
        doc_types: &[String],
        body: &Value,
        params: &SearchParams,
    ) -> Result<Value, SearchError> {
        let mut body = body.clone();
        let fields = body
            .as_object_mut()
            .ok_or_else(|| SearchError::query("search body must be a JSON object"))?;

        if !doc_types.is_empty() {
            let original = fields
                .remove("query")
                .unwrap_or_else(|| json!({ "match_all": {} }));
            fields.insert(
                "query".to_string(),
                json!({
                    "bool": {
                        "must": [original],
                        "filter": [{ "terms": { "doc_type": doc_types } }]
                    }
                }),
            );
        }
        if let Some(source_fields) = &params.fields {
            fields.insert("_source".to_string(), json!(source_fields));
        }
        if let Some(from) = params.from {
            fields.entry("from".to_string()).or_insert(json!(from));
        }
        if let Some(size) = params.size {
            fields.entry("size".to_string()).or_insert(json!(size));
        }

        let response = self
            .client
            .search(SearchParts::Index(&[index]))
            .body(body)
            .request_timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SearchError::query(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Search request failed");
            return Err(SearchError::query(format!(
                "Search failed with status {}: {}",
                status, error_body
            )));
        }

        let mut raw = response
            .json::<Value>()
            .await
            .map_err(|e| SearchError::parse(e.to_string()))?;
        if let Some(hits) = raw["hits"]["hits"].as_array_mut() {
            for hit in hits {
                Self::externalize_hit(hit);
            }
        }
        Ok(raw)
    }

    async fn health_check(&self) -> Result<bool, SearchError> {
        let response = self
            .client
            .ping()
            .request_timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        Ok(response.status_code().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id() {
        assert_eq!(OpenSearchBackend::document_id("Todo", "42"), "Todo_42");
    }

    #[test]
    fn test_externalize_hit() {
        let mut hit = json!({
            "_id": "Todo_42",
            "_score": 1.5,
            "_source": {
                "doc_type": "Todo",
                "description": "rewrite me"
            }
        });

        OpenSearchBackend::externalize_hit(&mut hit);

        assert_eq!(hit["_id"], "42");
        assert_eq!(hit["_type"], "Todo");
        assert_eq!(hit["_source"]["description"], "rewrite me");
    }

    #[test]
    fn test_externalize_hit_without_doc_type() {
        let mut hit = json!({
            "_id": "free_7",
            "_source": { "description": "untyped" }
        });

        OpenSearchBackend::externalize_hit(&mut hit);

        // Nothing to rewrite without the discriminator field.
        assert_eq!(hit["_id"], "free_7");
        assert!(hit.get("_type").is_none());
    }
}
