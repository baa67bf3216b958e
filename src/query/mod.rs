//! Structured query construction and execution.
//!
//! [`QueryBuilder`] assembles a search request body from full-text
//! clauses, filters, sorting, and pagination. Construction is pure;
//! nothing touches the backend until [`execute`](QueryBuilder::execute),
//! which performs exactly one round trip.

mod results;

pub use results::{ResultRecord, SearchResults};

use serde_json::{json, Map, Value};

use crate::client::SearchClient;
use crate::errors::SearchError;
use crate::types::SearchParams;

/// Builds and executes one search request.
///
/// Obtained from [`SearchClient::query`]. Builder methods consume and
/// return `self`; [`build_body`](QueryBuilder::build_body) renders the
/// request body without side effects.
#[derive(Clone)]
pub struct QueryBuilder {
    client: SearchClient,
    doc_types: Vec<String>,
    must: Vec<Value>,
    filters: Vec<Value>,
    sorts: Vec<Value>,
    from: Option<u64>,
    size: Option<u64>,
    fields: Option<Vec<String>>,
}

impl QueryBuilder {
    pub(crate) fn new(client: SearchClient, doc_types: Vec<String>) -> Self {
        Self {
            client,
            doc_types,
            must: Vec::new(),
            filters: Vec::new(),
            sorts: Vec::new(),
            from: None,
            size: None,
            fields: None,
        }
    }

    /// Add a full-text match clause on one field.
    pub fn match_field(mut self, field: impl Into<String>, text: impl Into<String>) -> Self {
        let field = field.into();
        self.must
            .push(json!({ "match": { field: { "query": text.into() } } }));
        self
    }

    /// Add an exact-value filter.
    pub fn filter_term(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        self.filters.push(json!({ "term": { field: value.into() } }));
        self
    }

    /// Add a one-of-values filter.
    pub fn filter_terms(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        let field = field.into();
        self.filters.push(json!({ "terms": { field: values } }));
        self
    }

    /// Add a range filter. `bounds` is the range body, e.g.
    /// `json!({"gte": 1, "lt": 10})`.
    pub fn filter_range(mut self, field: impl Into<String>, bounds: Value) -> Self {
        let field = field.into();
        self.filters.push(json!({ "range": { field: bounds } }));
        self
    }

    /// Sort by a field. Sorts apply in the order they are added.
    pub fn sort_by(mut self, field: impl Into<String>, ascending: bool) -> Self {
        let field = field.into();
        let order = if ascending { "asc" } else { "desc" };
        self.sorts.push(json!({ field: { "order": order } }));
        self
    }

    /// Paginate the result window.
    pub fn page(mut self, from: u64, size: u64) -> Self {
        self.from = Some(from);
        self.size = Some(size);
        self
    }

    /// Restrict the source fields returned per hit.
    pub fn fields(mut self, fields: Vec<String>) -> Self {
        self.fields = Some(fields);
        self
    }

    /// Render the request body. Pure; does not contact the backend.
    pub fn build_body(&self) -> Value {
        let query = if self.must.is_empty() && self.filters.is_empty() {
            json!({ "match_all": {} })
        } else {
            let mut bool_clause = Map::new();
            if !self.must.is_empty() {
                bool_clause.insert("must".to_string(), Value::Array(self.must.clone()));
            }
            if !self.filters.is_empty() {
                bool_clause.insert("filter".to_string(), Value::Array(self.filters.clone()));
            }
            json!({ "bool": bool_clause })
        };

        let mut body = Map::new();
        body.insert("query".to_string(), query);
        if !self.sorts.is_empty() {
            body.insert("sort".to_string(), Value::Array(self.sorts.clone()));
        }
        if let Some(from) = self.from {
            body.insert("from".to_string(), json!(from));
        }
        if let Some(size) = self.size {
            body.insert("size".to_string(), json!(size));
        }
        Value::Object(body)
    }

    /// Execute the query. Exactly one backend round trip; results preserve
    /// the backend's ranking order.
    pub async fn execute(&self) -> Result<SearchResults, SearchError> {
        let params = SearchParams {
            fields: self.fields.clone(),
            ..SearchParams::default()
        };
        self.client
            .search(self.build_body(), &self.doc_types, &params)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::memory::MemoryBackend;
    use std::sync::Arc;

    fn builder() -> (QueryBuilder, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let client = SearchClient::new(backend.clone(), ClientConfig::new("docs"));
        let query = client.query(["Todo"]);
        (query, backend)
    }

    #[test]
    fn test_empty_query_is_match_all() {
        let (query, _) = builder();
        assert_eq!(query.build_body(), serde_json::json!({"query": {"match_all": {}}}));
    }

    #[test]
    fn test_build_body_structure() {
        let (query, _) = builder();
        let body = query
            .match_field("description", "exhaustive")
            .filter_term("done", false)
            .filter_range("priority", json!({"gte": 2}))
            .sort_by("priority", false)
            .page(10, 5)
            .build_body();

        let must = body["query"]["bool"]["must"].as_array().unwrap();
        assert_eq!(must.len(), 1);
        assert_eq!(must[0]["match"]["description"]["query"], "exhaustive");

        let filter = body["query"]["bool"]["filter"].as_array().unwrap();
        assert_eq!(filter.len(), 2);
        assert_eq!(filter[0]["term"]["done"], false);
        assert_eq!(filter[1]["range"]["priority"]["gte"], 2);

        assert_eq!(body["sort"][0]["priority"]["order"], "desc");
        assert_eq!(body["from"], 10);
        assert_eq!(body["size"], 5);
    }

    #[test]
    fn test_construction_has_no_side_effects() {
        let (query, backend) = builder();
        let _ = query
            .match_field("description", "anything")
            .filter_terms("state", vec![json!("open"), json!("closed")])
            .build_body();

        assert_eq!(backend.search_calls(), 0);
        assert_eq!(backend.write_calls(), 0);
    }

    #[tokio::test]
    async fn test_execute_performs_one_round_trip() {
        let (query, backend) = builder();
        let results = query.clone().match_field("description", "x").execute().await.unwrap();

        assert_eq!(backend.search_calls(), 1);
        assert_eq!(results.total(), 0);

        query.execute().await.unwrap();
        assert_eq!(backend.search_calls(), 2);
    }
}
