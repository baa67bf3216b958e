//! Typed access to raw search responses.

use serde_json::Value;

/// A search response wrapped as a lazy, restartable sequence of records.
///
/// [`iter`](SearchResults::iter) may be called any number of times; each
/// pass walks the hits in the order the backend ranked them.
#[derive(Debug, Clone)]
pub struct SearchResults {
    raw: Value,
}

impl SearchResults {
    pub(crate) fn new(raw: Value) -> Self {
        Self { raw }
    }

    /// Total number of matching documents.
    ///
    /// Tolerates both response shapes: a bare number and the
    /// `{"value": n}` object newer engines return.
    pub fn total(&self) -> u64 {
        let total = &self.raw["hits"]["total"];
        total
            .as_u64()
            .or_else(|| total.get("value").and_then(Value::as_u64))
            .unwrap_or(0)
    }

    /// Highest relevance score in the response, if any.
    pub fn max_score(&self) -> Option<f64> {
        self.raw["hits"]["max_score"].as_f64()
    }

    /// Number of hits returned in this response window.
    pub fn len(&self) -> usize {
        self.hits().map(Vec::len).unwrap_or(0)
    }

    /// True if the response window is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate the hits in backend ranking order.
    pub fn iter(&self) -> impl Iterator<Item = ResultRecord> + '_ {
        self.hits()
            .into_iter()
            .flatten()
            .map(|hit| ResultRecord::new(hit.clone()))
    }

    /// The raw backend response.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    fn hits(&self) -> Option<&Vec<Value>> {
        self.raw["hits"]["hits"].as_array()
    }
}

/// One returned document: a search hit or a get response.
///
/// Field access reads the document source.
#[derive(Debug, Clone)]
pub struct ResultRecord {
    raw: Value,
}

impl ResultRecord {
    pub(crate) fn new(raw: Value) -> Self {
        Self { raw }
    }

    /// Document identifier.
    pub fn id(&self) -> Option<&str> {
        self.raw["_id"].as_str()
    }

    /// Document type tag.
    pub fn doc_type(&self) -> Option<&str> {
        self.raw["_type"].as_str()
    }

    /// Relevance score assigned by the backend.
    pub fn score(&self) -> Option<f64> {
        self.raw["_score"].as_f64()
    }

    /// The document source.
    pub fn source(&self) -> Option<&Value> {
        self.raw.get("_source")
    }

    /// One field of the document source.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.source().and_then(|source| source.get(name))
    }

    /// The raw hit.
    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response() -> SearchResults {
        SearchResults::new(json!({
            "took": 3,
            "hits": {
                "total": {"value": 2},
                "max_score": 2.5,
                "hits": [
                    {
                        "_id": "42",
                        "_type": "Todo",
                        "_score": 2.5,
                        "_source": {"description": "first"},
                    },
                    {
                        "_id": "43",
                        "_type": "Todo",
                        "_score": 1.0,
                        "_source": {"description": "second"},
                    },
                ],
            }
        }))
    }

    #[test]
    fn test_ranking_order_preserved() {
        let results = response();
        let ordered: Vec<String> = results
            .iter()
            .map(|r| r.id().unwrap().to_string())
            .collect();
        assert_eq!(ordered, vec!["42", "43"]);
    }

    #[test]
    fn test_iteration_is_restartable() {
        let results = response();
        assert_eq!(results.iter().count(), 2);
        assert_eq!(results.iter().count(), 2);
    }

    #[test]
    fn test_record_accessors() {
        let results = response();
        let record = results.iter().next().unwrap();

        assert_eq!(record.id(), Some("42"));
        assert_eq!(record.doc_type(), Some("Todo"));
        assert_eq!(record.score(), Some(2.5));
        assert_eq!(record.field("description"), Some(&json!("first")));
        assert!(record.field("missing").is_none());
    }

    #[test]
    fn test_total_tolerates_both_shapes() {
        let object_shape = response();
        assert_eq!(object_shape.total(), 2);

        let number_shape = SearchResults::new(json!({
            "hits": {"total": 7, "hits": []}
        }));
        assert_eq!(number_shape.total(), 7);
        assert!(number_shape.is_empty());
        assert_eq!(number_shape.max_score(), None);
    }
}
