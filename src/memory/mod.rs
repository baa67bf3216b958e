//! In-process search backend.
//!
//! `MemoryBackend` implements the full [`SearchBackend`] contract against
//! process memory: an ordered document store, per-type mappings, and a
//! naive token-matching search good enough to exercise full-text flows
//! without a server. Tests lean on its write/search counters and call
//! journal to assert that buffered operations never touch the backend
//! before commit.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::errors::SearchError;
use crate::interfaces::SearchBackend;
use crate::txn::lock_unpoisoned;
use crate::types::SearchParams;

#[derive(Debug, Clone)]
struct StoredDoc {
    doc_type: String,
    id: String,
    parent: Option<String>,
    body: Value,
}

#[derive(Debug, Default)]
struct IndexState {
    created: bool,
    settings: Value,
    mappings: Vec<(String, Value)>,
    docs: Vec<StoredDoc>,
}

/// An in-process [`SearchBackend`].
///
/// Documents become searchable immediately; `flush` and `refresh` are
/// no-ops kept for contract parity. Search supports `match_all`, `match`,
/// `term`, `terms`, `range`, and `bool` clauses with token matching,
/// scores hits by matched-token count, and honors `sort`, `from`, and
/// `size`. The `fields` search parameter is ignored; records read from
/// `_source`.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<IndexState>,
    write_calls: AtomicUsize,
    search_calls: AtomicUsize,
    journal: Mutex<Vec<String>>,
    failing_ids: Mutex<HashSet<String>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of index/delete calls that reached the backend.
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// Number of search calls that reached the backend.
    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    /// Number of stored documents.
    pub fn doc_count(&self) -> usize {
        lock_unpoisoned(&self.state).docs.len()
    }

    /// Ordered record of every write call, as `"op:doc_type:id"`.
    pub fn journal(&self) -> Vec<String> {
        lock_unpoisoned(&self.journal).clone()
    }

    /// The stored body of a document, if present.
    pub fn stored(&self, doc_type: &str, id: &str) -> Option<Value> {
        lock_unpoisoned(&self.state)
            .docs
            .iter()
            .find(|d| d.doc_type == doc_type && d.id == id)
            .map(|d| d.body.clone())
    }

    /// Make subsequent writes for the given document id fail.
    pub fn fail_writes_for_id(&self, id: &str) {
        lock_unpoisoned(&self.failing_ids).insert(id.to_string());
    }

    fn record(&self, op: &str, doc_type: &str, id: &str) {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        lock_unpoisoned(&self.journal).push(format!("{op}:{doc_type}:{id}"));
    }

    fn should_fail(&self, id: &str) -> bool {
        lock_unpoisoned(&self.failing_ids).contains(id)
    }
}

#[async_trait]
impl SearchBackend for MemoryBackend {
    async fn index_exists(&self, _index: &str) -> Result<bool, SearchError> {
        Ok(lock_unpoisoned(&self.state).created)
    }

    async fn create_index(&self, index: &str, settings: &Value) -> Result<(), SearchError> {
        let mut state = lock_unpoisoned(&self.state);
        if state.created {
            return Err(SearchError::IndexCreationError(format!(
                "index '{index}' already exists"
            )));
        }
        state.created = true;
        state.settings = settings.clone();
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<(), SearchError> {
        let mut state = lock_unpoisoned(&self.state);
        if !state.created {
            return Err(SearchError::not_found(format!("index '{index}'")));
        }
        *state = IndexState::default();
        Ok(())
    }

    async fn put_mapping(
        &self,
        _index: &str,
        doc_type: &str,
        body: &Value,
    ) -> Result<(), SearchError> {
        let mut state = lock_unpoisoned(&self.state);
        if let Some(entry) = state.mappings.iter_mut().find(|(t, _)| t == doc_type) {
            entry.1 = body.clone();
        } else {
            state.mappings.push((doc_type.to_string(), body.clone()));
        }
        Ok(())
    }

    async fn delete_mapping(&self, _index: &str, doc_type: &str) -> Result<(), SearchError> {
        let mut state = lock_unpoisoned(&self.state);
        let before = state.mappings.len();
        state.mappings.retain(|(t, _)| t != doc_type);
        if state.mappings.len() == before {
            return Err(SearchError::not_found(format!("mapping '{doc_type}'")));
        }
        state.docs.retain(|d| d.doc_type != doc_type);
        Ok(())
    }

    async fn get_mapping(
        &self,
        _index: &str,
        doc_type: Option<&str>,
    ) -> Result<Value, SearchError> {
        let state = lock_unpoisoned(&self.state);
        match doc_type {
            Some(doc_type) => state
                .mappings
                .iter()
                .find(|(t, _)| t == doc_type)
                .map(|(t, m)| json!({ t.clone(): m.clone() }))
                .ok_or_else(|| SearchError::not_found(format!("mapping '{doc_type}'"))),
            None => {
                let mut all = Map::new();
                for (t, m) in &state.mappings {
                    all.insert(t.clone(), m.clone());
                }
                Ok(Value::Object(all))
            }
        }
    }

    async fn flush(&self, _index: &str, _force: bool) -> Result<(), SearchError> {
        Ok(())
    }

    async fn refresh(&self, _index: &str) -> Result<(), SearchError> {
        Ok(())
    }

    async fn index(
        &self,
        _index: &str,
        doc_type: &str,
        id: &str,
        body: &Value,
        parent: Option<&str>,
    ) -> Result<(), SearchError> {
        self.record("index", doc_type, id);
        if self.should_fail(id) {
            return Err(SearchError::index(format!("injected failure for {id}")));
        }

        let doc = StoredDoc {
            doc_type: doc_type.to_string(),
            id: id.to_string(),
            parent: parent.map(str::to_string),
            body: body.clone(),
        };

        let mut state = lock_unpoisoned(&self.state);
        if let Some(existing) = state
            .docs
            .iter_mut()
            .find(|d| d.doc_type == doc_type && d.id == id)
        {
            *existing = doc;
        } else {
            state.docs.push(doc);
        }
        Ok(())
    }

    async fn delete(
        &self,
        _index: &str,
        doc_type: &str,
        id: &str,
        _routing: Option<&str>,
    ) -> Result<(), SearchError> {
        self.record("delete", doc_type, id);
        if self.should_fail(id) {
            return Err(SearchError::delete(format!("injected failure for {id}")));
        }

        let mut state = lock_unpoisoned(&self.state);
        let before = state.docs.len();
        state.docs.retain(|d| !(d.doc_type == doc_type && d.id == id));
        if state.docs.len() == before {
            return Err(SearchError::not_found(format!("{doc_type}/{id}")));
        }
        Ok(())
    }

    async fn get(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        _routing: Option<&str>,
    ) -> Result<Value, SearchError> {
        let state = lock_unpoisoned(&self.state);
        state
            .docs
            .iter()
            .find(|d| d.doc_type == doc_type && d.id == id)
            .map(|d| {
                json!({
                    "_index": index,
                    "_type": d.doc_type,
                    "_id": d.id,
                    "found": true,
                    "_source": d.body,
                })
            })
            .ok_or_else(|| SearchError::not_found(format!("{doc_type}/{id}")))
    }

    async fn search(
        &self,
        index: &str,
        doc_types: &[String],
        body: &Value,
        params: &SearchParams,
    ) -> Result<Value, SearchError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);

        let query = body.get("query").cloned().unwrap_or(json!({"match_all": {}}));

        let state = lock_unpoisoned(&self.state);
        let mut scored: Vec<(f64, &StoredDoc)> = state
            .docs
            .iter()
            .filter(|d| doc_types.is_empty() || doc_types.contains(&d.doc_type))
            .filter(|d| clause_matches(&query, &d.body))
            .map(|d| (clause_score(&query, &d.body), d))
            .collect();

        if let Some(sorts) = body.get("sort").and_then(Value::as_array) {
            sort_hits(&mut scored, sorts);
        } else {
            scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        }

        let total = scored.len();
        let max_score = scored.iter().map(|(s, _)| *s).fold(None, |acc: Option<f64>, s| {
            Some(acc.map_or(s, |m| if s > m { s } else { m }))
        });

        let from = body
            .get("from")
            .and_then(Value::as_u64)
            .or(params.from)
            .unwrap_or(0) as usize;
        let size = body
            .get("size")
            .and_then(Value::as_u64)
            .or(params.size)
            .map(|s| s as usize)
            .unwrap_or(usize::MAX);

        let hits: Vec<Value> = scored
            .into_iter()
            .skip(from)
            .take(size)
            .map(|(score, d)| {
                json!({
                    "_index": index,
                    "_type": d.doc_type,
                    "_id": d.id,
                    "_score": score,
                    "_routing": d.parent,
                    "_source": d.body,
                })
            })
            .collect();

        Ok(json!({
            "took": 1,
            "hits": {
                "total": { "value": total },
                "max_score": max_score,
                "hits": hits,
            }
        }))
    }

    async fn health_check(&self) -> Result<bool, SearchError> {
        Ok(true)
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn value_tokens(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => tokens(s),
        Value::Number(n) => vec![n.to_string()],
        Value::Bool(b) => vec![b.to_string()],
        Value::Array(items) => items.iter().flat_map(value_tokens).collect(),
        _ => Vec::new(),
    }
}

fn match_text(clause: &Value) -> Option<(&str, String)> {
    let (field, options) = clause.as_object()?.iter().next()?;
    let text = match options {
        Value::String(s) => s.clone(),
        Value::Object(o) => o.get("query")?.as_str()?.to_string(),
        _ => return None,
    };
    Some((field, text))
}

fn field_matches_text(doc: &Value, field: &str, text: &str) -> bool {
    let Some(value) = doc.get(field) else {
        return false;
    };
    let doc_tokens = value_tokens(value);
    let query_tokens = tokens(text);
    !query_tokens.is_empty() && query_tokens.iter().all(|t| doc_tokens.contains(t))
}

fn values_equal(doc_value: &Value, expected: &Value) -> bool {
    if doc_value == expected {
        return true;
    }
    match (doc_value, expected) {
        (Value::String(a), b) | (b, Value::String(a)) => match b {
            Value::Number(n) => *a == n.to_string(),
            Value::Bool(v) => *a == v.to_string(),
            _ => false,
        },
        _ => false,
    }
}

fn clause_matches(clause: &Value, doc: &Value) -> bool {
    let Some(obj) = clause.as_object() else {
        return true;
    };

    if obj.contains_key("match_all") {
        return true;
    }

    if let Some(bool_clause) = obj.get("bool").and_then(Value::as_object) {
        let all_of = |key: &str| {
            bool_clause
                .get(key)
                .and_then(Value::as_array)
                .map(|clauses| clauses.iter().all(|c| clause_matches(c, doc)))
                .unwrap_or(true)
        };
        if !all_of("must") || !all_of("filter") {
            return false;
        }
        if let Some(must_not) = bool_clause.get("must_not").and_then(Value::as_array) {
            if must_not.iter().any(|c| clause_matches(c, doc)) {
                return false;
            }
        }
        if let Some(should) = bool_clause.get("should").and_then(Value::as_array) {
            if !should.is_empty() && !should.iter().any(|c| clause_matches(c, doc)) {
                return false;
            }
        }
        return true;
    }

    if let Some(m) = obj.get("match") {
        return match_text(m)
            .map(|(field, text)| field_matches_text(doc, field, &text))
            .unwrap_or(false);
    }

    if let Some(term) = obj.get("term").and_then(Value::as_object) {
        return term
            .iter()
            .next()
            .and_then(|(field, expected)| doc.get(field).map(|v| values_equal(v, expected)))
            .unwrap_or(false);
    }

    if let Some(terms) = obj.get("terms").and_then(Value::as_object) {
        return terms
            .iter()
            .next()
            .and_then(|(field, expected)| {
                let candidates = expected.as_array()?;
                let value = doc.get(field)?;
                Some(candidates.iter().any(|c| values_equal(value, c)))
            })
            .unwrap_or(false);
    }

    if let Some(range) = obj.get("range").and_then(Value::as_object) {
        return range
            .iter()
            .next()
            .and_then(|(field, bounds)| {
                let value = doc.get(field)?.as_f64()?;
                let bounds = bounds.as_object()?;
                let check = |key: &str, f: fn(f64, f64) -> bool| {
                    bounds
                        .get(key)
                        .and_then(Value::as_f64)
                        .map(|bound| f(value, bound))
                        .unwrap_or(true)
                };
                Some(
                    check("gte", |v, b| v >= b)
                        && check("gt", |v, b| v > b)
                        && check("lte", |v, b| v <= b)
                        && check("lt", |v, b| v < b),
                )
            })
            .unwrap_or(false);
    }

    // Unknown clauses do not constrain the result set.
    true
}

fn clause_score(clause: &Value, doc: &Value) -> f64 {
    let Some(obj) = clause.as_object() else {
        return 1.0;
    };

    if let Some(bool_clause) = obj.get("bool").and_then(Value::as_object) {
        let mut score = 0.0;
        for key in ["must", "should"] {
            if let Some(clauses) = bool_clause.get(key).and_then(Value::as_array) {
                for c in clauses {
                    if clause_matches(c, doc) {
                        score += clause_score(c, doc);
                    }
                }
            }
        }
        return if score > 0.0 { score } else { 1.0 };
    }

    if let Some(m) = obj.get("match") {
        if let Some((field, text)) = match_text(m) {
            if let Some(value) = doc.get(field) {
                let doc_tokens = value_tokens(value);
                return tokens(&text)
                    .iter()
                    .filter(|t| doc_tokens.contains(t))
                    .count() as f64;
            }
        }
        return 0.0;
    }

    1.0
}

fn sort_hits(scored: &mut [(f64, &StoredDoc)], sorts: &[Value]) {
    scored.sort_by(|a, b| {
        for sort in sorts {
            let (field, ascending) = match sort {
                Value::String(f) => (f.as_str(), true),
                Value::Object(o) => match o.iter().next() {
                    Some((f, options)) => {
                        let order = options
                            .get("order")
                            .and_then(Value::as_str)
                            .or_else(|| options.as_str())
                            .unwrap_or("asc");
                        (f.as_str(), order != "desc")
                    }
                    None => continue,
                },
                _ => continue,
            };

            let av = a.1.body.get(field);
            let bv = b.1.body.get(field);
            let ordering = compare_values(av, bv);
            let ordering = if ascending { ordering } else { ordering.reverse() };
            if ordering != std::cmp::Ordering::Equal {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Some(a), Some(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => a
                .as_str()
                .unwrap_or_default()
                .cmp(b.as_str().unwrap_or_default()),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
