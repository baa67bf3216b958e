//! Configuration for the search client.

use std::env;
use std::time::Duration;

use crate::errors::SearchError;

/// Default backend endpoint.
const DEFAULT_SERVER: &str = "http://localhost:9200";

/// Default request timeout.
const DEFAULT_TIMEOUT_SECS: f64 = 1.0;

/// Configuration for a [`SearchClient`](crate::SearchClient).
///
/// One client targets one index. Transactional buffering is on by default;
/// `disable_indexing` is a global kill switch that turns every index/delete
/// call into a no-op without touching the buffer or the backend.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend endpoints. The first endpoint is used to build the
    /// connection; additional endpoints are deployment-level concerns.
    pub servers: Vec<String>,
    /// Name of the target index.
    pub index: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Buffer mutating operations until the surrounding transaction
    /// commits.
    pub use_transaction: bool,
    /// Kill switch: drop all index/delete operations.
    pub disable_indexing: bool,
    /// Ensure the index exists when connecting.
    pub ensure_index_on_start: bool,
}

impl ClientConfig {
    /// Create a configuration for the given index with default settings.
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            servers: vec![DEFAULT_SERVER.to_string()],
            index: index.into(),
            timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS),
            use_transaction: true,
            disable_indexing: false,
            ensure_index_on_start: false,
        }
    }

    /// Set the backend endpoints.
    pub fn with_servers(mut self, servers: Vec<String>) -> Self {
        self.servers = servers;
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable or disable transactional buffering.
    pub fn with_use_transaction(mut self, use_transaction: bool) -> Self {
        self.use_transaction = use_transaction;
        self
    }

    /// Enable or disable the indexing kill switch.
    pub fn with_disable_indexing(mut self, disable_indexing: bool) -> Self {
        self.disable_indexing = disable_indexing;
        self
    }

    /// Ensure the index exists when connecting.
    pub fn with_ensure_index_on_start(mut self, ensure: bool) -> Self {
        self.ensure_index_on_start = ensure;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SEARCH_INDEX`: target index name (required)
    /// - `SEARCH_SERVERS`: comma-separated endpoints (default: http://localhost:9200)
    /// - `SEARCH_TIMEOUT_SECS`: request timeout in seconds (default: 1.0)
    /// - `SEARCH_USE_TRANSACTION`: enable transactional buffering (default: true)
    /// - `SEARCH_DISABLE_INDEXING`: global kill switch (default: false)
    /// - `SEARCH_ENSURE_INDEX`: ensure the index on connect (default: false)
    pub fn from_env() -> Result<Self, SearchError> {
        let index = env::var("SEARCH_INDEX")
            .map_err(|_| SearchError::config("SEARCH_INDEX is not set"))?;

        let mut config = Self::new(index);

        if let Ok(servers) = env::var("SEARCH_SERVERS") {
            config.servers = servers
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if config.servers.is_empty() {
                return Err(SearchError::config("SEARCH_SERVERS is empty"));
            }
        }

        if let Ok(timeout) = env::var("SEARCH_TIMEOUT_SECS") {
            let secs: f64 = timeout.parse().map_err(|_| {
                SearchError::config(format!("invalid SEARCH_TIMEOUT_SECS: {timeout}"))
            })?;
            config.timeout = Duration::from_secs_f64(secs);
        }

        if let Ok(v) = env::var("SEARCH_USE_TRANSACTION") {
            config.use_transaction = parse_bool(&v)
                .ok_or_else(|| SearchError::config(format!("invalid SEARCH_USE_TRANSACTION: {v}")))?;
        }

        if let Ok(v) = env::var("SEARCH_DISABLE_INDEXING") {
            config.disable_indexing = parse_bool(&v)
                .ok_or_else(|| SearchError::config(format!("invalid SEARCH_DISABLE_INDEXING: {v}")))?;
        }

        if let Ok(v) = env::var("SEARCH_ENSURE_INDEX") {
            config.ensure_index_on_start = parse_bool(&v)
                .ok_or_else(|| SearchError::config(format!("invalid SEARCH_ENSURE_INDEX: {v}")))?;
        }

        Ok(config)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new("docs");

        assert_eq!(config.index, "docs");
        assert_eq!(config.servers, vec!["http://localhost:9200".to_string()]);
        assert_eq!(config.timeout, Duration::from_secs(1));
        assert!(config.use_transaction);
        assert!(!config.disable_indexing);
        assert!(!config.ensure_index_on_start);
    }

    #[test]
    fn test_builder_methods() {
        let config = ClientConfig::new("docs")
            .with_servers(vec!["http://search:9200".to_string()])
            .with_timeout(Duration::from_secs(5))
            .with_use_transaction(false)
            .with_disable_indexing(true)
            .with_ensure_index_on_start(true);

        assert_eq!(config.servers, vec!["http://search:9200".to_string()]);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(!config.use_transaction);
        assert!(config.disable_indexing);
        assert!(config.ensure_index_on_start);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("false"), Some(false));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    // Environment access is process-global, so every from_env assertion
    // lives in one test to avoid races with parallel test threads.
    #[test]
    fn test_from_env() {
        env::remove_var("SEARCH_INDEX");
        assert!(ClientConfig::from_env().is_err());

        env::set_var("SEARCH_INDEX", "entities");
        env::set_var("SEARCH_SERVERS", "http://a:9200, http://b:9200");
        env::set_var("SEARCH_TIMEOUT_SECS", "2.5");
        env::set_var("SEARCH_USE_TRANSACTION", "false");
        env::set_var("SEARCH_DISABLE_INDEXING", "true");
        env::set_var("SEARCH_ENSURE_INDEX", "1");

        let config = ClientConfig::from_env().unwrap();
        assert_eq!(config.index, "entities");
        assert_eq!(
            config.servers,
            vec!["http://a:9200".to_string(), "http://b:9200".to_string()]
        );
        assert_eq!(config.timeout, Duration::from_secs_f64(2.5));
        assert!(!config.use_transaction);
        assert!(config.disable_indexing);
        assert!(config.ensure_index_on_start);

        env::set_var("SEARCH_TIMEOUT_SECS", "fast");
        assert!(ClientConfig::from_env().is_err());

        for var in [
            "SEARCH_INDEX",
            "SEARCH_SERVERS",
            "SEARCH_TIMEOUT_SECS",
            "SEARCH_USE_TRANSACTION",
            "SEARCH_DISABLE_INDEXING",
            "SEARCH_ENSURE_INDEX",
        ] {
            env::remove_var(var);
        }
    }
}
