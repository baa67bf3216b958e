//! The fixed settings document applied at index creation.

use serde_json::{json, Value};

/// Build the settings document for index creation.
///
/// Analyzers:
/// - `lowercase`: standard tokenizer + lowercase filter, for exact-ish
///   matching on identifiers and titles
/// - `email`: url/email-aware tokenizer so addresses survive tokenization
/// - `content`: HTML-stripping analyzer with stopword removal and
///   English snowball stemming, for body text
///
/// The index is created with 2 primary shards and 0 replicas.
pub fn create_index_settings() -> Value {
    json!({
        "settings": {
            "analysis": {
                "filter": {
                    "snowball": {
                        "type": "snowball",
                        "language": "English"
                    }
                },
                "analyzer": {
                    "lowercase": {
                        "type": "custom",
                        "tokenizer": "standard",
                        "filter": ["lowercase"]
                    },
                    "email": {
                        "type": "custom",
                        "tokenizer": "uax_url_email",
                        "filter": ["lowercase"]
                    },
                    "content": {
                        "type": "custom",
                        "tokenizer": "standard",
                        "char_filter": ["html_strip"],
                        "filter": ["lowercase", "stop", "snowball"]
                    }
                }
            },
            "index": {
                "number_of_shards": 2,
                "number_of_replicas": 0
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_structure() {
        let settings = create_index_settings();

        assert_eq!(settings["settings"]["index"]["number_of_shards"], 2);
        assert_eq!(settings["settings"]["index"]["number_of_replicas"], 0);

        let analyzers = &settings["settings"]["analysis"]["analyzer"];
        assert_eq!(analyzers["lowercase"]["tokenizer"], "standard");
        assert_eq!(analyzers["email"]["tokenizer"], "uax_url_email");
        assert_eq!(analyzers["content"]["char_filter"][0], "html_strip");

        let content_filters = analyzers["content"]["filter"].as_array().unwrap();
        assert!(content_filters.contains(&json!("snowball")));
        assert!(content_filters.contains(&json!("stop")));
    }

    #[test]
    fn test_snowball_filter_is_english() {
        let settings = create_index_settings();
        assert_eq!(
            settings["settings"]["analysis"]["filter"]["snowball"]["language"],
            "English"
        );
    }
}
