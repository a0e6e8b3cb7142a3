//! Elasticsearch target.
//!
//! Each document is indexed under its content id in a date-stamped index
//! rendered from a strftime pattern in local time.

use chrono::Local;
use reqwest::blocking::Client;
use tracing::{debug, warn};

use crate::collector::Target;
use crate::document::Document;

pub const DEFAULT_URL: &str = "http://localhost:9200";
pub const DEFAULT_INDEX_FORMAT: &str = "collector-%Y.%m.%d";

/// Indexes each document with `PUT {url}/{index}/_doc/{id}`.
pub struct Elasticsearch {
    name: String,
    url: String,
    index_format: String,
    client: Client,
}

impl Elasticsearch {
    pub fn new(url: &str, index_format: &str) -> Self {
        Self {
            name: format!("Elasticsearch {}", url),
            url: url.trim_end_matches('/').to_string(),
            index_format: index_format.to_string(),
            client: Client::new(),
        }
    }

    /// Index name for the current local date.
    pub fn current_index(&self) -> String {
        Local::now().format(&self.index_format).to_string()
    }

    pub fn document_url(&self, index: &str, id: &str) -> String {
        format!("{}/{}/_doc/{}", self.url, index, id)
    }
}

impl Target for Elasticsearch {
    fn name(&self) -> &str {
        &self.name
    }

    fn push(&mut self, doc: &Document) {
        let url = self.document_url(&self.current_index(), &doc.id);

        match self.client.put(&url).json(&doc.data).send() {
            Ok(resp) if resp.status().is_client_error() || resp.status().is_server_error() => {
                warn!("{}: {} answered {}", self.name, url, resp.status());
            }
            Ok(resp) => debug!("{}: {} answered {}", self.name, url, resp.status()),
            Err(e) => warn!("{}: dropping document {}: {}", self.name, doc.id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_url() {
        let es = Elasticsearch::new("http://es:9200/", DEFAULT_INDEX_FORMAT);
        assert_eq!(
            es.document_url("collector-2024.01.02", "abc"),
            "http://es:9200/collector-2024.01.02/_doc/abc"
        );
    }

    #[test]
    fn test_index_follows_date_pattern() {
        let es = Elasticsearch::new(DEFAULT_URL, DEFAULT_INDEX_FORMAT);
        let index = es.current_index();
        assert!(index.starts_with("collector-"));
        assert_eq!(index.len(), "collector-2024.01.02".len());

        let fixed = Elasticsearch::new(DEFAULT_URL, "metrics");
        assert_eq!(fixed.current_index(), "metrics");
    }
}
