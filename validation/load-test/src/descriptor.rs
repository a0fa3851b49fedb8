//! Request descriptors produced by the scenario generator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

/// A fully formed GET request: path, query parameters and the name used to
/// bucket results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub name: String,
    pub path: String,
    pub query: BTreeMap<String, String>,
}

impl RequestDescriptor {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            query: BTreeMap::new(),
        }
    }

    /// Set a query parameter, replacing any earlier value for the same key.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Render an absolute URL against `base_url`.
    ///
    /// Query parameters are percent-encoded and emitted in key order.
    pub fn url(&self, base_url: &str) -> Result<Url, url::ParseError> {
        let joined = format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        );
        if self.query.is_empty() {
            Url::parse(&joined)
        } else {
            Url::parse_with_params(&joined, &self.query)
        }
    }
}
