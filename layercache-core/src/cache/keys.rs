//! Deterministic cache key construction
//!
//! Two logically identical requests must map to the same key, otherwise
//! neither tier hits nor deduplication work. Parameters are therefore kept
//! sorted by name, and structured filters are rendered as canonical JSON
//! (object keys sorted).

use crate::cache::types::CacheKey;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Display;

/// Builder for `resource[:identifier][?name=value&...]` keys
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    resource: String,
    identifier: Option<String>,
    params: BTreeMap<String, String>,
}

impl CacheKeyBuilder {
    /// Start a key for a resource (e.g. `"feed"`, `"comments"`)
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            identifier: None,
            params: BTreeMap::new(),
        }
    }

    /// Set the primary identifier
    pub fn identifier(mut self, id: impl Into<String>) -> Self {
        self.identifier = Some(id.into());
        self
    }

    /// Add a parameter; a repeated name keeps the last value
    pub fn param(mut self, name: impl Into<String>, value: impl Display) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    /// Add an optional parameter, skipped when `None`
    pub fn param_opt<V: Display>(self, name: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.param(name, value),
            None => self,
        }
    }

    /// Add a structured parameter rendered as canonical JSON
    pub fn filter<S: Serialize>(self, name: impl Into<String>, filter: &S) -> Self {
        let rendered = canonical_json(filter);
        self.param(name, rendered)
    }

    /// Build the cache key
    pub fn build(self) -> CacheKey {
        let mut key = self.resource;

        if let Some(id) = self.identifier {
            key.push(':');
            key.push_str(&id);
        }

        if !self.params.is_empty() {
            let params: Vec<String> = self
                .params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            key.push('?');
            key.push_str(&params.join("&"));
        }

        key
    }
}

/// Render a value as JSON with sorted object keys
///
/// Going through `serde_json::Value` sorts map keys, so struct field order
/// and `HashMap` iteration order do not leak into the output.
pub fn canonical_json<S: Serialize>(value: &S) -> String {
    serde_json::to_value(value)
        .map(|v| v.to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_simple_keys() {
        assert_eq!(CacheKeyBuilder::new("feed").build(), "feed");
        assert_eq!(
            CacheKeyBuilder::new("session").identifier("abc").build(),
            "session:abc"
        );
    }

    #[test]
    fn test_param_order_is_irrelevant() {
        let a = CacheKeyBuilder::new("feed")
            .param("cursor", "c1")
            .param("limit", 20)
            .build();
        let b = CacheKeyBuilder::new("feed")
            .param("limit", 20)
            .param("cursor", "c1")
            .build();

        assert_eq!(a, b);
        assert_eq!(a, "feed?cursor=c1&limit=20");
    }

    #[test]
    fn test_optional_params() {
        let key = CacheKeyBuilder::new("comments")
            .identifier("post-1")
            .param_opt("cursor", None::<&str>)
            .param_opt("limit", Some(10))
            .build();
        assert_eq!(key, "comments:post-1?limit=10");
    }

    #[test]
    fn test_filter_is_canonical() {
        let mut first = HashMap::new();
        first.insert("visibility", "public");
        first.insert("author", "u1");
        first.insert("kind", "session");

        let mut second = HashMap::new();
        second.insert("kind", "session");
        second.insert("visibility", "public");
        second.insert("author", "u1");

        let a = CacheKeyBuilder::new("feed").filter("f", &first).build();
        let b = CacheKeyBuilder::new("feed").filter("f", &second).build();

        assert_eq!(a, b);
        assert_eq!(
            a,
            r#"feed?f={"author":"u1","kind":"session","visibility":"public"}"#
        );
    }
}
