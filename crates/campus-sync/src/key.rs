//! Cache keys and key patterns.
//!
//! A [`CollectionKey`] names one cached query result. Filters live in a
//! `BTreeMap`, so two keys built from the same filters in a different
//! order compare (and hash) equal.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use campus_core::Domain;

pub const SCOPE_LIST: &str = "list";
pub const SCOPE_DETAIL: &str = "detail";

/// Identifies one cached query result: `(domain, scope, filters)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CollectionKey {
    domain: Domain,
    scope: String,
    filters: BTreeMap<String, String>,
}

impl CollectionKey {
    pub fn new(domain: Domain, scope: &str) -> Self {
        Self {
            domain,
            scope: scope.to_string(),
            filters: BTreeMap::new(),
        }
    }

    /// `(domain, "list", {})`.
    pub fn list(domain: Domain) -> Self {
        Self::new(domain, SCOPE_LIST)
    }

    /// `(domain, "detail", {id})`.
    pub fn detail(domain: Domain, id: impl ToString) -> Self {
        Self::new(domain, SCOPE_DETAIL).filter("id", id)
    }

    pub fn filter(mut self, name: &str, value: impl ToString) -> Self {
        self.filters.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_filters<I, K, V>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: ToString,
        V: ToString,
    {
        for (k, v) in filters {
            self.filters.insert(k.to_string(), v.to_string());
        }
        self
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn filters(&self) -> &BTreeMap<String, String> {
        &self.filters
    }

    /// Filters as URL query pairs, in key order.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.filters
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.scope)?;
        if !self.filters.is_empty() {
            let parts: Vec<String> = self
                .filters
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            write!(f, "{{{}}}", parts.join(","))?;
        }
        Ok(())
    }
}

/// A partial key selecting every key it is a prefix of.
///
/// Matches when the domain is equal, the scope (if set) is equal, and
/// every pattern filter is present on the key with the same value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct KeyPattern {
    domain: Domain,
    scope: Option<String>,
    filters: BTreeMap<String, String>,
}

impl KeyPattern {
    /// Every key under `domain`.
    pub fn domain(domain: Domain) -> Self {
        Self {
            domain,
            scope: None,
            filters: BTreeMap::new(),
        }
    }

    /// Exactly `key` (and any key with extra filters on top of it).
    pub fn exact(key: &CollectionKey) -> Self {
        Self {
            domain: key.domain,
            scope: Some(key.scope.clone()),
            filters: key.filters.clone(),
        }
    }

    pub fn scope(mut self, scope: &str) -> Self {
        self.scope = Some(scope.to_string());
        self
    }

    pub fn filter(mut self, name: &str, value: impl ToString) -> Self {
        self.filters.insert(name.to_string(), value.to_string());
        self
    }

    pub fn matches(&self, key: &CollectionKey) -> bool {
        if self.domain != key.domain {
            return false;
        }
        if let Some(scope) = &self.scope {
            if scope != &key.scope {
                return false;
            }
        }
        self.filters
            .iter()
            .all(|(k, v)| key.filters.get(k) == Some(v))
    }
}

impl From<&CollectionKey> for KeyPattern {
    fn from(key: &CollectionKey) -> Self {
        KeyPattern::exact(key)
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.scope.as_deref().unwrap_or("*"))?;
        if !self.filters.is_empty() {
            let parts: Vec<String> = self
                .filters
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            write!(f, "{{{}}}", parts.join(","))?;
        }
        Ok(())
    }
}
