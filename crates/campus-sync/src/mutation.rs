//! Declarative description of a write.

use campus_core::Domain;

use crate::invalidation::InvalidationPolicy;
use crate::key::KeyPattern;

/// A one-shot write: a kind (for logs) and the keys it makes stale.
///
/// The side-effecting future itself is passed to
/// [`SyncCoordinator::mutate`](crate::SyncCoordinator::mutate) alongside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRequest {
    pub kind: String,
    pub invalidates: Vec<KeyPattern>,
}

impl MutationRequest {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            invalidates: Vec::new(),
        }
    }

    /// A write to `domain`, invalidating it and its cascade under `policy`.
    pub fn on_domain(kind: &str, domain: Domain, policy: &InvalidationPolicy) -> Self {
        Self {
            kind: kind.to_string(),
            invalidates: policy.patterns_for(domain),
        }
    }

    pub fn invalidates(mut self, pattern: KeyPattern) -> Self {
        self.invalidates.push(pattern);
        self
    }
}
