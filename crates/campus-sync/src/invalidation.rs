//! Invalidation events and the domain cascade policy.
//!
//! Mutations never touch cache entries directly. They publish an
//! [`InvalidationEvent`] on the coordinator's bus; a single listener task
//! applies it and broadcasts an [`InvalidationReport`].

use std::collections::BTreeMap;

use campus_core::Domain;

use crate::key::{CollectionKey, KeyPattern};

/// Published once per successful mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationEvent {
    /// Mutation kind that caused it, for logs.
    pub cause: String,
    pub patterns: Vec<KeyPattern>,
}

/// Outcome of applying one [`InvalidationEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationReport {
    pub cause: String,
    /// Every cached key matched by at least one pattern, each listed once.
    pub invalidated: Vec<CollectionKey>,
    /// The subset with live subscribers, refetched in the background.
    pub refetched: Vec<CollectionKey>,
}

/// Which domains' cached collections depend on writes to another domain.
///
/// Writing an enrollment changes classroom occupancy, assigning staff
/// changes both the classroom and the worker views, and so on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationPolicy {
    cascades: BTreeMap<Domain, Vec<Domain>>,
}

impl Default for InvalidationPolicy {
    fn default() -> Self {
        let mut cascades = BTreeMap::new();
        cascades.insert(Domain::Enrollments, vec![Domain::Classrooms]);
        cascades.insert(Domain::Assignments, vec![Domain::Classrooms, Domain::Workers]);
        cascades.insert(Domain::Classrooms, vec![Domain::Enrollments, Domain::Assignments]);
        cascades.insert(Domain::Workers, vec![Domain::Assignments]);
        cascades.insert(Domain::Evaluations, Vec::new());
        cascades.insert(Domain::Tasks, Vec::new());
        Self { cascades }
    }
}

impl InvalidationPolicy {
    /// A policy with no cascades at all.
    pub fn isolated() -> Self {
        Self {
            cascades: BTreeMap::new(),
        }
    }

    /// Replace the cascade for `domain`.
    pub fn with_cascade(mut self, domain: Domain, dependents: &[Domain]) -> Self {
        self.cascades.insert(domain, dependents.to_vec());
        self
    }

    pub fn dependents(&self, domain: Domain) -> &[Domain] {
        self.cascades.get(&domain).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Domain-wide patterns for `domain` followed by its dependents.
    pub fn patterns_for(&self, domain: Domain) -> Vec<KeyPattern> {
        std::iter::once(domain)
            .chain(self.dependents(domain).iter().copied())
            .map(KeyPattern::domain)
            .collect()
    }
}
