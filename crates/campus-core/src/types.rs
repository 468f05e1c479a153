//! Shared vocabulary used across Campus crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A backend resource family. Every cached collection belongs to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Enrollments,
    Workers,
    Classrooms,
    Assignments,
    Evaluations,
    Tasks,
}

#[derive(Debug, Error)]
#[error("unknown domain: {0}")]
pub struct UnknownDomain(pub String);

impl Domain {
    pub const ALL: [Domain; 6] = [
        Domain::Enrollments,
        Domain::Workers,
        Domain::Classrooms,
        Domain::Assignments,
        Domain::Evaluations,
        Domain::Tasks,
    ];

    /// Stable name used in cache keys and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Enrollments => "enrollments",
            Domain::Workers => "workers",
            Domain::Classrooms => "classrooms",
            Domain::Assignments => "assignments",
            Domain::Evaluations => "evaluations",
            Domain::Tasks => "tasks",
        }
    }

    /// REST path segment on the backend (`GET /{path}`).
    pub fn path(&self) -> &'static str {
        match self {
            Domain::Enrollments => "matricula",
            Domain::Workers => "trabajadores",
            Domain::Classrooms => "aulas",
            Domain::Assignments => "asignaciones",
            Domain::Evaluations => "evaluaciones",
            Domain::Tasks => "tareas",
        }
    }

    /// Field name some endpoints use to wrap their collection
    /// (`{ success: true, matriculas: [...] }`).
    pub fn envelope_field(&self) -> &'static str {
        match self {
            Domain::Enrollments => "matriculas",
            Domain::Workers => "trabajadores",
            Domain::Classrooms => "aulas",
            Domain::Assignments => "asignaciones",
            Domain::Evaluations => "evaluaciones",
            Domain::Tasks => "tareas",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = UnknownDomain;

    /// Accepts both the cache name and the backend path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        Domain::ALL
            .into_iter()
            .find(|d| d.as_str() == s || d.path() == s || d.envelope_field() == s)
            .ok_or(UnknownDomain(s))
    }
}
