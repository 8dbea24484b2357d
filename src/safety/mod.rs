//! Query safety classification module.
//!
//! Decides whether SQL text is read-only enough to run against an
//! operator's database. The check is lexical: each statement of a batch
//! must start with `SELECT` or `WITH` and must not start with a mutating
//! keyword.
//!
//! It is not a parser. A read-shaped statement that calls a mutating
//! function (`SELECT nextval('s')`, `SELECT pg_terminate_backend(1)`)
//! passes, and semicolons inside string literals split statements. Use a
//! read-only database account when that matters.

mod classifier;

pub use classifier::classify_sql;

use serde::Serialize;
use std::fmt;

/// Verdict for a batch of SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// Whether the batch may be executed.
    pub allowed: bool,
    /// Human-readable explanation of the verdict.
    pub reason: String,
}

impl Classification {
    /// Creates an allowing verdict.
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
        }
    }

    /// Creates a rejecting verdict.
    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.allowed { "Allowed" } else { "Rejected" };
        write!(f, "{verdict}: {}", self.reason)
    }
}
