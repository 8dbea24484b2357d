//! Lexical statement classification.

use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;
use tracing::debug;

use super::Classification;

static READ_ONLY_PREFIX: LazyLock<Regex> = LazyLock::new(|| prefix_pattern(r"^\s*(select|with)\b"));
static FORBIDDEN_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    prefix_pattern(r"^\s*(insert|update|delete|create|alter|drop|truncate|merge|replace)\b")
});

fn prefix_pattern(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .expect("prefix pattern is a valid regex")
}

/// Classifies SQL text, possibly several `;`-separated statements.
///
/// One trailing semicolon is ignored. Every non-blank statement must start
/// with `SELECT` or `WITH`; a statement starting with a mutating keyword
/// rejects the whole batch. Text with no statements is rejected.
pub fn classify_sql(sql: &str) -> Classification {
    let trimmed = sql.trim();
    let body = trimmed.strip_suffix(';').unwrap_or(trimmed);

    let mut seen = 0usize;
    for statement in body.split(';').filter(|s| !s.trim().is_empty()) {
        seen += 1;

        if let Some(found) = FORBIDDEN_PREFIX.captures(statement) {
            let keyword = found
                .get(1)
                .map(|m| m.as_str().to_uppercase())
                .unwrap_or_default();
            debug!(keyword = %keyword, "Rejected mutating statement");
            return Classification::reject(format!(
                "{keyword} statements are not allowed; only read-only queries can be executed."
            ));
        }

        if !READ_ONLY_PREFIX.is_match(statement) {
            debug!(statement = statement.trim(), "Rejected non-SELECT statement");
            return Classification::reject(
                "Only SELECT or WITH queries can be executed.".to_string(),
            );
        }
    }

    if seen == 0 {
        return Classification::reject("Query is empty.");
    }

    Classification::allow(if seen == 1 {
        "Read-only query.".to_string()
    } else {
        format!("{seen} read-only statements.")
    })
}
