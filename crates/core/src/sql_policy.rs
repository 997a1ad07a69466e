//! Statement policy for the SQL tools.
//!
//! Classifies statements before they reach the store: the read-only
//! allow-list used by `sql_query`, the blocked keyword list used by the
//! write tools, the platform tables those tools may not write, and the
//! placeholder count checked against bound parameters.

/// Leading keywords accepted by the read-only query tool.
pub const READ_ONLY_KEYWORDS: &[&str] = &["SELECT", "PRAGMA", "EXPLAIN"];

/// Keywords that are rejected anywhere in a statement.
pub const BLOCKED_KEYWORDS: &[&str] = &["ATTACH", "DETACH", "LOAD_EXTENSION"];

/// Platform tables the write tools may not touch. Reads stay allowed.
pub const PROTECTED_TABLES: &[&str] = &["EXECUTION_LOG"];

/// Split a statement into upper-cased identifier-like tokens.
fn tokens(statement: &str) -> impl Iterator<Item = String> + '_ {
    statement
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_uppercase())
}

/// True iff the first keyword of the statement is in the read-only allow-list.
pub fn is_read_only(statement: &str) -> bool {
    let trimmed = statement.trim_start();
    // The first token has to start the statement; `(SELECT ...)` or a leading
    // comment does not qualify.
    if !trimmed.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return false;
    }
    tokens(trimmed)
        .next()
        .is_some_and(|first| READ_ONLY_KEYWORDS.contains(&first.as_str()))
}

/// True iff a blocked keyword appears as a whole token anywhere in the statement.
pub fn is_blocked(statement: &str) -> bool {
    tokens(statement).any(|t| BLOCKED_KEYWORDS.contains(&t.as_str()))
}

/// True iff a protected table name appears as a whole token in the statement.
pub fn touches_protected(statement: &str) -> bool {
    tokens(statement).any(|t| PROTECTED_TABLES.contains(&t.as_str()))
}

/// Number of positional `?` placeholders outside quoted literals.
pub fn count_placeholders(statement: &str) -> usize {
    let mut count = 0;
    let mut quote: Option<char> = None;
    for c in statement.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '?' => count += 1,
                _ => {}
            },
        }
    }
    count
}
